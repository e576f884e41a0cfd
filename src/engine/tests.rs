use super::*;
use crate::monster::Element;

const T0: i64 = 1_700_000_000_000;

fn engine() -> KillEngine {
    KillEngine::new(DetectionSettings::default())
}

fn tick(
    engine: &mut KillEngine,
    level: u32,
    exp: f64,
    at: i64,
    hp_seen_at: Option<i64>,
) -> TickOutcome {
    engine.process(
        TickInput {
            level: Some(level),
            exp: Some(exp),
            timestamp: at,
            hp_seen_at,
            identity: None,
        },
        within_expected_range,
    )
}

/// HP bar 가 방금 보인 상태의 틱
fn hp_tick(engine: &mut KillEngine, level: u32, exp: f64, at: i64) -> TickOutcome {
    tick(engine, level, exp, at, Some(at))
}

fn identity(name: &str, expected_exp: Option<f64>) -> ResolvedIdentity {
    ResolvedIdentity {
        id: Some(7),
        name: name.to_string(),
        level: Some(10),
        element: Element::Fire,
        rank: MonsterRank::Captain,
        expected_exp,
    }
}

// ============================================================
// Kill detection
// ============================================================

#[test]
fn first_observation_never_counts() {
    let mut engine = engine();
    assert_eq!(hp_tick(&mut engine, 10, 50.0, T0), TickOutcome::FirstObservation);
    assert_eq!(engine.state().kills_total, 0);
}

#[test]
fn small_gain_is_a_kill_and_big_jump_is_suspect() {
    let mut engine = engine();
    hp_tick(&mut engine, 10, 50.0, T0);

    let outcome = hp_tick(&mut engine, 10, 50.5, T0 + 1000);
    let kill = outcome.kill().expect("kill expected");
    assert_eq!(kill.delta_exp, 0.5);
    assert_eq!(kill.monster_name, UNKNOWN_MONSTER);
    assert_eq!(engine.state().kills_session, 1);

    assert_eq!(hp_tick(&mut engine, 10, 95.0, T0 + 2000), TickOutcome::Suspect);
    let suspect = engine.pending_suspect().unwrap();
    assert_eq!(suspect.delta_exp, 95.0 - 50.5);
    assert_eq!(engine.state().kills_session, 1);
}

#[test]
fn level_changes_and_exp_drops_clear_suspect() {
    let mut engine = engine();
    hp_tick(&mut engine, 10, 10.0, T0);
    hp_tick(&mut engine, 10, 60.0, T0 + 1000);
    assert!(engine.pending_suspect().is_some());

    assert_eq!(hp_tick(&mut engine, 11, 0.2, T0 + 2000), TickOutcome::LevelUp);
    assert!(engine.pending_suspect().is_none());

    hp_tick(&mut engine, 11, 55.0, T0 + 3000);
    assert_eq!(hp_tick(&mut engine, 9, 55.0, T0 + 4000), TickOutcome::LevelDown);
    assert!(engine.pending_suspect().is_none());

    hp_tick(&mut engine, 9, 99.0, T0 + 5000);
    assert!(engine.pending_suspect().is_some());
    assert_eq!(hp_tick(&mut engine, 9, 98.0, T0 + 6000), TickOutcome::ExpDecreased);
    assert!(engine.pending_suspect().is_none());
    assert_eq!(engine.state().kills_total, 0);
}

#[test]
fn gains_at_or_below_epsilon_are_noise() {
    let mut engine = engine();
    hp_tick(&mut engine, 10, 50.0, T0);
    assert_eq!(hp_tick(&mut engine, 10, 50.0, T0 + 500), TickOutcome::BelowEpsilon);
    assert_eq!(hp_tick(&mut engine, 10, 50.0005, T0 + 1000), TickOutcome::BelowEpsilon);
}

#[test]
fn hp_gate_requires_recent_hp_or_long_gap() {
    let mut engine = engine();
    tick(&mut engine, 10, 50.0, T0, None);

    // 아직 kill 이 없으므로 HP 없이도 허용
    assert!(tick(&mut engine, 10, 50.5, T0 + 1000, None).kill().is_some());

    // 직전 kill 후 2250ms 가 지나지 않았고 HP 도 없다
    assert_eq!(
        tick(&mut engine, 10, 51.0, T0 + 2000, None),
        TickOutcome::NoRecentHp
    );
    // HP 가 1500ms 보다 오래 전에 보였다
    assert_eq!(
        tick(&mut engine, 10, 51.5, T0 + 3000, Some(T0 + 1400)),
        TickOutcome::NoRecentHp
    );
    // 직전 kill 로부터 충분한 공백
    assert!(tick(&mut engine, 10, 52.0, T0 + 3250, None).kill().is_some());
    assert_eq!(engine.state().kills_total, 2);
}

fn input(exp: f64, at: i64, identity: &ResolvedIdentity) -> TickInput<'_> {
    TickInput {
        level: Some(10),
        exp: Some(exp),
        timestamp: at,
        hp_seen_at: Some(at),
        identity: Some(identity),
    }
}

#[test]
fn admissibility_check_uses_expected_exp() {
    let mut engine = engine();
    let normal = identity("Mia", Some(0.5));
    hp_tick(&mut engine, 10, 10.0, T0);

    assert_eq!(
        engine.process(input(22.0, T0 + 1000, &normal), within_expected_range),
        TickOutcome::Rejected
    );
    let outcome = engine.process(input(22.5, T0 + 2000, &normal), within_expected_range);
    let kill = outcome.kill().unwrap();
    assert_eq!(kill.monster_name, "Mia");
    assert_eq!(kill.rank, MonsterRank::Captain);
    assert_eq!(kill.expected_exp, Some(0.5));

    assert!(within_expected_range(5.0, Some(&normal)));
    assert!(!within_expected_range(0.04, Some(&normal)));
    assert!(within_expected_range(1000.0, Some(&identity("Mia", None))));
    assert!(within_expected_range(1000.0, None));
}

#[test]
fn missing_level_falls_back_to_last_known_level() {
    let mut engine = engine();
    let no_level = |exp: f64, at: i64| TickInput {
        level: None,
        exp: Some(exp),
        timestamp: at,
        hp_seen_at: Some(at),
        identity: None,
    };

    assert_eq!(
        engine.process(no_level(10.0, T0), within_expected_range),
        TickOutcome::NotEvaluated
    );
    hp_tick(&mut engine, 10, 10.0, T0 + 500);
    assert!(engine
        .process(no_level(10.5, T0 + 1000), within_expected_range)
        .kill()
        .is_some());

    let no_exp = TickInput {
        level: Some(10),
        exp: None,
        timestamp: T0 + 2000,
        hp_seen_at: None,
        identity: None,
    };
    assert_eq!(
        engine.process(no_exp, within_expected_range),
        TickOutcome::NotEvaluated
    );
    assert_eq!(engine.state().last_exp, Some(10.5));
}

// ============================================================
// Rollback
// ============================================================

#[test]
fn rollback_restores_state_exactly() {
    let mut engine = engine();
    hp_tick(&mut engine, 10, 10.0, T0);
    for i in 1..=3 {
        hp_tick(&mut engine, 10, 10.0 + i as f64 * 0.3, T0 + i * 1000);
    }
    let before = engine.state().clone();

    let outcome = hp_tick(&mut engine, 10, 11.2, T0 + 4000);
    let seq = outcome.kill().unwrap().seq;
    assert_eq!(engine.state().last3_kills.len(), 3);
    assert_ne!(engine.state().last3_kills, before.last3_kills);

    engine.rollback(seq).unwrap();
    let after = engine.state();
    assert_eq!(after.kills_session, before.kills_session);
    assert_eq!(after.kills_total, before.kills_total);
    assert_eq!(after.exp_session, before.exp_session);
    assert_eq!(after.exp_total, before.exp_total);
    assert_eq!(after.exp_today, before.exp_today);
    assert_eq!(after.rolling_kills, before.rolling_kills);
    assert_eq!(after.last3_kills, before.last3_kills);
    assert_eq!(after.last_kill_time, before.last_kill_time);
    assert_eq!(after.session_start_time, before.session_start_time);
    assert_eq!(after.monsters, before.monsters);
}

#[test]
fn rollback_of_first_kill_removes_tally_and_session_start() {
    let mut engine = engine();
    hp_tick(&mut engine, 10, 10.0, T0);
    let seq = hp_tick(&mut engine, 10, 10.5, T0 + 1000).kill().unwrap().seq;

    engine.rollback(seq).unwrap();
    assert!(engine.state().monsters.is_empty());
    assert_eq!(engine.state().session_start_time, None);
    assert_eq!(engine.state().last_kill_time, None);
    assert_eq!(engine.state().kills_total, 0);
}

#[test]
fn rollback_is_one_deep_and_targeted() {
    let mut engine = engine();
    hp_tick(&mut engine, 10, 10.0, T0);
    let first = hp_tick(&mut engine, 10, 10.5, T0 + 1000).kill().unwrap().seq;
    let second = hp_tick(&mut engine, 10, 11.0, T0 + 2000).kill().unwrap().seq;

    assert_eq!(
        engine.rollback(first),
        Err(RollbackError::StaleTarget {
            recorded: second,
            requested: first
        })
    );
    assert_eq!(engine.rollback(second), Ok(()));
    assert_eq!(engine.rollback(second), Err(RollbackError::NoUndoRecord));
    assert_eq!(engine.state().kills_total, 1);
}

#[test]
fn resets_clear_undo_record() {
    let mut engine = engine();
    hp_tick(&mut engine, 10, 10.0, T0);
    let seq = hp_tick(&mut engine, 10, 10.5, T0 + 1000).kill().unwrap().seq;

    engine.reset_session();
    assert_eq!(engine.rollback(seq), Err(RollbackError::NoUndoRecord));
    assert_eq!(engine.state().kills_session, 0);
    assert_eq!(engine.state().kills_total, 1);
    assert!(engine.state().kills_session <= engine.state().kills_total);
}

// ============================================================
// Statistics
// ============================================================

#[test]
fn stats_from_rolling_window() {
    let mut engine = engine();
    hp_tick(&mut engine, 10, 50.0, T0);
    hp_tick(&mut engine, 10, 50.5, T0 + 10_000);
    hp_tick(&mut engine, 10, 51.0, T0 + 30_000);

    let stats = engine.stats(T0 + 40_000);
    // 300초 window 에 2 kill → 24/h
    assert_eq!(stats.kills_per_hour, 24.0);
    assert_eq!(stats.kills_per_min, 0.4);
    assert_eq!(stats.exp_per_hour, 12.0);
    assert_eq!(stats.exp_per_min, 0.2);
    assert_eq!(stats.avg_time_per_kill, 20_000.0);
    assert_eq!(stats.time_since_last_kill, 10_000);
    assert_eq!(stats.kills_to_level, 98);
    assert_eq!(stats.exp_last_kill, 0.5);
    assert_eq!(stats.session_duration, 30_000);
    assert_eq!(stats.current_lvl, Some(10));
    assert_eq!(stats.last3_kills.len(), 2);
    assert_eq!(
        stats.monsters_by_rank[&MonsterRank::Unknown][0].count,
        2
    );

    // window 밖으로 밀려나면 rate 는 0
    let later = engine.stats(T0 + 400_000);
    assert_eq!(later.kills_per_hour, 0.0);
    assert!(engine.state().rolling_kills.is_empty());
    assert_eq!(later.kills_session, 2);
}

#[test]
fn empty_engine_reports_zeroes() {
    let mut engine = engine();
    let stats = engine.stats(T0);
    assert_eq!(stats.kills_to_level, 0);
    assert_eq!(stats.avg_time_per_kill, 0.0);
    assert_eq!(stats.time_since_last_kill, 0);
    assert!(stats.monsters_by_rank.is_empty());
}

#[test]
fn daily_bucket_rolls_over() {
    let mut engine = engine();
    hp_tick(&mut engine, 10, 10.0, T0);
    hp_tick(&mut engine, 10, 10.5, T0 + 1000);
    assert_eq!(engine.state().exp_today, 0.5);

    let next_day = T0 + 25 * 3_600_000;
    hp_tick(&mut engine, 10, 10.5, next_day);
    assert_eq!(engine.state().exp_today, 0.0);
    assert_eq!(engine.state().exp_total, 0.5);
    assert_eq!(engine.state().exp_today_key, Some(day_key(next_day)));
}

// ============================================================
// Manual baseline and resets
// ============================================================

#[test]
fn manual_exp_sets_baseline_without_gain() {
    let mut engine = engine();
    hp_tick(&mut engine, 10, 10.0, T0);
    hp_tick(&mut engine, 10, 60.0, T0 + 500);
    engine.apply_manual_exp(42.0, Some(10), T0 + 1000);
    assert!(engine.pending_suspect().is_none());
    assert_eq!(engine.state().kills_total, 0);

    assert_eq!(
        hp_tick(&mut engine, 10, 42.5, T0 + 2000).kill().unwrap().delta_exp,
        0.5
    );
}

#[test]
fn reset_all_starts_a_fresh_session() {
    let mut engine = engine();
    hp_tick(&mut engine, 10, 10.0, T0);
    hp_tick(&mut engine, 10, 10.5, T0 + 1000);

    engine.reset_all(T0 + 5000);
    assert_eq!(engine.state().kills_total, 0);
    assert_eq!(engine.state().last_exp, None);
    assert_eq!(engine.state().session_start_time, Some(T0 + 5000));

    engine.start_session(T0 + 9000);
    assert_eq!(engine.state().session_start_time, Some(T0 + 5000));
}

#[test]
fn profile_state_round_trips_through_json() {
    let mut engine = engine();
    hp_tick(&mut engine, 10, 10.0, T0);
    hp_tick(&mut engine, 10, 10.5, T0 + 1000);

    let json = serde_json::to_value(engine.state()).unwrap();
    assert_eq!(json["killsSession"], 1);
    assert!(json["last3Kills"].is_array());

    let restored: ProfileState = serde_json::from_value(json).unwrap();
    let mut restored = KillEngine::with_state(DetectionSettings::default(), restored);
    assert!(hp_tick(&mut restored, 10, 11.0, T0 + 2000).kill().is_some());
    assert_eq!(restored.state().kills_total, 2);
}

#[test]
fn extreme_timestamps_do_not_overflow() {
    let mut engine = engine();
    tick(&mut engine, 10, 50.0, i64::MIN, None);
    assert!(tick(&mut engine, 10, 50.5, i64::MAX, Some(i64::MIN)).kill().is_some());
    assert_eq!(
        tick(&mut engine, 10, 51.0, i64::MIN, None),
        TickOutcome::NoRecentHp
    );

    let stats = engine.stats(i64::MIN);
    assert_eq!(stats.kills_total, 1);
    engine.stats(i64::MAX);
}
