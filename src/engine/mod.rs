use tracing::{debug, info};

use crate::{
    env::DetectionSettings,
    errors::RollbackError,
    monster::{MonsterRank, ResolvedIdentity},
};

pub mod state;
pub mod stats;

#[cfg(test)]
mod tests;

pub use state::{
    day_key, KillEvent, KillRecord, MonsterTally, PendingSuspect, ProfileState, RollingKill,
    UNKNOWN_MONSTER,
};
pub use stats::{DerivedStats, MonsterCount};

use state::{KillUndo, LAST_KILLS_CAPACITY};

/// 한 틱의 엔진 입력. level/exp 는 이미 숫자로 정규화되어 있다.
#[derive(Debug, Clone, Copy)]
pub struct TickInput<'a> {
    pub level: Option<u32>,
    pub exp: Option<f64>,
    pub timestamp: i64,
    /// 마지막으로 HP bar 텍스트가 보인 시각
    pub hp_seen_at: Option<i64>,
    pub identity: Option<&'a ResolvedIdentity>,
}

/// 틱 평가 결과. Kill 외에는 모두 "kill 아님" 이다.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// level 또는 exp 가 없어 평가하지 않음
    NotEvaluated,
    FirstObservation,
    LevelUp,
    LevelDown,
    ExpDecreased,
    BelowEpsilon,
    NoRecentHp,
    Suspect,
    Rejected,
    Kill(KillEvent),
}

impl TickOutcome {
    pub fn kill(&self) -> Option<&KillEvent> {
        match self {
            TickOutcome::Kill(event) => Some(event),
            _ => None,
        }
    }
}

/// 기대 경험치의 0.1배 ~ 10배 안에 있는지. 기대값이 없으면 항상 통과.
pub fn within_expected_range(delta_exp: f64, identity: Option<&ResolvedIdentity>) -> bool {
    match identity.and_then(|i| i.expected_exp) {
        Some(expected) if expected.is_finite() && expected > 0.0 => {
            delta_exp >= expected * 0.1 && delta_exp <= expected * 10.0
        }
        _ => true,
    }
}

/// 프로필 하나의 kill 판정 상태 기계
#[derive(Debug)]
pub struct KillEngine {
    settings: DetectionSettings,
    state: ProfileState,
    pending_suspect: Option<PendingSuspect>,
    undo: Option<KillUndo>,
    next_seq: u64,
}

impl KillEngine {
    pub fn new(settings: DetectionSettings) -> Self {
        Self::with_state(settings, ProfileState::default())
    }

    /// 저장된 상태에서 복원
    pub fn with_state(settings: DetectionSettings, state: ProfileState) -> Self {
        Self {
            settings,
            state,
            pending_suspect: None,
            undo: None,
            next_seq: 1,
        }
    }

    pub fn state(&self) -> &ProfileState {
        &self.state
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    pub fn pending_suspect(&self) -> Option<&PendingSuspect> {
        self.pending_suspect.as_ref()
    }

    pub fn last_level(&self) -> Option<u32> {
        self.state.last_level
    }

    pub fn process(
        &mut self,
        input: TickInput<'_>,
        admissible: impl FnOnce(f64, Option<&ResolvedIdentity>) -> bool,
    ) -> TickOutcome {
        let now = input.timestamp;

        let Some(exp) = input.exp.filter(|e| e.is_finite()) else {
            return TickOutcome::NotEvaluated;
        };
        let Some(level) = input.level.or(self.state.last_level) else {
            return TickOutcome::NotEvaluated;
        };

        self.state.ensure_daily_bucket(now);
        self.state.prune_rolling(now, self.settings.rolling_window_ms());

        let previous = self.state.last_level.zip(self.state.last_exp);
        self.state.last_level = Some(level);
        self.state.last_exp = Some(exp);
        self.state.last_update_time = Some(now);

        let Some((prev_level, prev_exp)) = previous else {
            return TickOutcome::FirstObservation;
        };

        if level > prev_level {
            debug!("level up {} -> {}", prev_level, level);
            self.pending_suspect = None;
            return TickOutcome::LevelUp;
        }
        if level < prev_level {
            self.pending_suspect = None;
            return TickOutcome::LevelDown;
        }

        let delta_exp = exp - prev_exp;
        if delta_exp < 0.0 {
            self.pending_suspect = None;
            return TickOutcome::ExpDecreased;
        }
        if delta_exp <= self.settings.epsilon {
            return TickOutcome::BelowEpsilon;
        }

        if !self.hp_gate_open(now, input.hp_seen_at) {
            self.pending_suspect = None;
            return TickOutcome::NoRecentHp;
        }

        if delta_exp > self.settings.suspect_threshold {
            let monster_name = input
                .identity
                .map(|i| i.name.clone())
                .unwrap_or_else(|| UNKNOWN_MONSTER.to_string());
            info!(
                "suspect exp jump {:.4} at {} ({}), holding back",
                delta_exp, now, monster_name
            );
            metrics::SUSPECT_TICKS_TOTAL.inc();
            self.pending_suspect = Some(PendingSuspect {
                delta_exp,
                monster_name,
                timestamp: now,
            });
            return TickOutcome::Suspect;
        }

        self.pending_suspect = None;

        if !admissible(delta_exp, input.identity) {
            debug!("delta {:.4} rejected by admissibility check", delta_exp);
            return TickOutcome::Rejected;
        }

        TickOutcome::Kill(self.register_kill(delta_exp, now, input.identity))
    }

    /// 최근 HP 신호가 있거나, 없다면 직전 kill 로부터 충분히 시간이 흘렀어야 한다.
    fn hp_gate_open(&self, now: i64, hp_seen_at: Option<i64>) -> bool {
        let window = self.settings.kill_hp_window_ms;
        let recent_hp = hp_seen_at.is_some_and(|seen| now.saturating_sub(seen) <= window);
        if recent_hp {
            return true;
        }
        match self.state.last_kill_time {
            Some(last) => now.saturating_sub(last) >= self.settings.no_hp_fallback_gap_ms(),
            None => true,
        }
    }

    fn register_kill(
        &mut self,
        delta_exp: f64,
        now: i64,
        identity: Option<&ResolvedIdentity>,
    ) -> KillEvent {
        let name = identity
            .map(|i| i.name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| UNKNOWN_MONSTER.to_string());
        let rank = identity.map(|i| i.rank).unwrap_or(MonsterRank::Unknown);
        let seq = self.next_seq;
        self.next_seq += 1;

        let state = &mut self.state;
        let rolling_entry = state::RollingKill {
            timestamp: now,
            delta_exp,
        };
        let mut undo = KillUndo {
            seq,
            kills_session: state.kills_session,
            kills_total: state.kills_total,
            exp_session: state.exp_session,
            exp_total: state.exp_total,
            exp_today: state.exp_today,
            exp_today_key: state.exp_today_key.clone(),
            session_start_time: state.session_start_time,
            last_kill_time: state.last_kill_time,
            rolling_entry,
            evicted_last_kill: None,
            monster_name: name.clone(),
            previous_tally: state.monsters.get(&name).cloned(),
        };

        if state.session_start_time.is_none() {
            state.session_start_time = Some(now);
        }
        state.kills_session += 1;
        state.kills_total += 1;
        state.exp_session += delta_exp;
        state.exp_total += delta_exp;
        state.exp_today += delta_exp;
        state.last_kill_time = Some(now);
        state.rolling_kills.push_back(rolling_entry);

        state.last3_kills.push_back(KillRecord {
            monster_name: name.clone(),
            delta_exp,
            timestamp: now,
            monster_id: identity.and_then(|i| i.id),
            monster_level: identity.and_then(|i| i.level),
            expected_exp: identity.and_then(|i| i.expected_exp),
        });
        if state.last3_kills.len() > LAST_KILLS_CAPACITY {
            undo.evicted_last_kill = state.last3_kills.pop_front();
        }

        let tally = state
            .monsters
            .entry(name.clone())
            .or_insert_with(|| MonsterTally {
                count: 0,
                rank,
                last_kill_time: None,
            });
        tally.count += 1;
        tally.last_kill_time = Some(now);

        self.undo = Some(undo);

        KillEvent {
            seq,
            monster_name: name,
            delta_exp,
            timestamp: now,
            rank,
            monster_id: identity.and_then(|i| i.id),
            monster_level: identity.and_then(|i| i.level),
            expected_exp: identity.and_then(|i| i.expected_exp),
            ttk_ms: None,
        }
    }

    /// `seq` kill 을 kill 이전 값으로 정확히 되돌린다. 한 단계만 지원한다.
    pub fn rollback(&mut self, seq: u64) -> Result<(), RollbackError> {
        let recorded = self.undo.as_ref().ok_or(RollbackError::NoUndoRecord)?.seq;
        if recorded != seq {
            return Err(RollbackError::StaleTarget {
                recorded,
                requested: seq,
            });
        }
        let Some(undo) = self.undo.take() else {
            return Err(RollbackError::NoUndoRecord);
        };

        let state = &mut self.state;
        state.kills_session = undo.kills_session;
        state.kills_total = undo.kills_total;
        state.exp_session = undo.exp_session;
        state.exp_total = undo.exp_total;
        // 그 사이 날짜가 바뀌었다면 오늘 버킷은 이미 새 날짜의 것
        if state.exp_today_key == undo.exp_today_key {
            state.exp_today = undo.exp_today;
        }
        state.session_start_time = undo.session_start_time;
        state.last_kill_time = undo.last_kill_time;

        if state.rolling_kills.back() == Some(&undo.rolling_entry) {
            state.rolling_kills.pop_back();
        }
        state.last3_kills.pop_back();
        if let Some(evicted) = undo.evicted_last_kill {
            state.last3_kills.push_front(evicted);
        }

        match undo.previous_tally {
            Some(tally) => {
                state.monsters.insert(undo.monster_name, tally);
            }
            None => {
                state.monsters.remove(&undo.monster_name);
            }
        }

        info!("kill #{} rolled back", seq);
        Ok(())
    }

    /// 통계를 계산한다. 계산 전에 rolling window 와 날짜 버킷을 정리한다.
    pub fn stats(&mut self, now: i64) -> DerivedStats {
        self.state.ensure_daily_bucket(now);
        self.state.prune_rolling(now, self.settings.rolling_window_ms());
        stats::compute(
            &self.state,
            now,
            self.settings.rolling_window_ms(),
            self.settings.min_delta,
        )
    }

    /// exp 기준값만 갱신한다. 획득으로 세지 않는다.
    pub fn apply_manual_exp(&mut self, exp: f64, level: Option<u32>, now: i64) {
        if !exp.is_finite() {
            return;
        }
        self.state.ensure_daily_bucket(now);
        if let Some(level) = level {
            self.state.last_level = Some(level);
        }
        self.state.last_exp = Some(exp);
        self.state.last_update_time = Some(now);
        self.pending_suspect = None;
    }

    pub fn start_session(&mut self, now: i64) {
        if self.state.session_start_time.is_none() {
            self.state.session_start_time = Some(now);
        }
    }

    /// 세션 값만 비운다. 누적 값은 유지.
    pub fn reset_session(&mut self) {
        let state = &mut self.state;
        state.kills_session = 0;
        state.exp_session = 0.0;
        state.session_start_time = None;
        state.rolling_kills.clear();
        state.last3_kills.clear();
        state.last_kill_time = None;
        self.pending_suspect = None;
        self.undo = None;
    }

    pub fn reset_all(&mut self, now: i64) {
        self.state = ProfileState::default();
        self.state.ensure_daily_bucket(now);
        self.state.session_start_time = Some(now);
        self.pending_suspect = None;
        self.undo = None;
    }
}
