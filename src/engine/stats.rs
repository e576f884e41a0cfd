use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::monster::MonsterRank;

use super::state::{KillRecord, ProfileState};

/// 브로드캐스트에 실리는 계산된 통계
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivedStats {
    pub kills_session: u64,
    pub kills_total: u64,
    pub exp_session: f64,
    pub exp_total: f64,
    pub exp_today: f64,
    pub kills_per_hour: f64,
    pub kills_per_min: f64,
    pub exp_per_hour: f64,
    pub exp_per_min: f64,
    /// ms
    pub avg_time_per_kill: f64,
    pub time_since_last_kill: i64,
    pub kills_to_level: u64,
    pub exp_last_kill: f64,
    pub session_duration: i64,
    pub last3_kills: Vec<KillRecord>,
    pub current_lvl: Option<u32>,
    pub current_exp: Option<f64>,
    pub monsters_by_rank: BTreeMap<MonsterRank, Vec<MonsterCount>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonsterCount {
    pub name: String,
    pub count: u64,
    pub last_kill_time: Option<i64>,
}

/// rolling window 는 호출 전에 이미 정리되어 있어야 한다.
pub(super) fn compute(
    state: &ProfileState,
    now: i64,
    rolling_window_ms: i64,
    min_delta: f64,
) -> DerivedStats {
    let window_hours = rolling_window_ms as f64 / 3_600_000.0;
    let rolling_count = state.rolling_kills.len();
    let rolling_exp: f64 = state.rolling_kills.iter().map(|k| k.delta_exp).sum();

    let (kills_per_hour, exp_per_hour) = if rolling_count > 0 && window_hours > 0.0 {
        (
            rolling_count as f64 / window_hours,
            rolling_exp / window_hours,
        )
    } else {
        (0.0, 0.0)
    };
    let kills_per_min = kills_per_hour / 60.0;
    let exp_per_min = exp_per_hour / 60.0;

    let avg_time_per_kill = if rolling_count >= 2 {
        let first = state.rolling_kills.iter().map(|k| k.timestamp).min();
        let last = state.rolling_kills.iter().map(|k| k.timestamp).max();
        match (first, last) {
            (Some(first), Some(last)) => {
                last.saturating_sub(first) as f64 / (rolling_count - 1) as f64
            }
            _ => 0.0,
        }
    } else {
        0.0
    };

    let kills_to_level = match state.last_exp {
        Some(current) if !state.last3_kills.is_empty() => {
            let deltas: Vec<f64> = state.last3_kills.iter().map(|k| k.delta_exp).collect();
            let per_kill = median(&deltas).max(min_delta);
            let remaining = (100.0 - current).max(0.0);
            (remaining / per_kill).ceil() as u64
        }
        _ => 0,
    };

    let mut monsters_by_rank: BTreeMap<MonsterRank, Vec<MonsterCount>> = BTreeMap::new();
    for (name, tally) in &state.monsters {
        monsters_by_rank
            .entry(tally.rank)
            .or_default()
            .push(MonsterCount {
                name: name.clone(),
                count: tally.count,
                last_kill_time: tally.last_kill_time,
            });
    }
    for monsters in monsters_by_rank.values_mut() {
        monsters.sort_by(|a, b| b.count.cmp(&a.count));
    }

    DerivedStats {
        kills_session: state.kills_session,
        kills_total: state.kills_total,
        exp_session: state.exp_session,
        exp_total: state.exp_total,
        exp_today: state.exp_today,
        kills_per_hour: round_to(kills_per_hour, 1),
        kills_per_min: round_to(kills_per_min, 2),
        exp_per_hour: round_to(exp_per_hour, 4),
        exp_per_min: round_to(exp_per_min, 4),
        avg_time_per_kill,
        time_since_last_kill: state.last_kill_time.map(|t| now.saturating_sub(t)).unwrap_or(0),
        kills_to_level,
        exp_last_kill: state.last3_kills.back().map(|k| k.delta_exp).unwrap_or(0.0),
        session_duration: state.session_start_time.map(|t| now.saturating_sub(t)).unwrap_or(0),
        last3_kills: state.last3_kills.iter().cloned().collect(),
        current_lvl: state.last_level,
        current_exp: state.last_exp,
        monsters_by_rank,
    }
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_handles_odd_and_even() {
        assert_eq!(median(&[]), 0.0);
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[1.0, 4.0]), 2.5);
    }

    #[test]
    fn rounding_matches_display_precision() {
        assert_eq!(round_to(12.345, 1), 12.3);
        assert_eq!(round_to(0.123456, 4), 0.1235);
    }
}
