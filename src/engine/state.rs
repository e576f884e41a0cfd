use std::collections::{BTreeMap, VecDeque};

use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};

use crate::monster::MonsterRank;

pub const UNKNOWN_MONSTER: &str = "Unknown";
pub const LAST_KILLS_CAPACITY: usize = 3;

/// 한 프로필의 누적 상태. 그대로 직렬화되어 저장/복원된다.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileState {
    pub kills_session: u64,
    pub kills_total: u64,
    pub exp_session: f64,
    pub exp_total: f64,
    pub exp_today: f64,
    /// 로컬 날짜 `YYYY-MM-DD`
    pub exp_today_key: Option<String>,
    pub session_start_time: Option<i64>,
    pub last_level: Option<u32>,
    pub last_exp: Option<f64>,
    pub last_update_time: Option<i64>,
    pub rolling_kills: VecDeque<RollingKill>,
    pub last3_kills: VecDeque<KillRecord>,
    pub last_kill_time: Option<i64>,
    pub monsters: BTreeMap<String, MonsterTally>,
}

impl ProfileState {
    /// 날짜가 바뀌었으면 오늘 버킷을 비운다.
    pub fn ensure_daily_bucket(&mut self, now: i64) {
        let today = day_key(now);
        if self.exp_today_key.as_deref() != Some(today.as_str()) {
            self.exp_today_key = Some(today);
            self.exp_today = 0.0;
        }
    }

    /// cutoff 이전(포함) 기록을 버린다.
    pub fn prune_rolling(&mut self, now: i64, window_ms: i64) {
        let cutoff = now.saturating_sub(window_ms);
        self.rolling_kills.retain(|k| k.timestamp > cutoff);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollingKill {
    pub timestamp: i64,
    pub delta_exp: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillRecord {
    pub monster_name: String,
    pub delta_exp: f64,
    pub timestamp: i64,
    pub monster_id: Option<u64>,
    pub monster_level: Option<u32>,
    pub expected_exp: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonsterTally {
    pub count: u64,
    pub rank: MonsterRank,
    pub last_kill_time: Option<i64>,
}

/// 등록된 kill 하나. `seq` 는 프로필 안에서 단조 증가하며 롤백 대상 지정에 쓰인다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillEvent {
    pub seq: u64,
    pub monster_name: String,
    pub delta_exp: f64,
    pub timestamp: i64,
    pub rank: MonsterRank,
    pub monster_id: Option<u64>,
    pub monster_level: Option<u32>,
    pub expected_exp: Option<f64>,
    pub ttk_ms: Option<u64>,
}

/// 확인 대기 중인 비정상적으로 큰 exp 증가
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSuspect {
    pub delta_exp: f64,
    pub monster_name: String,
    pub timestamp: i64,
}

/// 직전 kill 을 정확히 되돌리기 위한 kill 이전 값들
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct KillUndo {
    pub seq: u64,
    pub kills_session: u64,
    pub kills_total: u64,
    pub exp_session: f64,
    pub exp_total: f64,
    pub exp_today: f64,
    pub exp_today_key: Option<String>,
    pub session_start_time: Option<i64>,
    pub last_kill_time: Option<i64>,
    pub rolling_entry: RollingKill,
    pub evicted_last_kill: Option<KillRecord>,
    pub monster_name: String,
    pub previous_tally: Option<MonsterTally>,
}

pub fn day_key(timestamp_ms: i64) -> String {
    match Local.timestamp_millis_opt(timestamp_ms).single() {
        Some(local) => local.format("%Y-%m-%d").to_string(),
        None => "1970-01-01".to_string(),
    }
}
