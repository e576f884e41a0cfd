use actix::Message;
use serde::{Deserialize, Serialize};

use crate::{
    engine::{DerivedStats, PendingSuspect, ProfileState},
    protocol::{Sample, TtkPayload},
    ttk::TtkState,
};

#[derive(Message)]
#[rtype(result = "()")]
pub struct ProcessSample {
    pub sample: Sample,
    /// sample 에 timestamp 가 없을 때 쓰는 수신 시각 (epoch ms)
    pub received_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResetScope {
    /// 세션 카운터만
    Session,
    /// 누적 값까지 전부
    All,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct ResetProfile {
    pub scope: ResetScope,
}

#[derive(Message)]
#[rtype(result = "ProfileSnapshot")]
pub struct GetProfileSnapshot;

/// 테스트와 진단용 프로필 상태 사본
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    pub profile_id: String,
    pub state: ProfileState,
    pub stats: DerivedStats,
    pub ttk_state: TtkState,
    pub ttk: Option<TtkPayload>,
    pub pending_suspect: Option<PendingSuspect>,
}
