use actix::Message;

use crate::{
    profile::messages::{ProfileSnapshot, ResetScope},
    protocol::Sample,
};

#[derive(Message)]
#[rtype(result = "()")]
pub struct SubmitSample {
    pub sample: Sample,
    pub received_at: i64,
}

/// 해당 프로필이 살아 있으면 true
#[derive(Message)]
#[rtype(result = "bool")]
pub struct RequestReset {
    pub profile_id: String,
    pub scope: ResetScope,
}

#[derive(Message)]
#[rtype(result = "Option<ProfileSnapshot>")]
pub struct GetSnapshot {
    pub profile_id: String,
}

#[derive(Message)]
#[rtype(result = "usize")]
pub struct GetProfileCount;
