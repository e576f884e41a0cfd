use actix::{Handler, ResponseFuture};
use tracing::{error, warn};

use super::messages::*;
use super::ProfileRegistry;
use crate::profile::messages::{GetProfileSnapshot, ProcessSample, ProfileSnapshot, ResetProfile};

impl Handler<SubmitSample> for ProfileRegistry {
    type Result = ();

    fn handle(&mut self, msg: SubmitSample, _ctx: &mut Self::Context) -> Self::Result {
        let profile_id = msg.sample.profile_id.trim().to_string();
        if profile_id.is_empty() {
            warn!("Dropping sample without profileId");
            metrics::PROCESSING_ERRORS_TOTAL.inc();
            return;
        }

        let addr = self.profile_addr(&profile_id);
        // mailbox 가 가득 차도 sample 을 버리지 않는다
        addr.do_send(ProcessSample {
            sample: msg.sample,
            received_at: msg.received_at,
        });
    }
}

impl Handler<RequestReset> for ProfileRegistry {
    type Result = bool;

    fn handle(&mut self, msg: RequestReset, _ctx: &mut Self::Context) -> Self::Result {
        match self.profiles.get(&msg.profile_id) {
            Some(addr) if addr.connected() => {
                addr.do_send(ResetProfile { scope: msg.scope });
                true
            }
            _ => {
                warn!("Profile {} not found in registry", msg.profile_id);
                false
            }
        }
    }
}

impl Handler<GetSnapshot> for ProfileRegistry {
    type Result = ResponseFuture<Option<ProfileSnapshot>>;

    fn handle(&mut self, msg: GetSnapshot, _ctx: &mut Self::Context) -> Self::Result {
        let addr = self.profiles.get(&msg.profile_id).cloned();
        Box::pin(async move {
            let addr = addr?;
            match addr.send(GetProfileSnapshot).await {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    error!("Snapshot request for {} failed: {}", msg.profile_id, e);
                    metrics::PROCESSING_ERRORS_TOTAL.inc();
                    None
                }
            }
        })
    }
}

impl Handler<GetProfileCount> for ProfileRegistry {
    type Result = usize;

    fn handle(&mut self, _msg: GetProfileCount, _ctx: &mut Self::Context) -> Self::Result {
        self.profiles.len()
    }
}
