use actix::{Context, Handler, MessageResult};
use tracing::{error, info};

use super::messages::*;
use super::ProfileActor;
use crate::protocol::TtkPayload;

impl Handler<ProcessSample> for ProfileActor {
    type Result = ();

    fn handle(&mut self, msg: ProcessSample, ctx: &mut Self::Context) -> Self::Result {
        metrics::SAMPLES_PROCESSED_TOTAL.inc();
        let signals = match msg.sample.signals(msg.received_at) {
            Ok(signals) => signals,
            Err(e) => {
                error!("[{}] sample dropped: {}", self.profile_id, e);
                metrics::PROCESSING_ERRORS_TOTAL.inc();
                return;
            }
        };
        self.engine.start_session(signals.timestamp);
        self.process_tick(signals, ctx);
    }
}

impl Handler<ResetProfile> for ProfileActor {
    type Result = ();

    fn handle(&mut self, msg: ResetProfile, ctx: &mut Context<Self>) -> Self::Result {
        info!("[{}] reset ({:?})", self.profile_id, msg.scope);
        match msg.scope {
            ResetScope::Session => self.engine.reset_session(),
            ResetScope::All => {
                let now = self.now();
                self.engine.reset_all(now);
            }
        }
        self.clear_tick_state();
        self.force_broadcast(false, ctx);
        self.persist();
    }
}

impl Handler<GetProfileSnapshot> for ProfileActor {
    type Result = MessageResult<GetProfileSnapshot>;

    fn handle(&mut self, _msg: GetProfileSnapshot, _ctx: &mut Self::Context) -> Self::Result {
        let now = self.now();
        MessageResult(ProfileSnapshot {
            profile_id: self.profile_id.clone(),
            stats: self.engine.stats(now),
            state: self.engine.state().clone(),
            ttk_state: self.ttk.state().clone(),
            ttk: TtkPayload::from_summary(self.ttk.summary()),
            pending_suspect: self.engine.pending_suspect().cloned(),
        })
    }
}
