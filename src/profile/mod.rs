use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use actix::{Actor, ActorFutureExt, AsyncContext, Context, SpawnHandle, WrapFuture};
use tracing::{debug, error, info, warn};

use crate::{
    broadcast::{BroadcastSink, Debouncer, Decision},
    collaborators::{KillHistory, KillNotifier, StateStore},
    engine::{within_expected_range, KillEngine, KillEvent, TickInput, TickOutcome},
    env::{DetectionSettings, Settings, TtkSettings},
    monster::{MonsterExpTables, MonsterResolver, ResolutionSignal, ResolvedIdentity},
    protocol::{StateBroadcast, TickSignals, TtkPayload},
    ttk::{TtkObservation, TtkTracker},
    validator::{OutlierValidator, Verdict},
};

pub mod handlers;
pub mod messages;

/// 모든 프로필 actor 가 공유하는 의존성
#[derive(Clone)]
pub struct ProfileDeps {
    pub detection: DetectionSettings,
    pub ttk: TtkSettings,
    pub broadcast_interval: Duration,
    pub resolver: MonsterResolver,
    pub exp_tables: Arc<MonsterExpTables>,
    pub validator: OutlierValidator,
    pub history: Arc<dyn KillHistory>,
    pub store: Arc<dyn StateStore>,
    pub notifier: Arc<dyn KillNotifier>,
    pub sink: Arc<dyn BroadcastSink>,
}

impl ProfileDeps {
    pub fn new(
        settings: &Settings,
        resolver: MonsterResolver,
        exp_tables: Arc<MonsterExpTables>,
        history: Arc<dyn KillHistory>,
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn KillNotifier>,
        sink: Arc<dyn BroadcastSink>,
    ) -> Self {
        Self {
            detection: settings.detection.clone(),
            ttk: settings.ttk.clone(),
            broadcast_interval: Duration::from_millis(settings.broadcast.interval_ms),
            resolver,
            validator: OutlierValidator::new(exp_tables.clone()),
            exp_tables,
            history,
            store,
            notifier,
            sink,
        }
    }
}

/// 직전 틱의 식별 결과. 이름 신호가 전혀 없는 틱에서 잠깐 재사용한다.
#[derive(Debug, Clone)]
struct Carryover {
    identity: ResolvedIdentity,
    resolved_at: i64,
}

/// 프로필 하나. mailbox 가 곧 틱 직렬화 순서다.
pub struct ProfileActor {
    pub(super) profile_id: String,
    pub(super) deps: ProfileDeps,
    pub(super) engine: KillEngine,
    pub(super) ttk: TtkTracker,
    carryover: Option<Carryover>,
    hp_seen_at: Option<i64>,
    // 통계 계산 기준 시각 (마지막 틱 시각)
    clock: Option<i64>,
    debouncer: Debouncer,
    trailing: Option<SpawnHandle>,
}

impl ProfileActor {
    pub fn new(profile_id: String, deps: ProfileDeps) -> Self {
        Self {
            engine: KillEngine::new(deps.detection.clone()),
            ttk: TtkTracker::new(deps.ttk.clone()),
            debouncer: Debouncer::new(deps.broadcast_interval),
            profile_id,
            deps,
            carryover: None,
            hp_seen_at: None,
            clock: None,
            trailing: None,
        }
    }

    pub(super) fn now(&self) -> i64 {
        self.clock.unwrap_or_else(now_ms)
    }

    pub(super) fn process_tick(&mut self, signals: TickSignals, ctx: &mut Context<Self>) {
        let tick = signals.timestamp;
        self.clock = Some(self.clock.map_or(tick, |c| c.max(tick)));

        if signals.hp.is_present() {
            self.hp_seen_at = Some(tick);
        }

        let player_level = signals.level.or(self.engine.last_level());
        let identity = self.resolve_identity(&signals, player_level);

        if signals.manual_exp {
            if let Some(exp) = signals.exp {
                info!("[{}] manual exp baseline {:.4}", self.profile_id, exp);
                self.engine.apply_manual_exp(exp, signals.level, tick);
                self.persist();
            }
            self.request_broadcast(ctx);
            return;
        }

        self.ttk.observe(TtkObservation {
            tick,
            hp: signals.hp.reading(),
            identity: identity.as_ref(),
        });

        let outcome = self.engine.process(
            TickInput {
                level: signals.level,
                exp: signals.exp,
                timestamp: tick,
                hp_seen_at: self.hp_seen_at,
                identity: identity.as_ref(),
            },
            within_expected_range,
        );

        match outcome {
            TickOutcome::Kill(mut event) => {
                event.ttk_ms = self.ttk.complete(event.seq);
                metrics::KILLS_REGISTERED_TOTAL.inc();
                if let Some(ttk_ms) = event.ttk_ms {
                    metrics::TTK_SECONDS.observe(ttk_ms as f64 / 1000.0);
                }
                info!(
                    "[{}] kill #{} {} +{:.4}",
                    self.profile_id, event.seq, event.monster_name, event.delta_exp
                );

                // 낙관적 브로드캐스트를 먼저 요청한 뒤 검증한다
                self.request_broadcast(ctx);
                // 디스크 조회 중에는 run_later 도 멈추므로 trailing 을 기다리지 않는다
                let cached = self
                    .deps
                    .exp_tables
                    .lookup_is_cached(event.monster_id, &event.monster_name);
                if self.debouncer.has_pending() && !cached {
                    self.force_broadcast(false, ctx);
                }
                self.validate_kill(event, player_level.unwrap_or(1), ctx);
            }
            TickOutcome::NotEvaluated => {
                metrics::SAMPLES_INCOMPLETE_TOTAL.inc();
                self.request_broadcast(ctx);
            }
            other => {
                debug!("[{}] tick {} -> {:?}", self.profile_id, tick, other);
                self.request_broadcast(ctx);
            }
        }
    }

    fn resolve_identity(
        &mut self,
        signals: &TickSignals,
        player_level: Option<u32>,
    ) -> Option<ResolvedIdentity> {
        let tick = signals.timestamp;
        let resolved = match self.deps.resolver.resolve(&signals.hp, &signals.name) {
            Some((identity, signal)) => {
                self.carryover = Some(Carryover {
                    identity: identity.clone(),
                    resolved_at: tick,
                });
                Some((identity, signal))
            }
            None => self.carried_identity(signals),
        };

        let label = resolved
            .as_ref()
            .map(|(_, signal)| signal.as_str())
            .unwrap_or("none");
        metrics::IDENTITY_RESOLUTIONS_TOTAL
            .with_label_values(&[label])
            .inc();

        resolved.map(|(identity, _)| {
            let expected = player_level.and_then(|level| {
                self.deps
                    .exp_tables
                    .expected_exp_cached(identity.id, &identity.name, level)
            });
            identity.with_expected_exp(expected)
        })
    }

    /// 토큰도 HP 값도 없는 틱에서만 직전 식별을 재사용한다.
    fn carried_identity(
        &self,
        signals: &TickSignals,
    ) -> Option<(ResolvedIdentity, ResolutionSignal)> {
        let no_name_signal = signals.name.hint().is_none() && signals.hp.reading().is_none();
        if !no_name_signal {
            return None;
        }
        let carry = self.carryover.as_ref()?;
        let age = signals.timestamp.saturating_sub(carry.resolved_at);
        (age >= 0 && age <= self.deps.detection.identity_carryover_ms)
            .then(|| (carry.identity.clone(), ResolutionSignal::Carryover))
    }

    /// 검증이 끝날 때까지 mailbox 를 붙잡아 두어 롤백 대상이 항상 직전 kill 이 되게 한다.
    fn validate_kill(&mut self, event: KillEvent, player_level: u32, ctx: &mut Context<Self>) {
        let validator = self.deps.validator.clone();
        ctx.wait(
            async move {
                let verdict = validator.validate(&event, player_level).await;
                (event, verdict)
            }
            .into_actor(self)
            .map(|(event, verdict), act, ctx| act.on_validated(event, verdict, ctx)),
        );
    }

    fn on_validated(&mut self, event: KillEvent, verdict: Verdict, ctx: &mut Context<Self>) {
        if let Verdict::Outlier { expected } = verdict {
            match self.engine.rollback(event.seq) {
                Ok(()) => {
                    self.ttk.discard(event.seq);
                    metrics::KILLS_ROLLED_BACK_TOTAL.inc();
                    warn!(
                        "[{}] kill #{} dropped: delta {:.4} exceeds expected {:.4}",
                        self.profile_id, event.seq, event.delta_exp, expected
                    );
                    self.force_broadcast(true, ctx);
                    return;
                }
                Err(e) => {
                    metrics::ROLLBACK_FAILURES_TOTAL.inc();
                    warn!(
                        "[{}] rollback of kill #{} ignored: {}",
                        self.profile_id, event.seq, e
                    );
                }
            }
        }
        self.finalize(event);
    }

    /// 확정된 kill 의 기록, 알림, 저장. 실패는 로그만 남긴다.
    fn finalize(&self, event: KillEvent) {
        let profile_id = self.profile_id.clone();
        let history = self.deps.history.clone();
        let notifier = self.deps.notifier.clone();

        actix::spawn(async move {
            if let Err(e) = history.append(&profile_id, &event).await {
                error!("[{}] history append failed: {}", profile_id, e);
                metrics::COLLABORATOR_FAILURES_TOTAL
                    .with_label_values(&["history"])
                    .inc();
            }
            if let Err(e) = notifier.kill_registered(&profile_id, &event).await {
                error!("[{}] kill notification failed: {}", profile_id, e);
                metrics::COLLABORATOR_FAILURES_TOTAL
                    .with_label_values(&["notifier"])
                    .inc();
            }
        });
        self.persist();
    }

    pub(super) fn persist(&self) {
        let profile_id = self.profile_id.clone();
        let store = self.deps.store.clone();
        let state = self.engine.state().clone();

        actix::spawn(async move {
            if let Err(e) = store.save(&profile_id, &state).await {
                error!("[{}] state save failed: {}", profile_id, e);
                metrics::COLLABORATOR_FAILURES_TOTAL
                    .with_label_values(&["store"])
                    .inc();
            }
        });
    }

    pub(super) fn request_broadcast(&mut self, ctx: &mut Context<Self>) {
        match self.debouncer.request(Instant::now()) {
            Decision::SendNow => self.publish(false, "leading"),
            Decision::ScheduleTrailing { delay, token } => {
                let handle = ctx.run_later(delay, move |act, _ctx| {
                    act.trailing = None;
                    if act.debouncer.fire_trailing(token, Instant::now()) {
                        act.publish(false, "trailing");
                    }
                });
                self.trailing = Some(handle);
            }
            Decision::Coalesced => {}
        }
    }

    pub(super) fn force_broadcast(&mut self, corrective: bool, ctx: &mut Context<Self>) {
        if self.debouncer.force(Instant::now()) {
            if let Some(handle) = self.trailing.take() {
                ctx.cancel_future(handle);
            }
        }
        self.publish(corrective, "forced");
    }

    fn publish(&mut self, corrective: bool, kind: &str) {
        let now = self.now();
        let broadcast = StateBroadcast {
            profile_id: self.profile_id.clone(),
            stats: self.engine.stats(now),
            ttk: TtkPayload::from_summary(self.ttk.summary()),
            corrective,
        };
        self.deps.sink.publish(broadcast);
        metrics::BROADCASTS_TOTAL.with_label_values(&[kind]).inc();
    }

    /// 프로필의 모든 틱 상태를 비운다.
    pub(super) fn clear_tick_state(&mut self) {
        self.ttk.reset();
        self.carryover = None;
        self.hp_seen_at = None;
    }
}

impl Actor for ProfileActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!("ProfileActor started for {}", self.profile_id);
        metrics::ACTIVE_PROFILES.inc();

        // 저장된 상태 복원이 끝나기 전에는 샘플을 처리하지 않는다
        let store = self.deps.store.clone();
        let profile_id = self.profile_id.clone();
        ctx.wait(
            async move { store.load(&profile_id).await }
                .into_actor(self)
                .map(|result, act, _ctx| match result {
                    Ok(Some(state)) => {
                        info!(
                            "[{}] restored state: {} kills total",
                            act.profile_id, state.kills_total
                        );
                        act.engine = KillEngine::with_state(act.deps.detection.clone(), state);
                        // 재시작은 새 세션이다. 누적값만 이어받는다.
                        act.engine.reset_session();
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!("[{}] state restore failed: {}", act.profile_id, e);
                        metrics::COLLABORATOR_FAILURES_TOTAL
                            .with_label_values(&["store"])
                            .inc();
                    }
                }),
        );
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        metrics::ACTIVE_PROFILES.dec();
        info!("ProfileActor stopped for {}", self.profile_id);
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
