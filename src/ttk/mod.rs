use serde::Serialize;
use tracing::debug;

use crate::{
    env::TtkSettings,
    monster::{within_hp_tolerance, HpReading, ResolvedIdentity},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TtkPhase {
    Idle,
    Combat,
    Paused,
}

/// 고정된 boss 급 대상 하나에 대한 전투 타이머
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TtkState {
    pub state: TtkPhase,
    pub monster_name: Option<String>,
    pub monster_max_hp: Option<u64>,
    pub combat_start_time: Option<i64>,
    pub accumulated_ms: i64,
    pub last_active_time: Option<i64>,
    pub pause_start_time: Option<i64>,
}

impl Default for TtkState {
    fn default() -> Self {
        Self {
            state: TtkPhase::Idle,
            monster_name: None,
            monster_max_hp: None,
            combat_start_time: None,
            accumulated_ms: 0,
            last_active_time: None,
            pause_start_time: None,
        }
    }
}

/// 완료된 전투들의 요약
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TtkSummary {
    pub last_ms: u64,
    pub min_ms: u64,
    pub total_ms: u64,
    pub count: u64,
}

impl TtkSummary {
    pub fn avg_ms(&self) -> Option<f64> {
        (self.count > 0).then(|| self.total_ms as f64 / self.count as f64)
    }

    fn record(&mut self, ms: u64) {
        self.min_ms = if self.count == 0 {
            ms
        } else {
            self.min_ms.min(ms)
        };
        self.last_ms = ms;
        self.total_ms = self.total_ms.saturating_add(ms);
        self.count += 1;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TtkObservation<'a> {
    pub tick: i64,
    pub hp: Option<HpReading>,
    pub identity: Option<&'a ResolvedIdentity>,
}

#[derive(Debug)]
pub struct TtkTracker {
    settings: TtkSettings,
    state: TtkState,
    summary: TtkSummary,
    // 직전 완료 이전의 요약. kill 롤백 시 되돌린다.
    undo: Option<(u64, TtkSummary)>,
}

impl TtkTracker {
    pub fn new(settings: TtkSettings) -> Self {
        Self {
            settings,
            state: TtkState::default(),
            summary: TtkSummary::default(),
            undo: None,
        }
    }

    pub fn state(&self) -> &TtkState {
        &self.state
    }

    pub fn summary(&self) -> &TtkSummary {
        &self.summary
    }

    fn is_boss(&self, identity: Option<&ResolvedIdentity>) -> bool {
        identity.is_some_and(|i| self.settings.boss_ranks.contains(&i.rank))
    }

    pub fn observe(&mut self, obs: TtkObservation<'_>) {
        let target = match (obs.hp, obs.identity) {
            (Some(hp), Some(identity)) if self.is_boss(Some(identity)) => Some((identity, hp)),
            _ => None,
        };

        match self.state.state {
            TtkPhase::Idle => {
                if let Some((identity, hp)) = target {
                    self.pin(identity, hp, obs.tick);
                }
            }
            TtkPhase::Combat => match target {
                Some((identity, hp)) if self.is_same_target(identity, hp) => {
                    self.accumulate(obs.tick);
                }
                Some((identity, hp)) => self.pin(identity, hp, obs.tick),
                None => {
                    self.accumulate(obs.tick);
                    self.state.state = TtkPhase::Paused;
                    self.state.pause_start_time = Some(obs.tick);
                }
            },
            TtkPhase::Paused => {
                let paused_for = self
                    .state
                    .pause_start_time
                    .map(|start| obs.tick.saturating_sub(start))
                    .unwrap_or(0);
                if paused_for > self.settings.grace_ms {
                    debug!("ttk grace elapsed after {}ms, resetting", paused_for);
                    self.state = TtkState::default();
                    self.observe(obs);
                    return;
                }
                match target {
                    Some((identity, hp)) if self.is_same_target(identity, hp) => {
                        // 멈춰 있던 시간은 더하지 않는다
                        self.state.state = TtkPhase::Combat;
                        self.state.last_active_time = Some(obs.tick);
                        self.state.pause_start_time = None;
                    }
                    Some((identity, hp)) => self.pin(identity, hp, obs.tick),
                    None => {}
                }
            }
        }
    }

    fn pin(&mut self, identity: &ResolvedIdentity, hp: HpReading, tick: i64) {
        debug!("ttk pinned {} (max hp {})", identity.name, hp.max);
        self.state = TtkState {
            state: TtkPhase::Combat,
            monster_name: Some(identity.name.clone()).filter(|n| !n.is_empty()),
            monster_max_hp: Some(hp.max),
            combat_start_time: Some(tick),
            accumulated_ms: 0,
            last_active_time: Some(tick),
            pause_start_time: None,
        };
    }

    fn accumulate(&mut self, tick: i64) {
        if let Some(last) = self.state.last_active_time {
            self.state.accumulated_ms = self
                .state
                .accumulated_ms
                .saturating_add(tick.saturating_sub(last).max(0));
        }
        self.state.last_active_time = Some(tick);
    }

    /// 이름이 양쪽에 있으면 이름으로, 아니면 max HP 허용 오차로 비교한다.
    fn is_same_target(&self, identity: &ResolvedIdentity, hp: HpReading) -> bool {
        match (self.state.monster_name.as_deref(), identity.name.as_str()) {
            (Some(pinned), current) if !current.is_empty() => pinned == current,
            _ => self
                .state
                .monster_max_hp
                .is_some_and(|pinned| within_hp_tolerance(pinned, hp.max)),
        }
    }

    /// kill 이 등록되면 누적 시간을 읽고 idle 로 돌아간다. idle 이었다면 None.
    pub fn complete(&mut self, kill_seq: u64) -> Option<u64> {
        if self.state.state == TtkPhase::Idle {
            return None;
        }
        let ttk = self.state.accumulated_ms.max(0) as u64;
        self.state = TtkState::default();
        self.undo = Some((kill_seq, self.summary));
        self.summary.record(ttk);
        Some(ttk)
    }

    /// 롤백된 kill 이 만든 TTK 샘플을 요약에서 뺀다.
    pub fn discard(&mut self, kill_seq: u64) -> bool {
        match self.undo {
            Some((seq, previous)) if seq == kill_seq => {
                self.summary = previous;
                self.undo = None;
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.state = TtkState::default();
        self.summary = TtkSummary::default();
        self.undo = None;
    }
}
