use std::{
    io::Write,
    time::{Duration, Instant},
};

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info};

use crate::protocol::StateBroadcast;

/// `request` 에 대한 스케줄러의 결정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// 지금 바로 보낸다 (leading)
    SendNow,
    /// window 가 닫힐 때 한 번 보낸다. 토큰은 `fire_trailing` 에 그대로 돌려준다.
    ScheduleTrailing { delay: Duration, token: u64 },
    /// 이미 예약된 trailing 전송에 합쳐졌다
    Coalesced,
}

/// 프로필 하나의 브로드캐스트 throttle.
/// 시간은 호출자가 넣어주므로 타이머 없이 테스트할 수 있다.
#[derive(Debug)]
pub struct Debouncer {
    interval: Duration,
    last_sent: Option<Instant>,
    pending: Option<u64>,
    next_token: u64,
}

impl Debouncer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
            pending: None,
            next_token: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn request(&mut self, now: Instant) -> Decision {
        if self.pending.is_some() {
            return Decision::Coalesced;
        }

        let elapsed = self.last_sent.map(|sent| now.saturating_duration_since(sent));
        match elapsed {
            Some(elapsed) if elapsed < self.interval => {
                self.next_token += 1;
                self.pending = Some(self.next_token);
                Decision::ScheduleTrailing {
                    delay: self.interval - elapsed,
                    token: self.next_token,
                }
            }
            _ => {
                self.last_sent = Some(now);
                Decision::SendNow
            }
        }
    }

    /// 예약 시각이 되었을 때 호출. 아직 유효한 예약이면 true.
    pub fn fire_trailing(&mut self, token: u64, now: Instant) -> bool {
        if self.pending == Some(token) {
            self.pending = None;
            self.last_sent = Some(now);
            true
        } else {
            false
        }
    }

    /// throttle 을 무시하고 즉시 보낸다. 예약된 trailing 은 오래된 값을 실어 나르므로 취소한다.
    pub fn force(&mut self, now: Instant) -> bool {
        let cancelled = self.pending.take().is_some();
        self.last_sent = Some(now);
        cancelled
    }

    pub fn reset(&mut self) {
        self.last_sent = None;
        self.pending = None;
    }
}

/// 계산된 상태를 바깥으로 내보내는 출구
pub trait BroadcastSink: Send + Sync {
    fn publish(&self, broadcast: StateBroadcast);
}

/// 테스트와 임베딩용 채널 sink
pub struct ChannelSink {
    tx: UnboundedSender<StateBroadcast>,
}

impl ChannelSink {
    pub fn new(tx: UnboundedSender<StateBroadcast>) -> Self {
        Self { tx }
    }
}

impl BroadcastSink for ChannelSink {
    fn publish(&self, broadcast: StateBroadcast) {
        if self.tx.send(broadcast).is_err() {
            debug!("broadcast receiver dropped");
        }
    }
}

/// 로그로만 남긴다
pub struct TracingSink;

impl BroadcastSink for TracingSink {
    fn publish(&self, broadcast: StateBroadcast) {
        info!(
            "[{}] kills {}/{} exp {:.4} kph {} corrective={}",
            broadcast.profile_id,
            broadcast.stats.kills_session,
            broadcast.stats.kills_total,
            broadcast.stats.exp_session,
            broadcast.stats.kills_per_hour,
            broadcast.corrective
        );
    }
}

/// 한 줄에 하나씩 JSON 으로 stdout 에 쓴다.
pub struct JsonLinesSink;

impl BroadcastSink for JsonLinesSink {
    fn publish(&self, broadcast: StateBroadcast) {
        match serde_json::to_string(&broadcast) {
            Ok(line) => {
                let mut stdout = std::io::stdout().lock();
                if let Err(e) = writeln!(stdout, "{}", line) {
                    error!("Failed to write broadcast: {}", e);
                }
            }
            Err(e) => error!("Failed to serialize broadcast: {}", e),
        }
    }
}
