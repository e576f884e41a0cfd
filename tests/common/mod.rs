#![allow(dead_code)]

use std::{path::PathBuf, sync::Arc, time::Duration};

use actix::{Actor, Addr};
use async_trait::async_trait;
use killfeed::{
    broadcast::ChannelSink,
    collaborators::{KillHistory, Noop, StateStore},
    engine::KillEvent,
    env::{DetectionSettings, TtkSettings},
    errors::KillfeedResult,
    monster::{Element, MonsterExpTables, MonsterIndex, MonsterRank, MonsterRecord, MonsterResolver},
    profile::{messages::ProfileSnapshot, ProfileDeps},
    protocol::{Sample, StateBroadcast},
    registry::{messages::GetSnapshot, ProfileRegistry},
    validator::OutlierValidator,
};
use parking_lot::Mutex;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use uuid::Uuid;

pub const T0: i64 = 1_700_000_000_000;
pub const BROADCAST_INTERVAL: Duration = Duration::from_millis(50);

pub fn setup_logger() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("killfeed=debug")
        .with_test_writer()
        .try_init();
}

/// 테스트용 레퍼런스 데이터
///
/// - Aibatt: HP 20, 레벨 10 기준 기대 경험치 0.5
/// - Mia: HP 500, 테이블 없음
/// - Giant Aibatt: 보스급, HP 2000, 기대 경험치 0.5
pub fn reference_records() -> Vec<MonsterRecord> {
    vec![
        MonsterRecord {
            id: 20,
            name: "Aibatt".to_string(),
            level: 1,
            element: Element::Wind,
            rank: MonsterRank::Normal,
            hp: Some(20),
        },
        MonsterRecord {
            id: 42,
            name: "Mia".to_string(),
            level: 10,
            element: Element::Fire,
            rank: MonsterRank::Normal,
            hp: Some(500),
        },
        MonsterRecord {
            id: 22,
            name: "Giant Aibatt".to_string(),
            level: 5,
            element: Element::Wind,
            rank: MonsterRank::Giant,
            hp: Some(2000),
        },
    ]
}

/// 경험치 테이블 디렉터리. 일부러 preload 하지 않는다.
pub fn exp_table_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("killfeed-it-{}", Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();
    for (id, name) in [(20, "Aibatt"), (22, "Giant Aibatt")] {
        let body = format!(
            r#"{{"id":{},"name":{{"en":"{}"}},"experienceTable":[{}]}}"#,
            id,
            name,
            vec!["0.5"; 10].join(",")
        );
        std::fs::write(dir.join(format!("{}.json", id)), body).unwrap();
    }
    dir
}

/// 확정된 kill 만 기록한다
#[derive(Default)]
pub struct RecordingHistory {
    pub events: Mutex<Vec<(String, KillEvent)>>,
}

impl RecordingHistory {
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }
}

#[async_trait]
impl KillHistory for RecordingHistory {
    async fn append(&self, profile_id: &str, event: &KillEvent) -> KillfeedResult<()> {
        self.events
            .lock()
            .push((profile_id.to_string(), event.clone()));
        Ok(())
    }
}

pub struct TestHarness {
    pub registry: Addr<ProfileRegistry>,
    pub broadcasts: UnboundedReceiver<StateBroadcast>,
    pub history: Arc<RecordingHistory>,
    pub table_dir: PathBuf,
}

impl TestHarness {
    pub fn start(worker_arbiters: usize) -> Self {
        Self::start_with_store(worker_arbiters, Arc::new(Noop))
    }

    pub fn start_with_store(worker_arbiters: usize, store: Arc<dyn StateStore>) -> Self {
        setup_logger();

        let table_dir = exp_table_dir();
        let exp_tables = Arc::new(MonsterExpTables::new(&table_dir));
        let history = Arc::new(RecordingHistory::default());
        let (tx, broadcasts) = unbounded_channel();

        let deps = ProfileDeps {
            detection: DetectionSettings::default(),
            ttk: TtkSettings::default(),
            broadcast_interval: BROADCAST_INTERVAL,
            resolver: MonsterResolver::new(Arc::new(MonsterIndex::new(reference_records()))),
            validator: OutlierValidator::new(exp_tables.clone()),
            exp_tables,
            history: history.clone(),
            store,
            notifier: Arc::new(Noop),
            sink: Arc::new(ChannelSink::new(tx)),
        };

        Self {
            registry: ProfileRegistry::new(deps, worker_arbiters).start(),
            broadcasts,
            history,
            table_dir,
        }
    }

    pub async fn snapshot(&self, profile_id: &str) -> ProfileSnapshot {
        self.registry
            .send(GetSnapshot {
                profile_id: profile_id.to_string(),
            })
            .await
            .expect("registry mailbox closed")
            .expect("profile not registered")
    }

    /// corrective 플래그가 붙은 broadcast 가 올 때까지 기다린다.
    pub async fn next_corrective(&mut self) -> StateBroadcast {
        loop {
            let broadcast = tokio::time::timeout(Duration::from_secs(2), self.broadcasts.recv())
                .await
                .expect("timed out waiting for corrective broadcast")
                .expect("broadcast channel closed");
            if broadcast.corrective {
                return broadcast;
            }
        }
    }

    pub fn drain_broadcasts(&mut self) -> Vec<StateBroadcast> {
        let mut drained = Vec::new();
        while let Ok(broadcast) = self.broadcasts.try_recv() {
            drained.push(broadcast);
        }
        drained
    }

    /// background 로 기록되는 history 를 잠시 기다린다.
    pub async fn wait_for_history(&self, expected: usize) -> usize {
        for _ in 0..50 {
            if self.history.len() >= expected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        self.history.len()
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.table_dir).ok();
    }
}

/// 레벨 10 고정 sample
pub fn sample(profile_id: &str, exp: f64, hp: Option<&str>, at: i64) -> Sample {
    Sample {
        profile_id: profile_id.to_string(),
        level: Some(10.0),
        exp: Some(exp),
        enemy_hp: hp.map(str::to_string),
        monster_name: None,
        timestamp: Some(at),
        manual_exp: false,
    }
}
