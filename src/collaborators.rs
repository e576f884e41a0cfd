use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};
use tracing::info;

use crate::{
    engine::{KillEvent, ProfileState},
    errors::{KillfeedError, KillfeedResult},
};

/// 확정된 kill 을 기록하는 append-only 로그
#[async_trait]
pub trait KillHistory: Send + Sync {
    async fn append(&self, profile_id: &str, event: &KillEvent) -> KillfeedResult<()>;
}

/// 프로필 상태 저장소
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, profile_id: &str) -> KillfeedResult<Option<ProfileState>>;
    async fn save(&self, profile_id: &str, state: &ProfileState) -> KillfeedResult<()>;
}

/// `kill-registered` 알림
#[async_trait]
pub trait KillNotifier: Send + Sync {
    async fn kill_registered(&self, profile_id: &str, event: &KillEvent) -> KillfeedResult<()>;
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryLine<'a> {
    profile_id: &'a str,
    #[serde(flatten)]
    event: &'a KillEvent,
}

/// 한 줄에 kill 하나씩 JSON 으로 쓴다.
pub struct JsonLinesHistory {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesHistory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl KillHistory for JsonLinesHistory {
    async fn append(&self, profile_id: &str, event: &KillEvent) -> KillfeedResult<()> {
        let mut line = serde_json::to_string(&HistoryLine { profile_id, event })?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let io_err = |e: std::io::Error| KillfeedError::io(self.path.display().to_string(), e);
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(io_err)?;
        file.write_all(line.as_bytes()).await.map_err(io_err)?;
        file.flush().await.map_err(io_err)?;
        Ok(())
    }
}

/// 프로필마다 `<dir>/<profile>.json` 하나
pub struct JsonFileStateStore {
    dir: PathBuf,
}

impl JsonFileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_for(&self, profile_id: &str) -> PathBuf {
        let safe: String = profile_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", safe))
    }
}

#[async_trait]
impl StateStore for JsonFileStateStore {
    async fn load(&self, profile_id: &str) -> KillfeedResult<Option<ProfileState>> {
        let path = self.file_for(profile_id);
        match fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KillfeedError::io(path.display().to_string(), e)),
        }
    }

    async fn save(&self, profile_id: &str, state: &ProfileState) -> KillfeedResult<()> {
        let path = self.file_for(profile_id);
        let io_err = |e: std::io::Error| KillfeedError::io(path.display().to_string(), e);
        let body = serde_json::to_vec_pretty(state)?;

        fs::create_dir_all(&self.dir).await.map_err(io_err)?;
        // 쓰는 도중 죽어도 이전 파일이 남도록 임시 파일을 거친다
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body).await.map_err(io_err)?;
        fs::rename(&tmp, &path).await.map_err(io_err)?;
        Ok(())
    }
}

pub struct TracingNotifier;

#[async_trait]
impl KillNotifier for TracingNotifier {
    async fn kill_registered(&self, profile_id: &str, event: &KillEvent) -> KillfeedResult<()> {
        info!(
            "[{}] kill-registered #{} {} (+{:.4}%, ttk {:?})",
            profile_id, event.seq, event.monster_name, event.delta_exp, event.ttk_ms
        );
        Ok(())
    }
}

/// 아무것도 하지 않는 구현
pub struct Noop;

#[async_trait]
impl KillHistory for Noop {
    async fn append(&self, _profile_id: &str, _event: &KillEvent) -> KillfeedResult<()> {
        Ok(())
    }
}

#[async_trait]
impl StateStore for Noop {
    async fn load(&self, _profile_id: &str) -> KillfeedResult<Option<ProfileState>> {
        Ok(None)
    }

    async fn save(&self, _profile_id: &str, _state: &ProfileState) -> KillfeedResult<()> {
        Ok(())
    }
}

#[async_trait]
impl KillNotifier for Noop {
    async fn kill_registered(&self, _profile_id: &str, _event: &KillEvent) -> KillfeedResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monster::MonsterRank;
    use uuid::Uuid;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("killfeed-collab-{}", Uuid::new_v4()))
    }

    fn event(seq: u64) -> KillEvent {
        KillEvent {
            seq,
            monster_name: "Aibatt".to_string(),
            delta_exp: 0.5,
            timestamp: 1_000,
            rank: MonsterRank::Normal,
            monster_id: Some(1),
            monster_level: Some(1),
            expected_exp: None,
            ttk_ms: Some(1_200),
        }
    }

    #[tokio::test]
    async fn history_appends_one_line_per_kill() {
        let dir = temp_dir();
        let history = JsonLinesHistory::new(dir.join("history.jsonl"));
        history.append("profile-a", &event(1)).await.unwrap();
        history.append("profile-a", &event(2)).await.unwrap();

        let raw = std::fs::read_to_string(history.path()).unwrap();
        let lines: Vec<serde_json::Value> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["profileId"], "profile-a");
        assert_eq!(lines[1]["seq"], 2);
        assert_eq!(lines[1]["ttkMs"], 1_200);

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn state_store_round_trips_and_sanitizes_ids() {
        let dir = temp_dir();
        let store = JsonFileStateStore::new(&dir);
        assert!(store.load("../escape").await.unwrap().is_none());

        let state = ProfileState {
            kills_session: 3,
            kills_total: 10,
            exp_total: 4.5,
            ..ProfileState::default()
        };
        store.save("../escape", &state).await.unwrap();
        assert!(dir.join("___escape.json").exists());
        assert_eq!(store.load("../escape").await.unwrap(), Some(state));

        std::fs::remove_dir_all(dir).ok();
    }
}
