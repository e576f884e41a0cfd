use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::future::join_all;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::index::normalize_name;

/// `<dir>/<id>.json` 파일 포맷
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExpTableFile {
    #[serde(default)]
    name: HashMap<String, Value>,
    #[serde(default)]
    experience_table: Vec<Value>,
}

struct LoadedTable {
    id: String,
    names: Vec<String>,
    table: Option<Arc<Vec<f64>>>,
}

#[derive(Default)]
struct ExpTableCache {
    // None 은 "읽어봤지만 쓸 수 없는 파일"
    by_id: HashMap<String, Option<Arc<Vec<f64>>>>,
    name_to_id: HashMap<String, String>,
    missing_names: HashSet<String>,
}

impl ExpTableCache {
    fn insert(&mut self, loaded: LoadedTable) {
        if loaded.table.is_some() {
            for name in loaded.names {
                self.name_to_id.entry(name).or_insert_with(|| loaded.id.clone());
            }
        }
        self.by_id.insert(loaded.id, loaded.table);
    }

    fn table_by_name(&self, normalized: &str) -> Option<Arc<Vec<f64>>> {
        let id = self.name_to_id.get(normalized)?;
        self.by_id.get(id).cloned().flatten()
    }
}

/// 몬스터별 레벨 → 기대 경험치 테이블.
/// 한 번 읽은 테이블은 프로세스가 끝날 때까지 유지된다.
pub struct MonsterExpTables {
    dir: PathBuf,
    cache: RwLock<ExpTableCache>,
}

impl MonsterExpTables {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(ExpTableCache::default()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 디렉터리의 모든 테이블을 병렬로 읽어 캐시에 채운다. 사용 가능한 테이블 수를 돌려준다.
    pub async fn preload_all(&self) -> usize {
        let ids = self.list_ids().await;
        let pending: Vec<String> = {
            let cache = self.cache.read();
            ids.into_iter()
                .filter(|id| !cache.by_id.contains_key(id))
                .collect()
        };

        let loaded = join_all(pending.into_iter().map(|id| load_table(&self.dir, id))).await;

        let mut cache = self.cache.write();
        for table in loaded {
            cache.insert(table);
        }
        let usable = cache.by_id.values().filter(|t| t.is_some()).count();
        metrics::EXP_TABLES_LOADED.set(usable as i64);
        info!(
            "Preloaded {} monster exp tables from {}",
            usable,
            self.dir.display()
        );
        usable
    }

    /// 이름(임의 locale)으로 테이블을 찾는다. 캐시에 없으면 디렉터리를 한 번 훑는다.
    pub async fn table_for(&self, monster_name: &str) -> Option<Arc<Vec<f64>>> {
        let normalized = normalize_name(monster_name);
        if normalized.is_empty() {
            return None;
        }

        {
            let cache = self.cache.read();
            if cache.missing_names.contains(&normalized) {
                return None;
            }
            if let Some(table) = cache.table_by_name(&normalized) {
                return Some(table);
            }
        }

        for id in self.list_ids().await {
            if self.cache.read().by_id.contains_key(&id) {
                continue;
            }
            let loaded = load_table(&self.dir, id).await;
            let mut cache = self.cache.write();
            cache.insert(loaded);
            if let Some(table) = cache.table_by_name(&normalized) {
                return Some(table);
            }
        }

        debug!("No exp table for monster '{}'", monster_name);
        self.cache.write().missing_names.insert(normalized);
        None
    }

    /// 파일 id 로 테이블을 찾는다.
    pub async fn table_by_id(&self, id: u64) -> Option<Arc<Vec<f64>>> {
        let id = id.to_string();
        let cached = self.cache.read().by_id.get(&id).cloned();
        if let Some(cached) = cached {
            return cached;
        }
        let loaded = load_table(&self.dir, id.clone()).await;
        let mut cache = self.cache.write();
        cache.insert(loaded);
        cache.by_id.get(&id).cloned().flatten()
    }

    pub async fn expected_exp(&self, monster_name: &str, player_level: u32) -> Option<f64> {
        let table = self.table_for(monster_name).await?;
        expected_from_table(&table, player_level)
    }

    /// 이미 캐시된 테이블만 본다. 틱 처리 경로에서 I/O 를 하지 않기 위한 조회.
    pub fn expected_exp_cached(
        &self,
        monster_id: Option<u64>,
        monster_name: &str,
        player_level: u32,
    ) -> Option<f64> {
        let cache = self.cache.read();
        let table = monster_id
            .and_then(|id| cache.by_id.get(&id.to_string()).cloned().flatten())
            .or_else(|| cache.table_by_name(&normalize_name(monster_name)))?;
        expected_from_table(&table, player_level)
    }

    /// 검증에 필요한 조회가 디스크 없이 끝나는지
    pub fn lookup_is_cached(&self, monster_id: Option<u64>, monster_name: &str) -> bool {
        let cache = self.cache.read();
        if let Some(id) = monster_id {
            match cache.by_id.get(&id.to_string()) {
                Some(Some(_)) => return true,
                Some(None) => {}
                None => return false,
            }
        }
        let normalized = normalize_name(monster_name);
        normalized.is_empty()
            || cache.missing_names.contains(&normalized)
            || cache.table_by_name(&normalized).is_some()
    }

    async fn list_ids(&self) -> Vec<String> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Exp table directory {} unavailable: {}",
                    self.dir.display(),
                    e
                );
                return Vec::new();
            }
        };

        let mut ids = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let is_json = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
            if !is_json {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        ids
    }
}

/// 레벨 인덱스는 `clamp(round(level) - 1, 0, len - 1)`. 0 이하 값은 없는 것으로 본다.
pub fn expected_from_table(table: &[f64], player_level: u32) -> Option<f64> {
    if table.is_empty() {
        return None;
    }
    let idx = (player_level as usize).saturating_sub(1).min(table.len() - 1);
    table.get(idx).copied().filter(|v| v.is_finite() && *v > 0.0)
}

async fn load_table(dir: &Path, id: String) -> LoadedTable {
    let path = dir.join(format!("{}.json", id));
    let parsed = match tokio::fs::read_to_string(&path).await {
        Ok(raw) => serde_json::from_str::<ExpTableFile>(&raw).map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match parsed {
        Ok(file) => {
            let table: Vec<f64> = file
                .experience_table
                .iter()
                .filter_map(numeric_value)
                .filter(|v| v.is_finite() && *v > 0.0)
                .collect();
            let names = file
                .name
                .values()
                .filter_map(Value::as_str)
                .map(normalize_name)
                .filter(|n| !n.is_empty())
                .collect();
            LoadedTable {
                id,
                names,
                table: (!table.is_empty()).then(|| Arc::new(table)),
            }
        }
        Err(e) => {
            debug!("Exp table {} unreadable: {}", path.display(), e);
            LoadedTable {
                id,
                names: Vec::new(),
                table: None,
            }
        }
    }
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
