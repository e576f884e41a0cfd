use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::Arc,
};

use tracing::{info, warn};

use crate::errors::{KillfeedError, KillfeedResult};

use super::{hp_tolerance, within_hp_tolerance, Element, MonsterRecord};

/// 레퍼런스 데이터셋으로 한 번 만들어지는 읽기 전용 조회 테이블.
/// 모든 버킷은 rank 우선순위 순으로 정렬되어 있다.
#[derive(Debug, Default)]
pub struct MonsterIndex {
    by_hp: BTreeMap<u64, Vec<Arc<MonsterRecord>>>,
    by_level_element: HashMap<(u32, Element), Vec<Arc<MonsterRecord>>>,
    by_name: HashMap<String, Arc<MonsterRecord>>,
    len: usize,
}

/// HP 조회 결과. exact 여부는 모호할 때 tie-break 에 쓰인다.
#[derive(Debug, Clone)]
pub struct HpCandidate {
    pub record: Arc<MonsterRecord>,
    pub exact: bool,
}

impl MonsterIndex {
    pub fn new(records: Vec<MonsterRecord>) -> Self {
        let mut index = MonsterIndex {
            len: records.len(),
            ..Default::default()
        };

        for record in records.into_iter().map(Arc::new) {
            index
                .by_level_element
                .entry((record.level, record.element))
                .or_default()
                .push(record.clone());

            if let Some(hp) = record.hp.filter(|hp| *hp > 0) {
                index.by_hp.entry(hp).or_default().push(record.clone());
            }

            index
                .by_name
                .entry(normalize_name(&record.name))
                .or_insert(record);
        }

        for bucket in index.by_hp.values_mut() {
            bucket.sort_by_key(|m| m.rank.priority());
        }
        for bucket in index.by_level_element.values_mut() {
            bucket.sort_by_key(|m| m.rank.priority());
        }

        index
    }

    /// JSON 배열 파일에서 인덱스를 만든다.
    pub fn load(path: impl AsRef<Path>) -> KillfeedResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| KillfeedError::io(path.display().to_string(), e))?;
        let records: Vec<MonsterRecord> = serde_json::from_str(&raw)?;
        let index = Self::new(records);
        info!(
            "MonsterIndex loaded from {}: {} monsters, {} level-element buckets, {} hp buckets",
            path.display(),
            index.len,
            index.by_level_element.len(),
            index.by_hp.len()
        );
        Ok(index)
    }

    /// 파일이 없거나 깨져 있어도 빈 인덱스로 계속 진행한다.
    pub fn load_or_empty(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(index) => index,
            Err(e) => {
                warn!(
                    "Monster reference unavailable ({}), identities will resolve to unknown",
                    e
                );
                Self::default()
            }
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 측정된 max HP 의 허용 오차 안에 있는 모든 후보.
    pub fn candidates_by_hp(&self, max_hp: u64) -> Vec<HpCandidate> {
        if max_hp == 0 {
            return Vec::new();
        }
        // 레퍼런스 쪽 밴드가 더 넓을 수 있으므로 넉넉히 조회한 뒤 정확히 거른다.
        let reach = hp_tolerance(max_hp) * 2 + 1;
        let low = max_hp.saturating_sub(reach);
        let high = max_hp.saturating_add(reach);

        self.by_hp
            .range(low..=high)
            .filter(|(hp, _)| within_hp_tolerance(**hp, max_hp))
            .flat_map(|(hp, bucket)| {
                let exact = *hp == max_hp;
                bucket.iter().map(move |record| HpCandidate {
                    record: record.clone(),
                    exact,
                })
            })
            .collect()
    }

    pub fn by_level_element(&self, level: u32, element: Element) -> &[Arc<MonsterRecord>] {
        self.by_level_element
            .get(&(level, element))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// 속성과 무관하게 해당 레벨의 모든 몬스터
    pub fn by_level(&self, level: u32) -> Vec<Arc<MonsterRecord>> {
        Element::ALL
            .iter()
            .flat_map(|element| self.by_level_element(level, *element).iter().cloned())
            .collect()
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<MonsterRecord>> {
        self.by_name.get(&normalize_name(name))
    }
}

pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}
