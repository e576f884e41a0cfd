use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    engine::KillEvent,
    monster::{exp_table::expected_from_table, MonsterExpTables},
};

/// 기대 경험치의 이 배수를 넘는 kill 은 이상치로 본다.
pub const OUTLIER_FACTOR: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Accepted { expected: f64 },
    Outlier { expected: f64 },
    /// 테이블이 없거나 기대값이 쓸모없음. kill 은 유지된다.
    Inconclusive,
}

impl Verdict {
    pub fn is_outlier(&self) -> bool {
        matches!(self, Verdict::Outlier { .. })
    }
}

/// 이미 적용된 kill 을 경험치 테이블과 대조한다.
#[derive(Clone)]
pub struct OutlierValidator {
    tables: Arc<MonsterExpTables>,
}

impl OutlierValidator {
    pub fn new(tables: Arc<MonsterExpTables>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &Arc<MonsterExpTables> {
        &self.tables
    }

    pub async fn validate(&self, kill: &KillEvent, player_level: u32) -> Verdict {
        if !kill.delta_exp.is_finite() {
            return Verdict::Inconclusive;
        }

        let table = match kill.monster_id {
            Some(id) => match self.tables.table_by_id(id).await {
                Some(table) => Some(table),
                None => self.tables.table_for(&kill.monster_name).await,
            },
            None => self.tables.table_for(&kill.monster_name).await,
        };
        let Some(table) = table else {
            debug!(
                "kill #{} ({}) has no exp table, keeping it",
                kill.seq, kill.monster_name
            );
            return Verdict::Inconclusive;
        };
        let Some(expected) = expected_from_table(&table, player_level) else {
            return Verdict::Inconclusive;
        };

        if kill.delta_exp > expected * OUTLIER_FACTOR {
            warn!(
                "kill #{} ({}) is an outlier: delta {:.4} vs expected {:.4} at level {}",
                kill.seq, kill.monster_name, kill.delta_exp, expected, player_level
            );
            Verdict::Outlier { expected }
        } else {
            Verdict::Accepted { expected }
        }
    }
}
