use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{
    engine::DerivedStats,
    errors::{KillfeedError, KillfeedResult},
    monster::{HpSignal, NameSignal},
    profile::messages::ResetScope,
    ttk::TtkSummary,
};

/// 9999-12-31T23:59:59.999Z
pub const MAX_TIMESTAMP_MS: i64 = 253_402_300_799_999;

static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?(?:\d+(?:\.\d*)?|\.\d+)").expect("valid number regex")
});

/// 인식 파이프라인이 보내는 한 틱
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub profile_id: String,
    #[serde(default, deserialize_with = "ocr_number")]
    pub level: Option<f64>,
    #[serde(default, deserialize_with = "ocr_number")]
    pub exp: Option<f64>,
    #[serde(default)]
    pub enemy_hp: Option<String>,
    #[serde(default, alias = "enemyName")]
    pub monster_name: Option<String>,
    /// epoch ms. 없으면 수신 시각
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// exp 기준값 수동 지정. kill 로 평가하지 않는다.
    #[serde(default)]
    pub manual_exp: bool,
}

/// 입력 스트림의 한 줄. reset 명령이 아니면 sample 이다.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Inbound {
    Reset {
        #[serde(rename = "reset")]
        profile_id: String,
        #[serde(default = "default_reset_scope")]
        scope: ResetScope,
    },
    Sample(Sample),
}

fn default_reset_scope() -> ResetScope {
    ResetScope::Session
}

/// 정규화된 틱 신호. "신호 없음" 이 타입으로 드러난다.
#[derive(Debug, Clone, PartialEq)]
pub struct TickSignals {
    pub level: Option<u32>,
    pub exp: Option<f64>,
    pub hp: HpSignal,
    pub name: NameSignal,
    pub timestamp: i64,
    pub manual_exp: bool,
}

impl Sample {
    /// 범위를 벗어난 timestamp 는 거부한다.
    pub fn signals(&self, received_at: i64) -> KillfeedResult<TickSignals> {
        let timestamp = self.timestamp.unwrap_or(received_at);
        if !(0..=MAX_TIMESTAMP_MS).contains(&timestamp) {
            return Err(KillfeedError::invalid_sample(format!(
                "timestamp {} out of range",
                timestamp
            )));
        }

        Ok(TickSignals {
            level: self
                .level
                .filter(|l| l.is_finite() && *l >= 1.0 && *l <= u32::MAX as f64)
                .map(|l| l.round() as u32),
            exp: self.exp.filter(|e| e.is_finite()),
            hp: HpSignal::parse(self.enemy_hp.as_deref()),
            name: NameSignal::parse(self.monster_name.as_deref()),
            timestamp,
            manual_exp: self.manual_exp,
        })
    }
}

/// OCR 숫자 정규화. `"12,34%"` → 12.34
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => {
            let kept: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || matches!(*c, '.' | ',' | '-'))
                .collect();
            let normalized = kept.replacen(',', ".", 1);
            LEADING_NUMBER
                .find(&normalized)
                .and_then(|m| m.as_str().parse::<f64>().ok())
                .filter(|v| v.is_finite())
        }
        _ => None,
    }
}

fn ocr_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_number))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TtkPayload {
    pub last_ms: u64,
    pub avg_ms: f64,
    pub min_ms: u64,
    pub count: u64,
}

impl TtkPayload {
    pub fn from_summary(summary: &TtkSummary) -> Option<Self> {
        let avg_ms = summary.avg_ms()?;
        Some(Self {
            last_ms: summary.last_ms,
            avg_ms: avg_ms.round(),
            min_ms: summary.min_ms,
            count: summary.count,
        })
    }
}

/// 바깥으로 나가는 프로필 상태
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateBroadcast {
    pub profile_id: String,
    pub stats: DerivedStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttk: Option<TtkPayload>,
    /// 롤백 직후의 즉시 보정 전송
    #[serde(default)]
    pub corrective: bool,
}
