use serde::{Deserialize, Serialize};

// 레퍼런스 데이터 인덱스 (HP / level+element / name)
pub mod index;

// 레벨별 기대 경험치 테이블 (lazy 로딩)
pub mod exp_table;

// OCR 신호 → 몬스터 식별
pub mod resolver;

pub use index::MonsterIndex;
pub use exp_table::MonsterExpTables;
pub use resolver::{HpReading, HpSignal, MonsterResolver, NameSignal, ResolutionSignal, TokenHint};

/// 몬스터 등급. 선언 순서가 곧 식별 우선순위다.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MonsterRank {
    Normal,
    Captain,
    Boss,
    Giant,
    Super,
    Violet,
    Small,
    Material,
    Worldboss,
    #[default]
    #[serde(other)]
    Unknown,
}

impl MonsterRank {
    /// 낮을수록 우선. Unknown 은 항상 마지막.
    pub fn priority(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MonsterRank::Normal => "normal",
            MonsterRank::Captain => "captain",
            MonsterRank::Boss => "boss",
            MonsterRank::Giant => "giant",
            MonsterRank::Super => "super",
            MonsterRank::Violet => "violet",
            MonsterRank::Small => "small",
            MonsterRank::Material => "material",
            MonsterRank::Worldboss => "worldboss",
            MonsterRank::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Element {
    Fire,
    Water,
    Wind,
    Earth,
    Electricity,
    #[serde(other)]
    None,
}

impl Element {
    pub const ALL: [Element; 6] = [
        Element::Fire,
        Element::Water,
        Element::Wind,
        Element::Earth,
        Element::Electricity,
        Element::None,
    ];

    /// OCR 토큰 조각에서 속성을 읽는다. `electric` 은 `electricity` 로 정규화.
    pub fn from_word(word: &str) -> Option<Element> {
        match word {
            "fire" => Some(Element::Fire),
            "water" => Some(Element::Water),
            "wind" => Some(Element::Wind),
            "earth" => Some(Element::Earth),
            "electricity" | "electric" => Some(Element::Electricity),
            _ => None,
        }
    }
}

/// 레퍼런스 파일의 한 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonsterRecord {
    pub id: u64,
    pub name: String,
    pub level: u32,
    pub element: Element,
    #[serde(default)]
    pub rank: MonsterRank,
    #[serde(default)]
    pub hp: Option<u64>,
}

impl MonsterRecord {
    /// 이벤트/골드/실버 변형은 원본 몬스터와 HP 가 같아 식별을 흐린다.
    pub fn is_event_variant(&self) -> bool {
        self.name.starts_with("[Event]")
            || self.name.starts_with("Goldenes ")
            || self.name.starts_with("Silber ")
    }
}

/// 틱 단위로 만들어지는 몬스터 식별 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedIdentity {
    pub id: Option<u64>,
    pub name: String,
    pub level: Option<u32>,
    pub element: Element,
    pub rank: MonsterRank,
    pub expected_exp: Option<f64>,
}

impl ResolvedIdentity {
    pub fn with_expected_exp(mut self, expected_exp: Option<f64>) -> Self {
        self.expected_exp = expected_exp;
        self
    }
}

impl From<&MonsterRecord> for ResolvedIdentity {
    fn from(record: &MonsterRecord) -> Self {
        Self {
            id: Some(record.id),
            name: record.name.clone(),
            level: Some(record.level),
            element: record.element,
            rank: record.rank,
            expected_exp: None,
        }
    }
}

/// 측정값과 레퍼런스 중 큰 쪽의 `max(1, round(hp * 0.03))` 밴드 안에 있는지.
/// 대칭이어야 레퍼런스 1000 에 대해 970..=1030 이 모두 매칭된다.
pub fn within_hp_tolerance(reference: u64, measured: u64) -> bool {
    let tolerance = hp_tolerance(measured).max(hp_tolerance(reference));
    reference.abs_diff(measured) <= tolerance
}

pub fn hp_tolerance(max_hp: u64) -> u64 {
    ((max_hp as f64 * 0.03).round() as u64).max(1)
}
