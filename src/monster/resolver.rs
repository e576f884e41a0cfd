use std::{collections::HashSet, sync::Arc};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::{
    index::{normalize_name, HpCandidate},
    Element, MonsterIndex, MonsterRecord, ResolvedIdentity,
};

static HP_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d[\d.,]*)\s*[/|]\s*(\d[\d.,]*)").expect("valid hp regex"));
static LEVEL_PREFIXED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)lv?\.?\s*(\d{1,3})").expect("valid level regex"));
static LEVEL_BARE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,3})\b").expect("valid bare level regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HpReading {
    pub current: u64,
    pub max: u64,
}

/// 적 HP bar 텍스트에서 얻은 신호
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HpSignal {
    /// HP bar 가 보이지 않음
    Absent,
    /// 텍스트는 있었지만 `current/max` 로 읽을 수 없음
    Unparsed,
    Reading(HpReading),
}

impl HpSignal {
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return HpSignal::Absent;
        };

        let Some(caps) = HP_PATTERN.captures(raw) else {
            return HpSignal::Unparsed;
        };
        let current = parse_digit_group(&caps[1]);
        let max = parse_digit_group(&caps[2]);

        match (current, max) {
            (Some(current), Some(max)) if max > 0 => HpSignal::Reading(HpReading { current, max }),
            _ => HpSignal::Unparsed,
        }
    }

    /// 읽을 수 있든 없든 HP bar 텍스트가 화면에 있었는지
    pub fn is_present(&self) -> bool {
        !matches!(self, HpSignal::Absent)
    }

    pub fn reading(&self) -> Option<HpReading> {
        match self {
            HpSignal::Reading(reading) => Some(*reading),
            _ => None,
        }
    }
}

/// 천 단위 구분자(`.` `,`)를 제거한 뒤 정수로 읽는다.
fn parse_digit_group(raw: &str) -> Option<u64> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// 몬스터 이름 토큰에서 읽어낸 힌트
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenHint {
    pub raw: String,
    pub level: Option<u32>,
    pub element: Option<Element>,
}

impl TokenHint {
    pub fn parse(raw: &str) -> Self {
        let cleaned = raw.trim();

        let level = LEVEL_PREFIXED
            .captures(cleaned)
            .or_else(|| LEVEL_BARE.captures(cleaned))
            .and_then(|caps| caps[1].parse::<u32>().ok())
            .filter(|level| *level > 0);

        let lowered = cleaned.to_lowercase();
        let element = lowered
            .split(|c: char| c == '-' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .find_map(Element::from_word);

        Self {
            raw: cleaned.to_string(),
            level,
            element,
        }
    }

    /// level 도 element 도 없는 토큰은 그냥 이름으로 취급한다.
    pub fn is_plain_name(&self) -> bool {
        self.level.is_none() && self.element.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameSignal {
    Absent,
    Token(TokenHint),
}

impl NameSignal {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            Some(token) => NameSignal::Token(TokenHint::parse(token)),
            None => NameSignal::Absent,
        }
    }

    pub fn hint(&self) -> Option<&TokenHint> {
        match self {
            NameSignal::Token(hint) => Some(hint),
            NameSignal::Absent => None,
        }
    }
}

/// 어떤 신호로 식별이 결정되었는지
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSignal {
    Hp,
    LevelElement,
    Name,
    Carryover,
}

impl ResolutionSignal {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionSignal::Hp => "hp",
            ResolutionSignal::LevelElement => "level_element",
            ResolutionSignal::Name => "name",
            ResolutionSignal::Carryover => "carryover",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonsterResolver {
    index: Arc<MonsterIndex>,
}

impl MonsterResolver {
    pub fn new(index: Arc<MonsterIndex>) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &Arc<MonsterIndex> {
        &self.index
    }

    /// HP → level+element → 이름 순으로 시도한다. 아무것도 맞지 않으면 None (unknown).
    pub fn resolve(
        &self,
        hp: &HpSignal,
        name: &NameSignal,
    ) -> Option<(ResolvedIdentity, ResolutionSignal)> {
        let hint = name.hint();

        if let Some(reading) = hp.reading() {
            if let Some(record) = self.resolve_by_hp(reading.max, hint) {
                debug!("resolved {} by hp max={}", record.name, reading.max);
                return Some((ResolvedIdentity::from(&*record), ResolutionSignal::Hp));
            }
        }

        let hint = hint?;

        if let Some(record) = self.resolve_by_level_element(hint) {
            return Some((
                ResolvedIdentity::from(&*record),
                ResolutionSignal::LevelElement,
            ));
        }

        self.index
            .by_name(&hint.raw)
            .map(|record| (ResolvedIdentity::from(&**record), ResolutionSignal::Name))
    }

    fn resolve_by_hp(&self, max_hp: u64, hint: Option<&TokenHint>) -> Option<Arc<MonsterRecord>> {
        let mut candidates = self.index.candidates_by_hp(max_hp);
        if candidates.is_empty() {
            return None;
        }

        // 변형 몬스터만 남는 경우가 아니라면 제외
        if candidates.iter().any(|c| !c.record.is_event_variant()) {
            candidates.retain(|c| !c.record.is_event_variant());
        }
        if let Some(single) = single_distinct(&candidates) {
            return Some(single);
        }

        if let Some(element) = hint.and_then(|h| h.element) {
            narrow(&mut candidates, |c| c.record.element == element);
            if let Some(single) = single_distinct(&candidates) {
                return Some(single);
            }
        }

        if let Some(level) = hint.and_then(|h| h.level) {
            narrow(&mut candidates, |c| c.record.level == level);
            if let Some(single) = single_distinct(&candidates) {
                return Some(single);
            }
        }

        best_candidate(&candidates)
    }

    fn resolve_by_level_element(&self, hint: &TokenHint) -> Option<Arc<MonsterRecord>> {
        let level = hint.level?;
        match hint.element {
            Some(element) => self.index.by_level_element(level, element).first().cloned(),
            None => {
                let at_level = self.index.by_level(level);
                let names: HashSet<String> =
                    at_level.iter().map(|m| normalize_name(&m.name)).collect();
                if names.len() == 1 {
                    at_level.into_iter().min_by_key(|m| m.rank.priority())
                } else {
                    None
                }
            }
        }
    }
}

/// 결과가 비면 좁히기를 무시한다.
fn narrow(candidates: &mut Vec<HpCandidate>, keep: impl Fn(&HpCandidate) -> bool) {
    let narrowed: Vec<HpCandidate> = candidates.iter().filter(|c| keep(c)).cloned().collect();
    if !narrowed.is_empty() {
        *candidates = narrowed;
    }
}

fn single_distinct(candidates: &[HpCandidate]) -> Option<Arc<MonsterRecord>> {
    let first = candidates.first()?;
    let first_name = normalize_name(&first.record.name);
    if candidates
        .iter()
        .all(|c| normalize_name(&c.record.name) == first_name)
    {
        best_candidate(candidates)
    } else {
        None
    }
}

/// exact HP 우선, 그다음 rank 우선순위
fn best_candidate(candidates: &[HpCandidate]) -> Option<Arc<MonsterRecord>> {
    candidates
        .iter()
        .min_by_key(|c| (!c.exact, c.record.rank.priority()))
        .map(|c| c.record.clone())
}
