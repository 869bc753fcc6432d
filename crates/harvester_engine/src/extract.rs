//! Adaptive review extraction: ordered container selectors locate review items,
//! ordered per-field strategies pull values out of each item.
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use harvester_core::{Field, RawRecord, TargetId};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

/// Confidence multiplier per fallback step: strategy `i` scores `0.75^i`.
const FALLBACK_DECAY: f32 = 0.75;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractError {
    #[error("invalid selector {selector:?}: {message}")]
    InvalidSelector { selector: String, message: String },
    #[error("no selectors configured for {0}")]
    Empty(&'static str),
}

pub(crate) fn parse_selector(css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|err| ExtractError::InvalidSelector {
        selector: css.to_string(),
        message: err.to_string(),
    })
}

pub(crate) fn parse_selectors(
    list: &[String],
    what: &'static str,
) -> Result<Vec<Selector>, ExtractError> {
    if list.is_empty() {
        return Err(ExtractError::Empty(what));
    }
    list.iter().map(|css| parse_selector(css)).collect()
}

/// One way of reading a field out of a review item.
pub trait Strategy: Send + Sync + fmt::Debug {
    fn try_extract(&self, scope: ElementRef<'_>) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueSource {
    Text,
    Attribute(String),
}

/// First element matching `selector` inside the item, read as text or as an attribute.
#[derive(Debug)]
pub struct SelectorStrategy {
    selector: Selector,
    source: ValueSource,
}

impl SelectorStrategy {
    pub fn text(css: &str) -> Result<Self, ExtractError> {
        Ok(Self {
            selector: parse_selector(css)?,
            source: ValueSource::Text,
        })
    }

    pub fn attribute(css: &str, name: &str) -> Result<Self, ExtractError> {
        Ok(Self {
            selector: parse_selector(css)?,
            source: ValueSource::Attribute(name.to_string()),
        })
    }
}

impl Strategy for SelectorStrategy {
    fn try_extract(&self, scope: ElementRef<'_>) -> Option<String> {
        scope.select(&self.selector).find_map(|element| {
            let value = match &self.source {
                ValueSource::Text => element.text().collect::<String>(),
                ValueSource::Attribute(name) => element.value().attr(name)?.to_string(),
            };
            let value = value.trim();
            (!value.is_empty()).then(|| value.to_string())
        })
    }
}

/// Serializable description of a `SelectorStrategy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategySpec {
    pub selector: String,
    #[serde(default)]
    pub attribute: Option<String>,
}

impl StrategySpec {
    fn text(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            attribute: None,
        }
    }

    fn attribute(selector: &str, attribute: &str) -> Self {
        Self {
            selector: selector.to_string(),
            attribute: Some(attribute.to_string()),
        }
    }

    pub fn build(&self) -> Result<Box<dyn Strategy>, ExtractError> {
        let strategy = match &self.attribute {
            Some(name) => SelectorStrategy::attribute(&self.selector, name)?,
            None => SelectorStrategy::text(&self.selector)?,
        };
        Ok(Box::new(strategy))
    }
}

/// Container selectors and per-field strategy lists, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionSelectors {
    pub containers: Vec<String>,
    pub reviewer: Vec<StrategySpec>,
    pub text: Vec<StrategySpec>,
    pub rating: Vec<StrategySpec>,
    pub date: Vec<StrategySpec>,
    pub helpful_votes: Vec<StrategySpec>,
}

impl Default for ExtractionSelectors {
    fn default() -> Self {
        let text = |list: &[&str]| list.iter().map(|s| StrategySpec::text(s)).collect::<Vec<_>>();
        let mut rating = text(&[".rating", ".star-rating", ".score", "[data-testid*=\"rating\"]"]);
        rating.push(StrategySpec::attribute("[data-rating]", "data-rating"));
        rating.push(StrategySpec::attribute("[aria-label*=\"star\"]", "aria-label"));
        let mut date = text(&[".review-date", ".timestamp", ".date", "[data-testid*=\"date\"]"]);
        date.push(StrategySpec::attribute("time[datetime]", "datetime"));

        Self {
            containers: [
                ".review-item",
                ".comment-item",
                ".feedback-item",
                "[data-testid*=\"review-item\"]",
                "[itemprop=\"review\"]",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            reviewer: text(&[
                ".reviewer-name",
                ".username",
                ".author",
                "[data-testid*=\"username\"]",
                "[itemprop=\"author\"]",
            ]),
            text: text(&[
                ".review-text",
                ".comment-text",
                ".content",
                "[data-testid*=\"content\"]",
                "[itemprop=\"reviewBody\"]",
            ]),
            rating,
            date,
            helpful_votes: text(&[".helpful-count", ".likes", ".thumbs-up"]),
        }
    }
}

/// Raw records from one page plus how the page was read.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionBatch {
    pub records: Vec<RawRecord>,
    /// Index of the container selector that matched, if any did.
    pub container: Option<usize>,
}

impl ExtractionBatch {
    /// Records carrying every mandatory field.
    pub fn complete_count(&self) -> usize {
        self.records
            .iter()
            .filter(|r| Field::ALL.iter().filter(|f| f.is_mandatory()).all(|f| r.field(*f).is_some()))
            .count()
    }
}

/// Where the records of a batch came from.
#[derive(Debug, Clone, Copy)]
pub struct Provenance<'a> {
    pub target_id: &'a TargetId,
    pub source_url: &'a str,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct AdaptiveExtractor {
    containers: Vec<Selector>,
    strategies: BTreeMap<Field, Vec<Box<dyn Strategy>>>,
}

impl AdaptiveExtractor {
    pub fn new(containers: Vec<Selector>) -> Self {
        Self {
            containers,
            strategies: BTreeMap::new(),
        }
    }

    pub fn from_selectors(selectors: &ExtractionSelectors) -> Result<Self, ExtractError> {
        let mut extractor = Self::new(parse_selectors(&selectors.containers, "containers")?);
        let fields = [
            (Field::Reviewer, &selectors.reviewer),
            (Field::Text, &selectors.text),
            (Field::Rating, &selectors.rating),
            (Field::Date, &selectors.date),
            (Field::HelpfulVotes, &selectors.helpful_votes),
        ];
        for (field, specs) in fields {
            for spec in specs {
                extractor = extractor.with_strategy(field, spec.build()?);
            }
        }
        Ok(extractor)
    }

    /// Appends a fallback strategy for `field`.
    pub fn with_strategy(mut self, field: Field, strategy: Box<dyn Strategy>) -> Self {
        self.strategies.entry(field).or_default().push(strategy);
        self
    }

    pub fn extract(&self, doc: &Html, provenance: Provenance<'_>) -> ExtractionBatch {
        let Some((container, items)) = self.items(doc) else {
            return ExtractionBatch {
                records: Vec::new(),
                container: None,
            };
        };

        let records = items
            .into_iter()
            .map(|item| self.read_item(item, provenance))
            .collect();
        ExtractionBatch {
            records,
            container: Some(container),
        }
    }

    /// Review items under the first container selector with at least one match.
    fn items<'a>(&self, doc: &'a Html) -> Option<(usize, Vec<ElementRef<'a>>)> {
        self.containers.iter().enumerate().find_map(|(i, selector)| {
            let items: Vec<_> = doc.select(selector).collect();
            (!items.is_empty()).then_some((i, items))
        })
    }

    fn read_item(&self, item: ElementRef<'_>, provenance: Provenance<'_>) -> RawRecord {
        let mut fields = BTreeMap::new();
        let mut strategies = BTreeMap::new();
        for (field, list) in &self.strategies {
            let hit = list
                .iter()
                .enumerate()
                .find_map(|(i, strategy)| strategy.try_extract(item).map(|value| (i, value)));
            if let Some((index, value)) = hit {
                fields.insert(*field, value);
                strategies.insert(*field, index);
            }
        }

        let confidence = SCORED_FIELDS
            .iter()
            .filter_map(|f| strategies.get(f))
            .map(|&index| field_confidence(index))
            .reduce(f32::min)
            .unwrap_or(0.0);

        RawRecord {
            source_target_id: provenance.target_id.clone(),
            source_url: provenance.source_url.to_string(),
            fields,
            strategies,
            confidence,
            fetched_at: provenance.fetched_at,
        }
    }
}

/// Fields whose strategy rank sets a record's confidence.
const SCORED_FIELDS: [Field; 2] = [Field::Reviewer, Field::Text];

fn field_confidence(strategy_index: usize) -> f32 {
    FALLBACK_DECAY.powi(strategy_index as i32)
}
