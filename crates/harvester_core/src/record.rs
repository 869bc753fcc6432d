use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TargetId;

/// Logical review fields the extractor looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Field {
    Reviewer,
    Text,
    Rating,
    Date,
    HelpfulVotes,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Reviewer,
        Field::Text,
        Field::Rating,
        Field::Date,
        Field::HelpfulVotes,
    ];

    /// Fields a record cannot be kept without. A missing reviewer is filled in
    /// with [`ANONYMOUS_REVIEWER`](crate::normalize::ANONYMOUS_REVIEWER).
    pub fn is_mandatory(self) -> bool {
        matches!(self, Field::Text)
    }
}

/// One harvested item before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRecord {
    pub source_target_id: TargetId,
    pub source_url: String,
    pub fields: BTreeMap<Field, String>,
    /// Index of the strategy that produced each field (0 is first choice).
    pub strategies: BTreeMap<Field, usize>,
    pub confidence: f32,
    pub fetched_at: DateTime<Utc>,
}

impl RawRecord {
    pub fn field(&self, field: Field) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub content_hash: String,
    pub target_id: TargetId,
    pub reviewer: String,
    pub text: String,
    pub rating: u8,
    pub date: String,
    pub source_url: String,
    #[serde(default)]
    pub helpful_votes: u32,
}

/// Why a raw record did not become a canonical record. None of these abort a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rejection {
    ExtractionIncomplete,
    TextTooShort,
    TextTooLong,
    DateUnparseable,
    RatingOutOfRange,
    DuplicateRecord,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::ExtractionIncomplete => write!(f, "extraction incomplete"),
            Rejection::TextTooShort => write!(f, "text too short"),
            Rejection::TextTooLong => write!(f, "text too long"),
            Rejection::DateUnparseable => write!(f, "date unparseable"),
            Rejection::RatingOutOfRange => write!(f, "rating out of range"),
            Rejection::DuplicateRecord => write!(f, "duplicate record"),
        }
    }
}
