use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::{CanonicalRecord, Field, RawRecord, Rejection};

pub const MIN_TEXT_CHARS: usize = 10;
pub const MAX_TEXT_CHARS: usize = 5_000;
pub const ANONYMOUS_REVIEWER: &str = "Anonymous";

const HASH_SEPARATOR: char = '\u{1f}';

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:[.,]\d+)?").unwrap());
static COUNT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d[\d,]*").unwrap());
static YMD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})[-/](\d{1,2})[-/](\d{1,2})(?:\b|T)").unwrap());
static MDY_SLASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());
static DMY_DOT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})\.(\d{1,2})\.(\d{4})\b").unwrap());
static MONTH_FIRST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z]{3,9})\.? (\d{1,2}),? (\d{4})\b").unwrap());
static DAY_FIRST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2}) ([A-Za-z]{3,9})\.?,? (\d{4})\b").unwrap());

/// Checks performed on extraction output before normalization: mandatory
/// fields present and review text within length bounds.
pub fn validate_raw(raw: &RawRecord) -> Result<(), Rejection> {
    for field in Field::ALL.into_iter().filter(|f| f.is_mandatory()) {
        let present = raw.field(field).is_some_and(|v| !v.trim().is_empty());
        if !present {
            return Err(Rejection::ExtractionIncomplete);
        }
    }
    let text_len = collapse_whitespace(raw.field(Field::Text).unwrap_or_default())
        .chars()
        .count();
    if text_len < MIN_TEXT_CHARS {
        return Err(Rejection::TextTooShort);
    }
    if text_len > MAX_TEXT_CHARS {
        return Err(Rejection::TextTooLong);
    }
    Ok(())
}

/// Normalizes a raw record into canonical form. Does not consult any seen-set.
pub fn normalize(raw: &RawRecord) -> Result<CanonicalRecord, Rejection> {
    validate_raw(raw)?;

    let reviewer = raw
        .field(Field::Reviewer)
        .map(clean_text)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| ANONYMOUS_REVIEWER.to_string());
    let text = clean_text(raw.field(Field::Text).unwrap_or_default());
    let date = raw
        .field(Field::Date)
        .and_then(normalize_date)
        .ok_or(Rejection::DateUnparseable)?;
    let rating = raw
        .field(Field::Rating)
        .and_then(normalize_rating)
        .ok_or(Rejection::RatingOutOfRange)?;
    let helpful_votes = raw
        .field(Field::HelpfulVotes)
        .and_then(parse_count)
        .unwrap_or(0);

    Ok(CanonicalRecord {
        content_hash: content_hash(&reviewer, &text, &date),
        target_id: raw.source_target_id.clone(),
        reviewer,
        text,
        rating,
        date,
        source_url: raw.source_url.clone(),
        helpful_votes,
    })
}

pub fn collapse_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Collapsed whitespace, control characters removed, double quotes doubled so the
/// value can be embedded in a quoted flat-file field.
pub fn clean_text(input: &str) -> String {
    collapse_whitespace(input)
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .replace('"', "\"\"")
}

/// ISO-8601 calendar date (`YYYY-MM-DD`) from the first supported date found in `input`.
pub fn normalize_date(input: &str) -> Option<String> {
    let input = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Some(ts.date_naive().format("%Y-%m-%d").to_string());
    }
    let date = captures_ymd(&YMD, input, [1, 2, 3])
        .or_else(|| captures_ymd(&MDY_SLASH, input, [3, 1, 2]))
        .or_else(|| captures_ymd(&DMY_DOT, input, [3, 2, 1]))
        .or_else(|| month_name_date(&MONTH_FIRST, input, [3, 1, 2]))
        .or_else(|| month_name_date(&DAY_FIRST, input, [3, 2, 1]))?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// `order` gives the capture group index of year, month and day.
fn captures_ymd(re: &Regex, input: &str, order: [usize; 3]) -> Option<NaiveDate> {
    re.captures_iter(input).find_map(|caps| {
        let part = |i: usize| caps.get(order[i]).and_then(|m| m.as_str().parse::<u32>().ok());
        let year = i32::try_from(part(0)?).ok()?;
        NaiveDate::from_ymd_opt(year, part(1)?, part(2)?)
    })
}

/// Like `captures_ymd` but the month group is a month name.
fn month_name_date(re: &Regex, input: &str, order: [usize; 3]) -> Option<NaiveDate> {
    re.captures_iter(input).find_map(|caps| {
        let year = caps.get(order[0])?.as_str();
        let month = caps.get(order[1])?.as_str();
        let day = caps.get(order[2])?.as_str();
        NaiveDate::parse_from_str(&format!("{day} {month} {year}"), "%d %B %Y")
            .or_else(|_| NaiveDate::parse_from_str(&format!("{day} {month} {year}"), "%d %b %Y"))
            .ok()
    })
}

/// Integer rating in 1..=5 from numeric text ("4.5 out of 5") or star glyphs.
pub fn normalize_rating(input: &str) -> Option<u8> {
    let value = match NUMBER.find(input) {
        Some(m) => m.as_str().replace(',', ".").parse::<f32>().ok()?.round(),
        None => input.chars().filter(|c| matches!(*c, '★' | '⭐')).count() as f32,
    };
    (1.0..=5.0).contains(&value).then_some(value as u8)
}

fn parse_count(input: &str) -> Option<u32> {
    COUNT
        .find(input)
        .and_then(|m| m.as_str().replace(',', "").parse().ok())
}

/// Hex SHA-256 over normalized reviewer, text and date.
pub fn content_hash(reviewer: &str, text: &str, date: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(reviewer.as_bytes());
    hasher.update(HASH_SEPARATOR.to_string().as_bytes());
    hasher.update(text.as_bytes());
    hasher.update(HASH_SEPARATOR.to_string().as_bytes());
    hasher.update(date.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest.iter() {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}
