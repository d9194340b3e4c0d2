//! Raw field normalization.
//!
//! Turns heterogeneous spreadsheet cell values into comparable canonical
//! forms. Every function here is pure: the same input always produces the
//! same output and nothing touches the store.

use std::sync::LazyLock;

use chrono::{Days, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::enums::{normalize_enum, EnumDomain};
use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Literal cell contents that mean "no value" in the source sheets.
pub const EMPTY_PLACEHOLDERS: &[&str] = &["-", "\u{2014}", "\u{2013}"];

/// Largest day serial the spreadsheet format can represent (9999-12-31).
pub const MAX_EPOCH_DAY: f64 = 2_958_465.0;

/// Day serial of the fictitious 1900-02-29 the 1900 date system counts.
const PHANTOM_LEAP_DAY: u64 = 60;

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A cell value as produced by the tabular reader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RawValue {
    Empty,
    Text(String),
    Number(f64),
    /// A date the reader already parsed.
    Date(NaiveDate),
}

impl From<serde_json::Value> for RawValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Empty,
            serde_json::Value::String(s) => Self::Text(s),
            serde_json::Value::Number(n) => n.as_f64().map(Self::Number).unwrap_or(Self::Empty),
            serde_json::Value::Bool(b) => Self::Text(b.to_string()),
            other => Self::Text(other.to_string()),
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// How a field should be normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Serial numbers, call-log/RMA numbers, model and audi numbers.
    Identifier,
    /// User-facing names: trimmed, whitespace collapsed, case preserved.
    Name,
    /// Enum-like values mapped through a synonym table.
    Enum(EnumDomain),
    Date,
    /// Opaque free text, only trimmed.
    Text,
}

/// A successfully normalized, non-empty value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalizedValue {
    Text(String),
    Date(NaiveDate),
}

impl NormalizedValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Date(_) => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            Self::Text(_) => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s),
            Self::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Normalize a raw value according to its field kind.
///
/// Returns `Ok(None)` for values that are empty (null, blank, or one of the
/// [`EMPTY_PLACEHOLDERS`]). Enum values without a synonym or exact match and
/// dates that do not resolve to a real calendar day are errors.
pub fn normalize(kind: FieldKind, raw: &RawValue) -> Result<Option<NormalizedValue>, CoreError> {
    match kind {
        FieldKind::Identifier => Ok(raw_text(raw)
            .and_then(|t| non_placeholder(&t).map(str::to_uppercase))
            .map(NormalizedValue::Text)),
        FieldKind::Name => Ok(raw_text(raw)
            .and_then(|t| non_placeholder(&t).map(collapse_whitespace))
            .map(NormalizedValue::Text)),
        FieldKind::Text => Ok(raw_text(raw)
            .and_then(|t| non_placeholder(&t).map(str::to_string))
            .map(NormalizedValue::Text)),
        FieldKind::Enum(domain) => {
            let Some(text) = raw_text(raw) else {
                return Ok(None);
            };
            Ok(normalize_enum(domain, &text)?
                .map(|canonical| NormalizedValue::Text(canonical.to_string())))
        }
        FieldKind::Date => normalize_date(raw).map(|d| d.map(NormalizedValue::Date)),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Lowercase and join whitespace runs with underscores (`"RMA CI"` → `"rma_ci"`).
pub fn enum_key(value: &str) -> String {
    WHITESPACE_RE
        .replace_all(value.trim(), "_")
        .to_lowercase()
}

/// Trim and collapse internal whitespace runs to a single space.
pub fn collapse_whitespace(value: &str) -> String {
    WHITESPACE_RE.replace_all(value.trim(), " ").into_owned()
}

/// Returns `true` if the trimmed value carries no information.
pub fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || EMPTY_PLACEHOLDERS.contains(&trimmed)
}

fn non_placeholder(value: &str) -> Option<&str> {
    if is_placeholder(value) {
        None
    } else {
        Some(value.trim())
    }
}

/// Render a raw value as text. Whole numbers lose their fractional part so
/// that a numeric serial `411034563.0` reads as `"411034563"`.
fn raw_text(raw: &RawValue) -> Option<String> {
    match raw {
        RawValue::Empty => None,
        RawValue::Text(s) => Some(s.clone()),
        RawValue::Number(n) if !n.is_finite() => None,
        RawValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
        RawValue::Number(n) => Some(n.to_string()),
        RawValue::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
    }
}

fn normalize_date(raw: &RawValue) -> Result<Option<NaiveDate>, CoreError> {
    match raw {
        RawValue::Empty => Ok(None),
        RawValue::Date(d) => Ok(Some(*d)),
        RawValue::Number(n) => from_epoch_day(*n).map(Some),
        RawValue::Text(s) => {
            let Some(text) = non_placeholder(s) else {
                return Ok(None);
            };
            if let Ok(n) = text.parse::<f64>() {
                return from_epoch_day(n).map(Some);
            }
            parse_iso_date(text).map(Some)
        }
    }
}

/// Convert a spreadsheet day serial (1900 date system) to a calendar date.
///
/// Serial 1 is 1900-01-01. The format counts a non-existent 1900-02-29 as
/// serial 60, which is rejected; later serials are shifted back by one day.
/// A fractional part is a time of day and is dropped.
pub fn from_epoch_day(serial: f64) -> Result<NaiveDate, CoreError> {
    if !serial.is_finite() || serial < 1.0 || serial > MAX_EPOCH_DAY {
        return Err(CoreError::InvalidDate(format!(
            "day serial {serial} is outside 1..={MAX_EPOCH_DAY}"
        )));
    }
    let day = serial.floor() as u64;
    if day == PHANTOM_LEAP_DAY {
        return Err(CoreError::InvalidDate(
            "day serial 60 is the non-existent 1900-02-29".to_string(),
        ));
    }

    let (base, offset) = if day < PHANTOM_LEAP_DAY {
        (NaiveDate::from_ymd_opt(1899, 12, 31), day)
    } else {
        (NaiveDate::from_ymd_opt(1899, 12, 30), day)
    };
    base.and_then(|b| b.checked_add_days(Days::new(offset)))
        .ok_or_else(|| CoreError::InvalidDate(format!("day serial {serial} overflows")))
}

/// Parse an ISO-8601 calendar date, optionally followed by a time part.
fn parse_iso_date(text: &str) -> Result<NaiveDate, CoreError> {
    let date_part = text.split(['T', ' ']).next().unwrap_or(text);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
        .map_err(|e| CoreError::InvalidDate(format!("'{text}': {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
