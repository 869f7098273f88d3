//! Regex-based normalization of text into typed values.
//!
//! Each kind has its own parser. A parser that cannot find its pattern
//! returns `NormalizationError`; the pipeline drops that attempt.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::{Captures, Regex};
use uuid::Uuid;

use super::types::{NormalizationKind, NormalizationMetadata, NormalizedData, NormalizedValue};
use super::NormalizationError;

const CURRENCY_CONFIDENCE: f64 = 0.9;
const PERCENTAGE_CONFIDENCE: f64 = 0.95;
const DATE_STRUCTURED_CONFIDENCE: f64 = 0.9;
const DATE_RAW_CONFIDENCE: f64 = 0.7;
const MEASUREMENT_CONFIDENCE: f64 = 0.85;
const NUMBER_CONFIDENCE: f64 = 0.8;

/// Optional symbol, amount, optional 3-letter code.
static CURRENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?P<symbol>[$€£¥])?\s?(?P<amount>\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:[.,]\d+)?)(?:\s?(?P<code>USD|EUR|GBP|JPY|CAD|AUD|CHF|CNY|INR)\b)?",
    )
    .expect("valid regex")
});
static PERCENTAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<num>-?\d+(?:[.,]\d+)?)\s?%").expect("valid regex")
});
static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("valid regex"));
static US_SLASH_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("valid regex"));
static US_DASH_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})-(\d{1,2})-(\d{4})\b").expect("valid regex"));
static MONTH_NAME_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2},?\s+\d{4}\b")
        .expect("valid regex")
});
static MEASUREMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<num>-?\d{1,3}(?:,\d{3})+(?:\.\d+)?|-?\d+(?:\.\d+)?)\s?(?P<unit>°?[a-zA-Zµ]+(?:/[a-zA-Z]+)?)\b")
        .expect("valid regex")
});
static KNOWN_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d\s?(?:kg|g|mg|lbs?|oz|km|m|cm|mm|mi|miles|ft|in|l|ml|gal|kwh|kw|w|mph|km/h|°c|°f|gb|mb|tb|hz|ghz)\b")
        .expect("valid regex")
});
static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-?\d{1,3}(?:,\d{3})+(?:\.\d+)?|-?\d+(?:\.\d+)?").expect("valid regex")
});
static CURRENCY_SIGNAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[$€£¥]\s?\d|\d\s?(?:USD|EUR|GBP|JPY|CAD|AUD|CHF|CNY|INR)\b").expect("valid regex")
});
static THOUSANDS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d{1,3}(?:,\d{3})+$").expect("valid regex"));

/// Formats tried on the whole input when no structural date pattern applies.
const RAW_DATE_FORMATS: &[&str] = &["%B %d, %Y", "%b %d, %Y", "%b. %d, %Y", "%d %B %Y", "%d %b %Y", "%Y/%m/%d"];

/// Normalization kinds worth attempting on this text, most specific first.
/// Plain numbers are only attempted when nothing more specific applies.
pub fn detect_kinds(text: &str) -> Vec<NormalizationKind> {
    let mut kinds = Vec::new();
    if CURRENCY_SIGNAL.is_match(text) {
        kinds.push(NormalizationKind::Currency);
    }
    if PERCENTAGE.is_match(text) {
        kinds.push(NormalizationKind::Percentage);
    }
    if ISO_DATE.is_match(text)
        || US_SLASH_DATE.is_match(text)
        || US_DASH_DATE.is_match(text)
        || MONTH_NAME_DATE.is_match(text)
    {
        kinds.push(NormalizationKind::DateTime);
    }
    if KNOWN_UNIT.is_match(text) {
        kinds.push(NormalizationKind::Measurement);
    }
    if kinds.is_empty() && NUMBER.is_match(text) {
        kinds.push(NormalizationKind::Numbers);
    }
    kinds
}

/// Normalize `text` as `kind`.
pub fn normalize(text: &str, kind: NormalizationKind) -> Result<NormalizedData, NormalizationError> {
    match kind {
        NormalizationKind::Currency => normalize_currency(text),
        NormalizationKind::Percentage => normalize_percentage(text),
        NormalizationKind::DateTime => normalize_date_time(text),
        NormalizationKind::Measurement => normalize_measurement(text),
        NormalizationKind::Numbers => normalize_number(text),
        NormalizationKind::Text => Ok(normalize_text(text)),
    }
}

fn build(
    original: &str,
    value: NormalizedValue,
    kind: NormalizationKind,
    confidence: f64,
    unit: Option<String>,
    metadata: NormalizationMetadata,
) -> NormalizedData {
    NormalizedData {
        id: Uuid::new_v4().to_string(),
        original_text: original.to_string(),
        value,
        kind,
        confidence,
        unit,
        metadata,
    }
}

/// Parse an amount that may use `,` as thousands separator or as decimal mark.
/// Returns the value and the number of fractional digits.
pub fn parse_amount(raw: &str) -> Result<(f64, Option<u32>), NormalizationError> {
    let cleaned = if THOUSANDS.is_match(raw) || (raw.contains(',') && raw.contains('.')) {
        raw.replace(',', "")
    } else {
        raw.replace(',', ".")
    };
    let value: f64 = cleaned
        .parse()
        .map_err(|_| NormalizationError::InvalidNumber(raw.to_string()))?;
    let precision = cleaned.split_once('.').map(|(_, frac)| frac.len() as u32);
    Ok((value, precision))
}

fn currency_code_for(symbol: Option<&str>) -> &'static str {
    match symbol {
        Some("£") => "GBP",
        Some("€") => "EUR",
        Some("¥") => "JPY",
        _ => "USD",
    }
}

fn normalize_currency(text: &str) -> Result<NormalizedData, NormalizationError> {
    let no_match = || NormalizationError::NoMatch { kind: NormalizationKind::Currency };
    // Prefer an amount carrying a symbol or code over a bare number.
    let caps: Captures = CURRENCY
        .captures_iter(text)
        .find(|c| c.name("symbol").is_some() || c.name("code").is_some())
        .or_else(|| CURRENCY.captures(text))
        .ok_or_else(no_match)?;

    let amount = caps.name("amount").ok_or_else(no_match)?.as_str();
    let (value, precision) = parse_amount(amount)?;
    let code = match caps.name("code") {
        Some(code) => code.as_str().to_string(),
        None => currency_code_for(caps.name("symbol").map(|m| m.as_str())).to_string(),
    };

    Ok(build(
        text,
        NormalizedValue::Number(value),
        NormalizationKind::Currency,
        CURRENCY_CONFIDENCE,
        Some(code.clone()),
        NormalizationMetadata {
            precision,
            currency_code: Some(code),
            timezone: None,
        },
    ))
}

fn normalize_percentage(text: &str) -> Result<NormalizedData, NormalizationError> {
    let caps = PERCENTAGE
        .captures(text)
        .ok_or(NormalizationError::NoMatch { kind: NormalizationKind::Percentage })?;
    let (percent, precision) = parse_amount(&caps["num"])?;

    Ok(build(
        text,
        NormalizedValue::Number(percent / 100.0),
        NormalizationKind::Percentage,
        PERCENTAGE_CONFIDENCE,
        Some("%".to_string()),
        NormalizationMetadata {
            precision,
            ..Default::default()
        },
    ))
}

/// Render a normalized percentage back to `N%` text, so re-normalizing the
/// output yields the same value.
pub fn format_percentage(value: f64) -> String {
    let percent = (value * 100.0 * 1e6).round() / 1e6;
    format!("{percent}%")
}

fn midnight_utc(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc())
}

/// First structural date match, as (year, month, day). `None` when no pattern matches.
fn structural_date(text: &str) -> Option<(i32, u32, u32)> {
    if let Some(c) = ISO_DATE.captures(text) {
        return Some((c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?));
    }
    for pattern in [&*US_SLASH_DATE, &*US_DASH_DATE] {
        if let Some(c) = pattern.captures(text) {
            return Some((c[3].parse().ok()?, c[1].parse().ok()?, c[2].parse().ok()?));
        }
    }
    None
}

/// Whole-input parse with a handful of common layouts.
pub fn parse_raw_date(text: &str) -> Option<DateTime<Utc>> {
    let trimmed = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    let candidate = MONTH_NAME_DATE
        .find(trimmed)
        .map(|m| m.as_str())
        .unwrap_or(trimmed);
    RAW_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(candidate, fmt).ok())
        .and_then(midnight_utc)
}

fn normalize_date_time(text: &str) -> Result<NormalizedData, NormalizationError> {
    let metadata = NormalizationMetadata {
        timezone: Some("UTC".to_string()),
        ..Default::default()
    };

    let structural = structural_date(text);
    if let Some((year, month, day)) = structural {
        if let Some(ts) = NaiveDate::from_ymd_opt(year, month, day).and_then(midnight_utc) {
            return Ok(build(
                text,
                NormalizedValue::Timestamp(ts),
                NormalizationKind::DateTime,
                DATE_STRUCTURED_CONFIDENCE,
                None,
                metadata,
            ));
        }
    }

    if let Some(ts) = parse_raw_date(text) {
        return Ok(build(
            text,
            NormalizedValue::Timestamp(ts),
            NormalizationKind::DateTime,
            DATE_RAW_CONFIDENCE,
            None,
            metadata,
        ));
    }

    if structural.is_some() {
        // Looked like a date but is not one (e.g. 2024-02-30): keep the text, zero confidence.
        return Ok(build(
            text,
            NormalizedValue::Text(text.trim().to_string()),
            NormalizationKind::DateTime,
            0.0,
            None,
            metadata,
        ));
    }

    Err(NormalizationError::NoMatch { kind: NormalizationKind::DateTime })
}

fn normalize_measurement(text: &str) -> Result<NormalizedData, NormalizationError> {
    let caps = MEASUREMENT
        .captures(text)
        .ok_or(NormalizationError::NoMatch { kind: NormalizationKind::Measurement })?;
    let (value, precision) = parse_amount(&caps["num"])?;

    Ok(build(
        text,
        NormalizedValue::Number(value),
        NormalizationKind::Measurement,
        MEASUREMENT_CONFIDENCE,
        Some(caps["unit"].to_string()),
        NormalizationMetadata {
            precision,
            ..Default::default()
        },
    ))
}

fn normalize_number(text: &str) -> Result<NormalizedData, NormalizationError> {
    let m = NUMBER
        .find(text)
        .ok_or(NormalizationError::NoMatch { kind: NormalizationKind::Numbers })?;
    let (value, precision) = parse_amount(m.as_str())?;

    Ok(build(
        text,
        NormalizedValue::Number(value),
        NormalizationKind::Numbers,
        NUMBER_CONFIDENCE,
        None,
        NormalizationMetadata {
            precision,
            ..Default::default()
        },
    ))
}

fn normalize_text(text: &str) -> NormalizedData {
    build(
        text,
        NormalizedValue::Text(text.trim().to_string()),
        NormalizationKind::Text,
        1.0,
        None,
        NormalizationMetadata::default(),
    )
}
