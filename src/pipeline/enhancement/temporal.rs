use std::sync::LazyLock;

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use regex::Regex;
use uuid::Uuid;

use super::types::{TemporalData, TemporalPrecision};

const TEMPORAL_CONFIDENCE: f64 = 0.8;

static ABSOLUTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("valid regex"));
static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(\d+)\s+(day|week|month|year)s?\s+ago\b").expect("valid regex")
});
static CONTEXTUAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(today|yesterday|tomorrow)\b").expect("valid regex"));

/// Extract date expressions, resolving relative ones against the current time.
pub fn extract_temporal(text: &str) -> Vec<TemporalData> {
    extract_temporal_at(text, Utc::now())
}

/// Extract absolute (`YYYY-MM-DD`), relative (`N days ago`) and contextual
/// (`today`) expressions. Matches that resolve to an invalid date are skipped.
pub fn extract_temporal_at(text: &str, now: DateTime<Utc>) -> Vec<TemporalData> {
    let today = now.date_naive();
    let mut found = Vec::new();

    for caps in ABSOLUTE.captures_iter(text) {
        let date = match (caps[1].parse(), caps[2].parse(), caps[3].parse()) {
            (Ok(y), Ok(m), Ok(d)) => NaiveDate::from_ymd_opt(y, m, d),
            _ => None,
        };
        push(&mut found, date, &caps[0], false, None);
    }

    for caps in RELATIVE.captures_iter(text) {
        let date = caps[1]
            .parse::<u32>()
            .ok()
            .and_then(|n| shift_back(today, n, &caps[2].to_lowercase()));
        push(&mut found, date, &caps[0], true, Some(now));
    }

    for caps in CONTEXTUAL.captures_iter(text) {
        let date = match caps[1].to_lowercase().as_str() {
            "today" => Some(today),
            "yesterday" => today.checked_sub_days(Days::new(1)),
            "tomorrow" => today.checked_add_days(Days::new(1)),
            _ => None,
        };
        push(&mut found, date, &caps[0], true, Some(now));
    }

    found
}

fn shift_back(date: NaiveDate, amount: u32, unit: &str) -> Option<NaiveDate> {
    match unit {
        "day" => date.checked_sub_days(Days::new(u64::from(amount))),
        "week" => date.checked_sub_days(Days::new(u64::from(amount) * 7)),
        "month" => date.checked_sub_months(Months::new(amount)),
        "year" => date.checked_sub_months(Months::new(amount.checked_mul(12)?)),
        _ => None,
    }
}

fn push(
    found: &mut Vec<TemporalData>,
    date: Option<NaiveDate>,
    span: &str,
    is_relative: bool,
    reference_point: Option<DateTime<Utc>>,
) {
    let Some(timestamp) = date.and_then(|d| d.and_hms_opt(0, 0, 0)).map(|dt| dt.and_utc()) else {
        tracing::debug!(span, "Skipping unresolvable date expression");
        return;
    };
    found.push(TemporalData {
        id: Uuid::new_v4().to_string(),
        timestamp,
        original_text: span.to_string(),
        confidence: TEMPORAL_CONFIDENCE,
        precision: TemporalPrecision::Day,
        is_relative,
        reference_point,
    });
}
