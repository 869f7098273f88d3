//! Turning fetched content and extracted facts into the single value a
//! monitor stores.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::models::FactType;
use crate::pipeline::enhancement::{detect_kinds, normalize, strip_markup, NormalizationKind, NormalizedValue};
use crate::pipeline::facts::{numeric_value_of, ExtractedFact};
use crate::pipeline::lenient::parse_json_object;

/// Facts above this confidence with a matching kind win selection.
pub const PREFERRED_FACT_CONFIDENCE: f64 = 0.7;

/// Raw text stored as a fallback value is cut to this many characters.
const MAX_RAW_VALUE_CHARS: usize = 500;

pub const SYNTHETIC_CONTENT_PREFIX: &str = "[synthetic]";

static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"')\]]+"#).expect("valid regex"));

/// First http(s) URL in a monitor prompt, without trailing punctuation.
pub fn extract_url(prompt: &str) -> Option<String> {
    let found = URL.find(prompt)?;
    let url = found.as_str().trim_end_matches(['.', ',', ';', ':', '!', '?']);
    (url.len() > "https://".len()).then(|| url.to_string())
}

/// Typed stand-in used when a monitor names no URL.
pub fn synthetic_value(fact_type: FactType) -> Value {
    match fact_type {
        FactType::Number => json!(100),
        FactType::String => json!("synthetic-test-value"),
        FactType::Boolean => json!(false),
        FactType::Object => json!({ "synthetic": true }),
    }
}

pub fn synthetic_content(target_fact: &str, fact_type: FactType) -> String {
    format!("{SYNTHETIC_CONTENT_PREFIX} {target_fact}: {}", synthetic_value(fact_type))
}

/// JSON number, integral when the value has no fractional part.
pub fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        json!(n as i64)
    } else {
        json!(n)
    }
}

/// Pick the value to store: the first fact above
/// [`PREFERRED_FACT_CONFIDENCE`] whose kind fits `fact_type`, else the first
/// fact, else the raw content coerced to `fact_type`.
///
/// Returns the value and the confidence of the fact it came from.
pub fn select_value(facts: &[ExtractedFact], raw: &str, fact_type: FactType) -> (Value, Option<f64>) {
    facts
        .iter()
        .find(|f| f.confidence > PREFERRED_FACT_CONFIDENCE && f.kind.matches_fact_type(fact_type))
        .or_else(|| facts.first())
        .map(|fact| (coerce_value(&fact.value, fact_type), Some(fact.confidence)))
        .unwrap_or_else(|| (coerce_raw(raw, fact_type), None))
}

/// Bring a fact value into the monitor's declared shape when it can be
/// read that way; otherwise keep it as extracted.
pub fn coerce_value(value: &Value, fact_type: FactType) -> Value {
    match fact_type {
        FactType::Number => numeric_value_of(value).map(number_value).unwrap_or_else(|| value.clone()),
        FactType::Boolean => match value {
            Value::String(s) => parse_bool(s).map(Value::Bool).unwrap_or_else(|| value.clone()),
            _ => value.clone(),
        },
        FactType::String => match value {
            Value::String(_) => value.clone(),
            Value::Number(_) | Value::Bool(_) => Value::String(value.to_string()),
            _ => value.clone(),
        },
        FactType::Object => value.clone(),
    }
}

fn coerce_raw(raw: &str, fact_type: FactType) -> Value {
    let text = strip_markup(raw);
    let text = text.trim();
    match fact_type {
        FactType::Number => first_number(text)
            .map(number_value)
            .unwrap_or_else(|| Value::String(truncate(text))),
        FactType::Boolean => parse_bool(text)
            .map(Value::Bool)
            .unwrap_or_else(|| Value::String(truncate(text))),
        FactType::String => Value::String(truncate(text)),
        FactType::Object => parse_json_object(raw)
            .map(Value::Object)
            .unwrap_or_else(|| json!({ "text": truncate(text) })),
    }
}

fn first_number(text: &str) -> Option<f64> {
    detect_kinds(text)
        .into_iter()
        .filter(|kind| *kind != NormalizationKind::DateTime)
        .find_map(|kind| match normalize(text, kind).ok()?.value {
            NormalizedValue::Number(n) => Some(n),
            _ => None,
        })
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_RAW_VALUE_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::facts::{FactKind, FactValidation, SourceLocation};

    fn fact(kind: FactKind, value: Value, confidence: f64) -> ExtractedFact {
        ExtractedFact {
            id: "f".into(),
            kind,
            value,
            confidence,
            unit: None,
            context: None,
            location: SourceLocation {
                content_type: "text/plain".into(),
                source_url: None,
                selector: None,
                position: None,
                source_timestamp: chrono::Utc::now(),
            },
            validation: FactValidation {
                is_valid: true,
                issues: Vec::new(),
                quality_score: confidence,
            },
        }
    }

    #[test]
    fn extracts_first_url_without_trailing_punctuation() {
        let prompt = "Alert me when https://example.com/tsla?x=1. drops, or http://other.org";
        assert_eq!(extract_url(prompt).as_deref(), Some("https://example.com/tsla?x=1"));
        assert_eq!(
            extract_url("see (https://example.com/a)").as_deref(),
            Some("https://example.com/a")
        );
        assert!(extract_url("no link here").is_none());
    }

    #[test]
    fn synthetic_values_are_typed() {
        assert_eq!(synthetic_value(FactType::Number), json!(100));
        assert_eq!(synthetic_value(FactType::String), json!("synthetic-test-value"));
        assert_eq!(synthetic_value(FactType::Boolean), json!(false));
        assert_eq!(synthetic_value(FactType::Object), json!({"synthetic": true}));
        assert!(synthetic_content("price", FactType::Number).starts_with(SYNTHETIC_CONTENT_PREFIX));
    }

    #[test]
    fn prefers_confident_matching_fact() {
        let facts = vec![
            fact(FactKind::Text, json!("Tesla"), 0.95),
            fact(FactKind::Numerical, json!(180), 0.6),
            fact(FactKind::Numerical, json!("$215.00"), 0.9),
        ];
        let (value, confidence) = select_value(&facts, "", FactType::Number);
        assert_eq!(value, json!(215));
        assert_eq!(confidence, Some(0.9));
    }

    #[test]
    fn falls_back_to_first_fact() {
        let facts = vec![
            fact(FactKind::Text, json!("Tesla"), 0.95),
            fact(FactKind::Numerical, json!(180), 0.6),
        ];
        let (value, confidence) = select_value(&facts, "", FactType::Number);
        assert_eq!(value, json!("Tesla"));
        assert_eq!(confidence, Some(0.95));
    }

    #[test]
    fn falls_back_to_raw_content() {
        let (value, confidence) = select_value(&[], "<p>Price: 42</p>", FactType::Number);
        assert_eq!(value, json!(42));
        assert!(confidence.is_none());

        let (value, _) = select_value(&[], "<b>Yes</b>", FactType::Boolean);
        assert_eq!(value, json!(true));

        let (value, _) = select_value(&[], r#"{"status":"open"}"#, FactType::Object);
        assert_eq!(value, json!({"status": "open"}));
    }

    #[test]
    fn raw_string_is_truncated() {
        let long = "a".repeat(2000);
        let (value, _) = select_value(&[], &long, FactType::String);
        assert_eq!(value.as_str().unwrap().len(), MAX_RAW_VALUE_CHARS);
    }

    #[test]
    fn number_value_keeps_fractions() {
        assert_eq!(number_value(215.0), json!(215));
        assert_eq!(number_value(215.5), json!(215.5));
    }
}
