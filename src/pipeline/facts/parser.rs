use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use super::types::{ExtractedFact, FactKind, SourceLocation};
use super::validation::validate_fact;
use crate::pipeline::lenient::{parse_array_lenient, parse_json_array};
use crate::pipeline::llm::sanitize_llm_output;

/// Confidence assumed when the model omits one.
const DEFAULT_CONFIDENCE: f64 = 0.5;

/// One array element as the model wrote it.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFact {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub location: Option<Value>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
}

/// Where the facts of one response came from.
#[derive(Debug, Clone)]
pub struct ResponseOrigin<'a> {
    pub content_type: &'a str,
    pub source_url: Option<&'a str>,
    pub selector: Option<&'a str>,
    pub extracted_at: DateTime<Utc>,
}

/// Parse a model response into validated facts.
///
/// `None` when no JSON array can be isolated; the caller treats that as
/// "no facts", not as an error. Elements that do not fit [`RawFact`] are skipped.
pub fn parse_fact_response(raw: &str, origin: &ResponseOrigin<'_>) -> Option<Vec<ExtractedFact>> {
    let cleaned = sanitize_llm_output(raw);
    let items = parse_json_array(&cleaned)?;
    let raw_facts: Vec<RawFact> = parse_array_lenient(&items);
    if raw_facts.len() < items.len() {
        tracing::debug!(
            skipped = items.len() - raw_facts.len(),
            "Skipped malformed fact elements"
        );
    }
    Some(raw_facts.into_iter().map(|f| into_fact(f, origin)).collect())
}

fn location_text(location: Option<Value>) -> Option<String> {
    match location? {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn into_fact(raw: RawFact, origin: &ResponseOrigin<'_>) -> ExtractedFact {
    let kind = raw
        .kind
        .as_deref()
        .map(FactKind::from_label)
        .unwrap_or(FactKind::Text);
    let raw_confidence = raw.confidence.unwrap_or(DEFAULT_CONFIDENCE);
    let validation = validate_fact(kind, &raw.value, raw_confidence);
    let confidence = if raw_confidence.is_nan() { 0.0 } else { raw_confidence.clamp(0.0, 1.0) };

    ExtractedFact {
        id: raw
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        kind,
        value: raw.value,
        confidence,
        unit: raw.unit,
        context: raw.context,
        location: SourceLocation {
            content_type: origin.content_type.to_string(),
            source_url: origin.source_url.map(str::to_string),
            selector: origin.selector.map(str::to_string),
            position: location_text(raw.location),
            source_timestamp: origin.extracted_at,
        },
        validation,
    }
}
