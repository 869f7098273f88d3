//! Quality validation for model-extracted facts.
//!
//! Each detected issue lowers the quality score by a fixed penalty; the score
//! never goes below 0.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{numeric_value_of, ExtractedFact, FactKind, FactQualitySummary};
use crate::pipeline::enhancement::classifier::round2;
use crate::pipeline::enhancement::normalizer::parse_raw_date;

const MISSING_VALUE_PENALTY: f64 = 0.5;
const BAD_CONFIDENCE_PENALTY: f64 = 0.3;
const TYPE_MISMATCH_PENALTY: f64 = 0.4;
/// Confidence under this lowers quality by the shortfall.
const LOW_CONFIDENCE_FLOOR: f64 = 0.5;
pub const HIGH_CONFIDENCE_MIN: f64 = 0.8;

static DATE_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{4}-\d{2}-\d{2}\b|\b\d{1,2}[/-]\d{1,2}[/-]\d{4}\b|(?i)\b(?:today|yesterday|tomorrow|\d+\s+(?:days?|weeks?|months?|years?)\s+ago)\b")
        .expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationIssue {
    MissingValue,
    ConfidenceOutOfRange,
    TypeMismatch,
}

impl ValidationIssue {
    pub fn penalty(&self) -> f64 {
        match self {
            Self::MissingValue => MISSING_VALUE_PENALTY,
            Self::ConfidenceOutOfRange => BAD_CONFIDENCE_PENALTY,
            Self::TypeMismatch => TYPE_MISMATCH_PENALTY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactValidation {
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
    /// In [0,1].
    pub quality_score: f64,
}

fn is_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Shape check for the kinds that have one. Other kinds always pass.
pub fn value_matches_kind(kind: FactKind, value: &Value) -> bool {
    match kind {
        FactKind::Numerical => numeric_value_of(value).is_some(),
        FactKind::Temporal => match value {
            Value::String(s) => DATE_SHAPE.is_match(s) || parse_raw_date(s).is_some(),
            Value::Number(_) => true,
            _ => false,
        },
        FactKind::Url => match value {
            Value::String(s) => {
                let s = s.trim();
                (s.starts_with("http://") || s.starts_with("https://"))
                    && !s.contains(char::is_whitespace)
            }
            _ => false,
        },
        FactKind::Boolean | FactKind::Structured | FactKind::Text => true,
    }
}

/// Validate one fact. `raw_confidence` is the model's number before clamping.
pub fn validate_fact(kind: FactKind, value: &Value, raw_confidence: f64) -> FactValidation {
    let mut issues = Vec::new();

    if is_missing(value) {
        issues.push(ValidationIssue::MissingValue);
    }
    if !(0.0..=1.0).contains(&raw_confidence) {
        issues.push(ValidationIssue::ConfidenceOutOfRange);
    }
    if !is_missing(value) && !value_matches_kind(kind, value) {
        issues.push(ValidationIssue::TypeMismatch);
    }

    let mut quality = 1.0 - issues.iter().map(ValidationIssue::penalty).sum::<f64>();
    quality = quality.max(0.0);

    let confidence = if raw_confidence.is_nan() { 0.0 } else { raw_confidence.clamp(0.0, 1.0) };
    if confidence < LOW_CONFIDENCE_FLOOR {
        quality -= LOW_CONFIDENCE_FLOOR - confidence;
    }

    FactValidation {
        is_valid: issues.is_empty(),
        issues,
        quality_score: quality.clamp(0.0, 1.0),
    }
}

/// Summary over every fact the model returned. Recommendations are plain
/// threshold checks.
pub fn summarize_quality(all_facts: &[ExtractedFact], threshold: f64) -> FactQualitySummary {
    let total_facts = all_facts.len();
    let high_confidence_facts = all_facts
        .iter()
        .filter(|f| f.confidence >= HIGH_CONFIDENCE_MIN)
        .count();
    let facts_with_issues = all_facts.iter().filter(|f| !f.validation.is_valid).count();
    let below_threshold = all_facts
        .iter()
        .filter(|f| f.validation.quality_score < threshold)
        .count();
    let average_quality = if total_facts == 0 {
        0.0
    } else {
        round2(all_facts.iter().map(|f| f.validation.quality_score).sum::<f64>() / total_facts as f64)
    };

    let mut recommendations = Vec::new();
    if total_facts == 0 {
        recommendations.push("No facts extracted; check the source content or selector".to_string());
    }
    if facts_with_issues > 0 {
        recommendations.push(format!(
            "{facts_with_issues} fact(s) failed validation; tighten extraction hints"
        ));
    }
    if total_facts > 0 && high_confidence_facts * 2 < total_facts {
        recommendations.push(
            "Fewer than half of the facts are high confidence; consider a more specific source"
                .to_string(),
        );
    }
    if below_threshold > 0 {
        recommendations.push(format!(
            "{below_threshold} fact(s) below quality threshold {threshold:.2} were excluded"
        ));
    }

    FactQualitySummary {
        total_facts,
        high_confidence_facts,
        facts_with_issues,
        below_threshold,
        average_quality,
        recommendations,
    }
}
