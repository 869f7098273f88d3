use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::validation::FactValidation;
use crate::models::FactType;

/// Kind of an extracted fact. Model labels are mapped onto these via [`FactKind::from_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactKind {
    Numerical,
    Temporal,
    Boolean,
    Url,
    Structured,
    Text,
}

impl FactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Numerical => "numerical",
            Self::Temporal => "temporal",
            Self::Boolean => "boolean",
            Self::Url => "url",
            Self::Structured => "structured",
            Self::Text => "text",
        }
    }

    /// Case-insensitive synonym mapping. Anything unrecognised is text.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "number" | "numerical" | "numeric" => Self::Numerical,
            "date" | "time" | "datetime" | "temporal" => Self::Temporal,
            "bool" | "boolean" => Self::Boolean,
            "link" | "url" => Self::Url,
            "object" | "structured" => Self::Structured,
            _ => Self::Text,
        }
    }

    /// Whether a fact of this kind can stand in for a monitor of `fact_type`.
    pub fn matches_fact_type(&self, fact_type: FactType) -> bool {
        match fact_type {
            FactType::Number => *self == Self::Numerical,
            FactType::String => matches!(self, Self::Text | Self::Temporal | Self::Url),
            FactType::Boolean => *self == Self::Boolean,
            FactType::Object => *self == Self::Structured,
        }
    }

    pub fn for_fact_type(fact_type: FactType) -> Self {
        match fact_type {
            FactType::Number => Self::Numerical,
            FactType::String => Self::Text,
            FactType::Boolean => Self::Boolean,
            FactType::Object => Self::Structured,
        }
    }
}

impl std::fmt::Display for FactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub content_type: String,
    pub source_url: Option<String>,
    pub selector: Option<String>,
    /// Position hint reported by the model, if any.
    pub position: Option<String>,
    pub source_timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedFact {
    pub id: String,
    pub kind: FactKind,
    pub value: Value,
    /// Clamped to [0,1].
    pub confidence: f64,
    pub unit: Option<String>,
    pub context: Option<String>,
    pub location: SourceLocation,
    pub validation: FactValidation,
}

impl ExtractedFact {
    /// Numeric reading of the value: JSON numbers directly, strings after
    /// stripping currency symbols, separators and `%`.
    pub fn numeric_value(&self) -> Option<f64> {
        numeric_value_of(&self.value)
    }
}

pub fn numeric_value_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .chars()
                .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',' | '%' | ' '))
                .collect();
            cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
        }
        _ => None,
    }
}

/// Relative difference `|a - b| / max(|a|, |b|)`; 0 when both are 0.
pub fn relative_difference(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        0.0
    } else {
        (a - b).abs() / scale
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactExtractionRequest {
    pub content: String,
    pub content_type: String,
    pub source_url: Option<String>,
    pub selector: Option<String>,
    pub expected_types: Vec<FactKind>,
    pub quality_threshold: f64,
}

impl FactExtractionRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: "text/plain".to_string(),
            source_url: None,
            selector: None,
            expected_types: Vec::new(),
            quality_threshold: 0.7,
        }
    }

    pub fn with_source(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_expected(mut self, kinds: Vec<FactKind>) -> Self {
        self.expected_types = kinds;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold.clamp(0.0, 1.0);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactQualitySummary {
    /// Every fact the model returned, including ones dropped by the threshold.
    pub total_facts: usize,
    pub high_confidence_facts: usize,
    pub facts_with_issues: usize,
    pub below_threshold: usize,
    pub average_quality: f64,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactExtractionResult {
    pub success: bool,
    /// Facts at or above the quality threshold.
    pub facts: Vec<ExtractedFact>,
    pub quality: FactQualitySummary,
    pub processing_time_ms: u64,
    pub error: Option<String>,
}

impl FactExtractionResult {
    pub fn failed(error: String, processing_time_ms: u64) -> Self {
        Self {
            success: false,
            facts: Vec::new(),
            quality: FactQualitySummary::default(),
            processing_time_ms,
            error: Some(error),
        }
    }
}

/// Two numerical facts from different batch items that agree within tolerance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactCorrelation {
    pub item_a: usize,
    pub item_b: usize,
    pub fact_a: String,
    pub fact_b: String,
    pub relative_difference: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFactExtraction {
    /// One result per request, in request order.
    pub results: Vec<FactExtractionResult>,
    pub correlations: Vec<FactCorrelation>,
    pub processing_time_ms: u64,
}
