use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::facts::{ExtractedFact, FactKind, FactQualitySummary};

// ═══════════════════════════════════════════
// Segments
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelevanceClass {
    HighlyRelevant,
    ModeratelyRelevant,
    LowRelevance,
    Noise,
}

impl RelevanceClass {
    /// Base confidence per tier. Noise confidence is derived from the removal score instead.
    pub fn base_confidence(&self) -> Option<f64> {
        match self {
            Self::HighlyRelevant => Some(0.9),
            Self::ModeratelyRelevant => Some(0.7),
            Self::LowRelevance => Some(0.4),
            Self::Noise => None,
        }
    }

    pub fn is_relevant(&self) -> bool {
        matches!(self, Self::HighlyRelevant | Self::ModeratelyRelevant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseType {
    Advertisement,
    Navigation,
    Boilerplate,
    SocialShare,
    /// Too short or too few real words to carry information.
    Fragment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    pub word_count: usize,
    pub has_numbers: bool,
    pub has_dates: bool,
    pub selector: Option<String>,
    pub position: usize,
}

/// One classified block of content. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSegment {
    pub id: String,
    pub text: String,
    pub relevance: RelevanceClass,
    pub confidence: f64,
    pub metadata: SegmentMetadata,
    pub noise_types: Vec<NoiseType>,
    pub removal_confidence: f64,
}

impl ContentSegment {
    pub fn is_noise(&self) -> bool {
        self.relevance == RelevanceClass::Noise
    }
}

// ═══════════════════════════════════════════
// Normalized data
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationKind {
    Currency,
    Percentage,
    DateTime,
    Measurement,
    Numbers,
    Text,
}

impl NormalizationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Currency => "currency",
            Self::Percentage => "percentage",
            Self::DateTime => "date_time",
            Self::Measurement => "measurement",
            Self::Numbers => "numbers",
            Self::Text => "text",
        }
    }
}

impl std::fmt::Display for NormalizationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum NormalizedValue {
    Number(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl NormalizedValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Timestamp(ts) => Some(ts.timestamp() as f64),
            Self::Text(_) => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Number(n) => serde_json::json!(n),
            Self::Timestamp(ts) => serde_json::Value::String(ts.to_rfc3339()),
            Self::Text(s) => serde_json::Value::String(s.clone()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizationMetadata {
    /// Digits after the decimal point in the source text.
    pub precision: Option<u32>,
    pub currency_code: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedData {
    pub id: String,
    pub original_text: String,
    pub value: NormalizedValue,
    pub kind: NormalizationKind,
    pub confidence: f64,
    pub unit: Option<String>,
    pub metadata: NormalizationMetadata,
}

// ═══════════════════════════════════════════
// Temporal data
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalPrecision {
    Day,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalData {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub original_text: String,
    pub confidence: f64,
    pub precision: TemporalPrecision,
    pub is_relative: bool,
    /// The "now" a relative expression was resolved against.
    pub reference_point: Option<DateTime<Utc>>,
}

// ═══════════════════════════════════════════
// Pipeline input / output
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancementInput {
    pub content: String,
    pub source_url: Option<String>,
    pub content_type: String,
    pub selector: Option<String>,
    pub expected_fact_types: Vec<FactKind>,
}

impl EnhancementInput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source_url: None,
            content_type: "text/html".to_string(),
            selector: None,
            expected_fact_types: Vec::new(),
        }
    }

    pub fn with_source(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_expected(mut self, kinds: Vec<FactKind>) -> Self {
        self.expected_fact_types = kinds;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancementOptions {
    pub normalize: bool,
    pub extract_temporal: bool,
    pub extract_facts: bool,
    pub summarize: bool,
    pub quality_threshold: f64,
}

impl Default for EnhancementOptions {
    fn default() -> Self {
        Self {
            normalize: true,
            extract_temporal: true,
            extract_facts: true,
            summarize: false,
            quality_threshold: 0.7,
        }
    }
}

/// Ratios rounded to 2 decimals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub overall_relevance: f64,
    pub data_completeness: f64,
    pub temporal_accuracy: f64,
    pub normalization_success: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancementResult {
    pub success: bool,
    pub source_url: Option<String>,
    pub segments: Vec<ContentSegment>,
    /// Non-noise segment text joined with blank lines.
    pub cleaned_content: String,
    pub normalized_data: Vec<NormalizedData>,
    pub temporal_data: Vec<TemporalData>,
    pub extracted_facts: Vec<ExtractedFact>,
    pub fact_quality: Option<FactQualitySummary>,
    pub summary: Option<String>,
    pub detected_language: String,
    pub quality: QualityMetrics,
    pub warnings: Vec<String>,
    pub processing_time_ms: u64,
    pub error: Option<String>,
}

impl EnhancementResult {
    /// A result for an item that never produced output (timeout, failure).
    pub fn failed(source_url: Option<String>, error: String, processing_time_ms: u64) -> Self {
        Self {
            success: false,
            source_url,
            segments: Vec::new(),
            cleaned_content: String::new(),
            normalized_data: Vec::new(),
            temporal_data: Vec::new(),
            extracted_facts: Vec::new(),
            fact_quality: None,
            summary: None,
            detected_language: "unknown".to_string(),
            quality: QualityMetrics::default(),
            warnings: Vec::new(),
            processing_time_ms,
            error: Some(error),
        }
    }
}

// ═══════════════════════════════════════════
// Batch / cross-source
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceRelationship {
    Duplicate,
    Correlated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceCorrelation {
    pub source_a: String,
    pub source_b: String,
    pub similarity: f64,
    pub matching_facts: usize,
    pub relationship: SourceRelationship,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inconsistency {
    pub source_a: String,
    pub source_b: String,
    pub kind: NormalizationKind,
    pub unit: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossSourceAnalysis {
    pub correlations: Vec<SourceCorrelation>,
    pub inconsistencies: Vec<Inconsistency>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchEnhancementResult {
    /// True when at least one item succeeded.
    pub success: bool,
    pub results: Vec<EnhancementResult>,
    pub cross_source: CrossSourceAnalysis,
    pub processing_time_ms: u64,
}
