use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};
use regex::Regex;
use tracing::Instrument;

use super::classifier::classify_content;
use super::cross_source::analyze_cross_source;
use super::language::detect_language;
use super::markup::strip_markup;
use super::normalizer::{detect_kinds, normalize};
use super::quality::compute_quality_metrics;
use super::temporal::extract_temporal;
use super::types::{
    BatchEnhancementResult, ContentSegment, EnhancementInput, EnhancementOptions,
    EnhancementResult, NormalizedData,
};
use crate::config::{EngineConfig, ENHANCEMENT_BATCH_CONCURRENCY};
use crate::pipeline::facts::{content_excerpt, FactExtractionRequest, FactExtractor};
use crate::pipeline::llm::{generate_with_timeout, sanitize_llm_output, GenerateOptions, LanguageModel};

/// Cleaned content shorter than this skips fact extraction.
const MIN_FACT_CONTENT_CHARS: usize = 10;
const MAX_SUMMARY_CHARS: usize = 200;

const SUMMARY_SYSTEM_PROMPT: &str =
    "You summarize web content in one or two plain sentences. No preamble, no lists.";

static SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^.!?\n]+[.!?]*").expect("valid regex"));

/// Composes classification, normalization, temporal extraction, fact
/// extraction and summarization over one piece of content.
#[derive(Clone)]
pub struct ContentEnhancementPipeline {
    llm: Arc<dyn LanguageModel>,
    facts: FactExtractor,
    llm_timeout: Duration,
    batch_item_timeout: Duration,
}

impl ContentEnhancementPipeline {
    pub fn new(llm: Arc<dyn LanguageModel>, llm_timeout: Duration) -> Self {
        Self {
            facts: FactExtractor::new(Arc::clone(&llm), llm_timeout),
            llm,
            llm_timeout,
            batch_item_timeout: EngineConfig::default().enhancement_batch_timeout(),
        }
    }

    pub fn from_config(llm: Arc<dyn LanguageModel>, config: &EngineConfig) -> Self {
        Self::new(llm, config.llm_timeout()).with_batch_timeout(config.enhancement_batch_timeout())
    }

    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_item_timeout = timeout;
        self
    }

    pub fn fact_extractor(&self) -> &FactExtractor {
        &self.facts
    }

    /// Run every enabled step in order. Degraded steps add a warning; the call
    /// itself always succeeds.
    pub async fn enhance(&self, input: &EnhancementInput, options: &EnhancementOptions) -> EnhancementResult {
        let span = tracing::info_span!(
            "enhance_content",
            source = input.source_url.as_deref().unwrap_or("inline"),
            content_len = input.content.len(),
        );
        self.enhance_inner(input, options).instrument(span).await
    }

    async fn enhance_inner(&self, input: &EnhancementInput, options: &EnhancementOptions) -> EnhancementResult {
        let start = Instant::now();
        let mut warnings = Vec::new();

        // 1. Segment & classify
        let segments = classify_content(&input.content, input.selector.as_deref());

        // 2. Normalize numeric/date segments
        let normalized_data = if options.normalize {
            normalize_segments(&segments)
        } else {
            Vec::new()
        };

        // 3. Temporal expressions from the raw content
        let temporal_data = if options.extract_temporal {
            extract_temporal(&strip_markup(&input.content))
        } else {
            Vec::new()
        };

        let cleaned_content = segments
            .iter()
            .filter(|s| !s.is_noise())
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        // 4. Facts
        let mut extracted_facts = Vec::new();
        let mut fact_quality = None;
        if options.extract_facts {
            if cleaned_content.chars().count() < MIN_FACT_CONTENT_CHARS {
                tracing::debug!(chars = cleaned_content.chars().count(), "Cleaned content too short, skipping fact extraction");
                warnings.push("Cleaned content too short for fact extraction".to_string());
            } else {
                let request = FactExtractionRequest {
                    content: cleaned_content.clone(),
                    content_type: input.content_type.clone(),
                    source_url: input.source_url.clone(),
                    selector: input.selector.clone(),
                    expected_types: input.expected_fact_types.clone(),
                    quality_threshold: options.quality_threshold,
                };
                let result = self.facts.extract(&request).await;
                if let Some(error) = &result.error {
                    warnings.push(format!("Fact extraction failed: {error}"));
                }
                extracted_facts = result.facts;
                fact_quality = Some(result.quality);
            }
        }

        // 5. Summary
        let summary = if options.summarize && !cleaned_content.is_empty() {
            Some(self.summarize(&cleaned_content, &mut warnings).await)
        } else {
            None
        };

        // 6. Metrics
        let quality = compute_quality_metrics(&segments, &normalized_data, &temporal_data);
        let detected_language = detect_language(&cleaned_content).to_string();

        tracing::info!(
            segments = segments.len(),
            normalized = normalized_data.len(),
            temporal = temporal_data.len(),
            facts = extracted_facts.len(),
            warnings = warnings.len(),
            "Enhancement complete"
        );

        EnhancementResult {
            success: true,
            source_url: input.source_url.clone(),
            segments,
            cleaned_content,
            normalized_data,
            temporal_data,
            extracted_facts,
            fact_quality,
            summary,
            detected_language,
            quality,
            warnings,
            processing_time_ms: start.elapsed().as_millis() as u64,
            error: None,
        }
    }

    async fn summarize(&self, cleaned: &str, warnings: &mut Vec<String>) -> String {
        let prompt = format!(
            "Summarize the following content in at most {MAX_SUMMARY_CHARS} characters:\n\n{}",
            content_excerpt(cleaned, 4000)
        );
        let options = GenerateOptions {
            max_tokens: Some(120),
            ..GenerateOptions::with_system(SUMMARY_SYSTEM_PROMPT)
        };

        match generate_with_timeout(self.llm.as_ref(), &prompt, &options, self.llm_timeout).await {
            Ok(raw) => {
                let text = sanitize_llm_output(&raw);
                if text.is_empty() {
                    warnings.push("Summary model returned empty output, used extractive summary".to_string());
                    fallback_summary(cleaned)
                } else {
                    text
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Summary generation failed, using extractive summary");
                warnings.push(format!("Summary generation failed: {e}"));
                fallback_summary(cleaned)
            }
        }
    }

    /// Enhance up to [`ENHANCEMENT_BATCH_CONCURRENCY`] inputs at a time.
    ///
    /// Each item is bounded by the batch item timeout; a timed-out item becomes
    /// a failed result without affecting the others. `success` is true when
    /// any item succeeded.
    pub async fn enhance_batch(
        &self,
        inputs: &[EnhancementInput],
        options: &EnhancementOptions,
    ) -> BatchEnhancementResult {
        let start = Instant::now();
        let item_timeout = self.batch_item_timeout;

        let results: Vec<EnhancementResult> = stream::iter(inputs.iter())
            .map(|input| async move {
                let item_start = Instant::now();
                match tokio::time::timeout(item_timeout, self.enhance(input, options)).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(
                            source = input.source_url.as_deref().unwrap_or("inline"),
                            timeout_ms = item_timeout.as_millis() as u64,
                            "Enhancement item timed out"
                        );
                        EnhancementResult::failed(
                            input.source_url.clone(),
                            format!("Enhancement timed out after {}ms", item_timeout.as_millis()),
                            item_start.elapsed().as_millis() as u64,
                        )
                    }
                }
            })
            .buffered(ENHANCEMENT_BATCH_CONCURRENCY)
            .collect()
            .await;

        let cross_source = analyze_cross_source(&results);

        BatchEnhancementResult {
            success: results.iter().any(|r| r.success),
            results,
            cross_source,
            processing_time_ms: start.elapsed().as_millis() as u64,
        }
    }
}

fn normalize_segments(segments: &[ContentSegment]) -> Vec<NormalizedData> {
    let mut normalized = Vec::new();
    for segment in segments
        .iter()
        .filter(|s| !s.is_noise() && (s.metadata.has_numbers || s.metadata.has_dates))
    {
        for kind in detect_kinds(&segment.text) {
            match normalize(&segment.text, kind) {
                Ok(data) => normalized.push(data),
                Err(e) => tracing::debug!(segment = %segment.id, %kind, error = %e, "Normalization attempt dropped"),
            }
        }
    }
    normalized
}

/// Leading sentences of `text` that fit in the summary budget.
pub fn fallback_summary(text: &str) -> String {
    let mut summary = String::new();
    for sentence in SENTENCE.find_iter(text).map(|m| m.as_str().trim()).filter(|s| !s.is_empty()) {
        let extra = if summary.is_empty() { 0 } else { 1 };
        if summary.chars().count() + extra + sentence.chars().count() > MAX_SUMMARY_CHARS {
            break;
        }
        if !summary.is_empty() {
            summary.push(' ');
        }
        summary.push_str(sentence);
    }

    if summary.is_empty() {
        let cut = content_excerpt(text.trim(), MAX_SUMMARY_CHARS - 3);
        if cut.len() < text.trim().len() {
            return format!("{}...", cut.trim_end());
        }
        return cut.to_string();
    }
    summary
}
