use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::Instrument;

use super::parser::{parse_fact_response, ResponseOrigin};
use super::prompt::{build_fact_prompt, FACT_EXTRACTION_SYSTEM_PROMPT};
use super::types::{FactExtractionRequest, FactExtractionResult};
use super::validation::summarize_quality;
use crate::pipeline::llm::{generate_with_timeout, GenerateOptions, LanguageModel};

/// Model-backed fact extraction with local parsing, validation and scoring.
///
/// Never returns an error: a failed model call yields `success: false`,
/// an unparsable response yields `success: true` with no facts.
#[derive(Clone)]
pub struct FactExtractor {
    llm: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl FactExtractor {
    pub fn new(llm: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn extract(&self, request: &FactExtractionRequest) -> FactExtractionResult {
        let span = tracing::info_span!(
            "extract_facts",
            source = request.source_url.as_deref().unwrap_or("inline"),
            content_len = request.content.len(),
        );
        self.extract_inner(request).instrument(span).await
    }

    async fn extract_inner(&self, request: &FactExtractionRequest) -> FactExtractionResult {
        let start = Instant::now();
        let prompt = build_fact_prompt(request);
        let options = GenerateOptions::with_system(FACT_EXTRACTION_SYSTEM_PROMPT);

        let response =
            match generate_with_timeout(self.llm.as_ref(), &prompt, &options, self.timeout).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(error = %e, "Fact extraction model call failed");
                    return FactExtractionResult::failed(
                        e.to_string(),
                        start.elapsed().as_millis() as u64,
                    );
                }
            };

        let origin = ResponseOrigin {
            content_type: &request.content_type,
            source_url: request.source_url.as_deref(),
            selector: request.selector.as_deref(),
            extracted_at: Utc::now(),
        };
        let all_facts = parse_fact_response(&response, &origin).unwrap_or_else(|| {
            tracing::warn!(
                response_len = response.len(),
                "No JSON array in fact response, returning no facts"
            );
            Vec::new()
        });

        let quality = summarize_quality(&all_facts, request.quality_threshold);
        let facts: Vec<_> = all_facts
            .into_iter()
            .filter(|f| f.validation.quality_score >= request.quality_threshold)
            .collect();

        tracing::info!(
            kept = facts.len(),
            total = quality.total_facts,
            average_quality = quality.average_quality,
            "Fact extraction complete"
        );

        FactExtractionResult {
            success: true,
            facts,
            quality,
            processing_time_ms: start.elapsed().as_millis() as u64,
            error: None,
        }
    }
}
