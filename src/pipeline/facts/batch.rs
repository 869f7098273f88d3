use std::time::{Duration, Instant};

use futures_util::stream::{self, StreamExt};

use super::extractor::FactExtractor;
use super::types::{
    relative_difference, BatchFactExtraction, FactCorrelation, FactExtractionRequest,
    FactExtractionResult, FactKind,
};
use crate::config::FACT_BATCH_CONCURRENCY;

/// Numerical facts closer than this (relative) correlate across items.
const CORRELATION_TOLERANCE: f64 = 0.10;

impl FactExtractor {
    /// Extract facts for every request, at most [`FACT_BATCH_CONCURRENCY`] at a time.
    ///
    /// Each item races `item_timeout`; an item that loses, or whose model call
    /// fails, becomes a `success: false` entry. Results keep request order.
    pub async fn extract_batch(
        &self,
        requests: &[FactExtractionRequest],
        item_timeout: Duration,
        correlate: bool,
    ) -> BatchFactExtraction {
        let start = Instant::now();

        let results: Vec<FactExtractionResult> = stream::iter(requests.iter().enumerate())
            .map(|(index, request)| async move {
                let item_start = Instant::now();
                match tokio::time::timeout(item_timeout, self.extract(request)).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(index, timeout_ms = item_timeout.as_millis() as u64, "Fact extraction item timed out");
                        FactExtractionResult::failed(
                            format!("Fact extraction timed out after {}ms", item_timeout.as_millis()),
                            item_start.elapsed().as_millis() as u64,
                        )
                    }
                }
            })
            .buffered(FACT_BATCH_CONCURRENCY)
            .collect()
            .await;

        let correlations = if correlate {
            correlate_numerical_facts(&results)
        } else {
            Vec::new()
        };

        tracing::info!(
            items = results.len(),
            failed = results.iter().filter(|r| !r.success).count(),
            correlations = correlations.len(),
            "Fact batch complete"
        );

        BatchFactExtraction {
            results,
            correlations,
            processing_time_ms: start.elapsed().as_millis() as u64,
        }
    }
}

/// Pairwise comparison of numerical facts across successful results.
pub fn correlate_numerical_facts(results: &[FactExtractionResult]) -> Vec<FactCorrelation> {
    let numeric: Vec<Vec<(&str, f64)>> = results
        .iter()
        .map(|r| {
            if !r.success {
                return Vec::new();
            }
            r.facts
                .iter()
                .filter(|f| f.kind == FactKind::Numerical)
                .filter_map(|f| f.numeric_value().map(|v| (f.id.as_str(), v)))
                .collect()
        })
        .collect();

    let mut correlations = Vec::new();
    for a in 0..numeric.len() {
        for b in (a + 1)..numeric.len() {
            for (id_a, value_a) in &numeric[a] {
                for (id_b, value_b) in &numeric[b] {
                    let diff = relative_difference(*value_a, *value_b);
                    if diff < CORRELATION_TOLERANCE {
                        correlations.push(FactCorrelation {
                            item_a: a,
                            item_b: b,
                            fact_a: id_a.to_string(),
                            fact_b: id_b.to_string(),
                            relative_difference: diff,
                        });
                    }
                }
            }
        }
    }
    correlations
}
