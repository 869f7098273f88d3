use super::classifier::round2;
use super::types::{ContentSegment, NormalizedData, QualityMetrics, TemporalData};

/// Mean of a confidence list, 0 when empty.
fn mean_confidence(confidences: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = confidences.fold((0.0, 0usize), |(sum, n), c| (sum + c, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Quality metrics for one enhancement run.
///
/// - `overall_relevance`: relevant segments / all segments
/// - `data_completeness`: normalized data points / non-noise segments carrying a number or date, capped at 1
/// - `temporal_accuracy`, `normalization_success`: mean confidence of each list
pub fn compute_quality_metrics(
    segments: &[ContentSegment],
    normalized: &[NormalizedData],
    temporal: &[TemporalData],
) -> QualityMetrics {
    let overall_relevance = if segments.is_empty() {
        0.0
    } else {
        let relevant = segments.iter().filter(|s| s.relevance.is_relevant()).count();
        relevant as f64 / segments.len() as f64
    };

    let signal_segments = segments
        .iter()
        .filter(|s| !s.is_noise() && (s.metadata.has_numbers || s.metadata.has_dates))
        .count();
    let data_completeness = if signal_segments == 0 {
        0.0
    } else {
        (normalized.len() as f64 / signal_segments as f64).min(1.0)
    };

    QualityMetrics {
        overall_relevance: round2(overall_relevance),
        data_completeness: round2(data_completeness),
        temporal_accuracy: round2(mean_confidence(temporal.iter().map(|t| t.confidence))),
        normalization_success: round2(mean_confidence(normalized.iter().map(|n| n.confidence))),
    }
}
