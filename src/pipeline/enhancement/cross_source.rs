//! Pairwise comparison of enhancement results from different sources.

use serde_json::Value;

use super::types::{
    CrossSourceAnalysis, EnhancementResult, Inconsistency, NormalizedData, NormalizedValue,
    SourceCorrelation, SourceRelationship,
};
use crate::pipeline::facts::{numeric_value_of, relative_difference, ExtractedFact};

/// Numeric values closer than this (relative) are the same value.
const VALUE_MATCH_TOLERANCE: f64 = 0.05;
const DUPLICATE_SIMILARITY: f64 = 0.8;

/// Numbers within 5%, strings equal ignoring case and surrounding whitespace,
/// anything else by JSON equality.
pub fn fact_values_match(a: &Value, b: &Value) -> bool {
    if let (Some(x), Some(y)) = (numeric_value_of(a), numeric_value_of(b)) {
        return relative_difference(x, y) < VALUE_MATCH_TOLERANCE;
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => x.trim().to_lowercase() == y.trim().to_lowercase(),
        _ => a == b,
    }
}

/// Count of facts in `a` with a same-kind matching fact in `b`, and that
/// count over the larger list.
pub fn fact_similarity(a: &[ExtractedFact], b: &[ExtractedFact]) -> (usize, f64) {
    let total = a.len().max(b.len());
    if a.is_empty() || b.is_empty() {
        return (0, 0.0);
    }
    let matching = a
        .iter()
        .filter(|fa| {
            b.iter()
                .any(|fb| fa.kind == fb.kind && fact_values_match(&fa.value, &fb.value))
        })
        .count();
    (matching, matching as f64 / total as f64)
}

/// Numbers within 5%, timestamps on the same calendar day (UTC), text
/// ignoring case. Mixed variants never agree.
fn normalized_values_match(a: &NormalizedValue, b: &NormalizedValue) -> bool {
    match (a, b) {
        (NormalizedValue::Number(x), NormalizedValue::Number(y)) => {
            relative_difference(*x, *y) < VALUE_MATCH_TOLERANCE
        }
        (NormalizedValue::Timestamp(x), NormalizedValue::Timestamp(y)) => {
            x.date_naive() == y.date_naive()
        }
        (NormalizedValue::Text(x), NormalizedValue::Text(y)) => {
            x.trim().to_lowercase() == y.trim().to_lowercase()
        }
        _ => false,
    }
}

/// First (kind, unit) group present in both sources where no value agrees.
fn find_conflict<'a>(
    a: &'a [NormalizedData],
    b: &'a [NormalizedData],
) -> Option<(&'a NormalizedData, &'a NormalizedData)> {
    for da in a {
        let same_group: Vec<&NormalizedData> = b
            .iter()
            .filter(|db| db.kind == da.kind && db.unit == da.unit)
            .collect();
        let Some(first) = same_group.first() else {
            continue;
        };
        let group_agrees = a
            .iter()
            .filter(|x| x.kind == da.kind && x.unit == da.unit)
            .any(|x| same_group.iter().any(|y| normalized_values_match(&x.value, &y.value)));
        if !group_agrees {
            return Some((da, first));
        }
    }
    None
}

fn source_label(index: usize, result: &EnhancementResult) -> String {
    result
        .source_url
        .clone()
        .unwrap_or_else(|| format!("item_{index}"))
}

fn describe(value: &NormalizedValue) -> String {
    match value {
        NormalizedValue::Number(n) => n.to_string(),
        NormalizedValue::Timestamp(ts) => ts.format("%Y-%m-%d").to_string(),
        NormalizedValue::Text(s) => s.clone(),
    }
}

/// Correlations and conflicts between every pair of successful results.
pub fn analyze_cross_source(results: &[EnhancementResult]) -> CrossSourceAnalysis {
    let mut analysis = CrossSourceAnalysis::default();
    let successful: Vec<(usize, &EnhancementResult)> =
        results.iter().enumerate().filter(|(_, r)| r.success).collect();

    for (pos, (i, a)) in successful.iter().enumerate() {
        for (j, b) in successful.iter().skip(pos + 1) {
            let (matching, similarity) = fact_similarity(&a.extracted_facts, &b.extracted_facts);
            if similarity > 0.0 {
                analysis.correlations.push(SourceCorrelation {
                    source_a: source_label(*i, a),
                    source_b: source_label(*j, b),
                    similarity,
                    matching_facts: matching,
                    relationship: if similarity >= DUPLICATE_SIMILARITY {
                        SourceRelationship::Duplicate
                    } else {
                        SourceRelationship::Correlated
                    },
                });
            }

            if let Some((da, db)) = find_conflict(&a.normalized_data, &b.normalized_data) {
                let unit = da.unit.as_deref().map(|u| format!(" ({u})")).unwrap_or_default();
                analysis.inconsistencies.push(Inconsistency {
                    source_a: source_label(*i, a),
                    source_b: source_label(*j, b),
                    kind: da.kind,
                    unit: da.unit.clone(),
                    description: format!(
                        "{}{unit}: {} vs {}",
                        da.kind,
                        describe(&da.value),
                        describe(&db.value)
                    ),
                });
            }
        }
    }

    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::enhancement::normalizer::normalize;
    use crate::pipeline::enhancement::types::NormalizationKind;
    use crate::pipeline::facts::{validate_fact, FactKind, SourceLocation};
    use chrono::Utc;
    use serde_json::json;

    fn fact(kind: FactKind, value: Value) -> ExtractedFact {
        ExtractedFact {
            id: format!("{value}"),
            kind,
            validation: validate_fact(kind, &value, 0.9),
            value,
            confidence: 0.9,
            unit: None,
            context: None,
            location: SourceLocation {
                content_type: "text/html".into(),
                source_url: None,
                selector: None,
                position: None,
                source_timestamp: Utc::now(),
            },
        }
    }

    fn result(url: &str, facts: Vec<ExtractedFact>, normalized: Vec<NormalizedData>) -> EnhancementResult {
        let mut r = EnhancementResult::failed(Some(url.into()), String::new(), 0);
        r.success = true;
        r.error = None;
        r.extracted_facts = facts;
        r.normalized_data = normalized;
        r
    }

    #[test]
    fn numbers_within_five_percent_match() {
        let a = [fact(FactKind::Numerical, json!(100))];
        assert_eq!(fact_similarity(&a, &[fact(FactKind::Numerical, json!(103))]).0, 1);
        assert_eq!(fact_similarity(&a, &[fact(FactKind::Numerical, json!(120))]).0, 0);
    }

    #[test]
    fn strings_match_case_insensitively() {
        assert!(fact_values_match(&json!("  In Stock "), &json!("in stock")));
        assert!(!fact_values_match(&json!("in stock"), &json!("sold out")));
    }

    #[test]
    fn kinds_must_agree() {
        let a = [fact(FactKind::Numerical, json!(100))];
        let b = [fact(FactKind::Text, json!("100"))];
        assert_eq!(fact_similarity(&a, &b), (0, 0.0));
    }

    #[test]
    fn similarity_over_larger_list() {
        let a = [fact(FactKind::Numerical, json!(100)), fact(FactKind::Text, json!("open"))];
        let b = [
            fact(FactKind::Numerical, json!(101)),
            fact(FactKind::Text, json!("closed")),
            fact(FactKind::Text, json!("ignored")),
            fact(FactKind::Boolean, json!(true)),
        ];
        let (matching, similarity) = fact_similarity(&a, &b);
        assert_eq!(matching, 1);
        assert!((similarity - 0.25).abs() < 1e-9);
    }

    #[test]
    fn identical_sources_are_duplicates() {
        let results = vec![
            result("https://a.example", vec![fact(FactKind::Numerical, json!(100))], vec![]),
            result("https://b.example", vec![fact(FactKind::Numerical, json!(102))], vec![]),
        ];
        let analysis = analyze_cross_source(&results);
        assert_eq!(analysis.correlations.len(), 1);
        assert_eq!(analysis.correlations[0].relationship, SourceRelationship::Duplicate);
        assert_eq!(analysis.correlations[0].source_a, "https://a.example");
    }

    #[test]
    fn conflicting_prices_reported_once_per_pair() {
        let results = vec![
            result(
                "https://a.example",
                vec![],
                vec![
                    normalize("$215", NormalizationKind::Currency).unwrap(),
                    normalize("$10", NormalizationKind::Currency).unwrap(),
                ],
            ),
            result("https://b.example", vec![], vec![normalize("$250", NormalizationKind::Currency).unwrap()]),
        ];
        let analysis = analyze_cross_source(&results);
        assert_eq!(analysis.inconsistencies.len(), 1);
        assert_eq!(analysis.inconsistencies[0].kind, NormalizationKind::Currency);
        assert_eq!(analysis.inconsistencies[0].unit.as_deref(), Some("USD"));
        assert!(analysis.inconsistencies[0].description.contains("215 vs 250"));
    }

    #[test]
    fn agreeing_prices_are_not_inconsistent() {
        let results = vec![
            result("a", vec![], vec![normalize("$215", NormalizationKind::Currency).unwrap()]),
            result("b", vec![], vec![normalize("$216", NormalizationKind::Currency).unwrap()]),
        ];
        assert!(analyze_cross_source(&results).inconsistencies.is_empty());
    }

    #[test]
    fn dates_a_year_apart_are_inconsistent() {
        let results = vec![
            result("a", vec![], vec![normalize("Launch 2024-01-01", NormalizationKind::DateTime).unwrap()]),
            result("b", vec![], vec![normalize("Launch 2025-06-01", NormalizationKind::DateTime).unwrap()]),
        ];
        let analysis = analyze_cross_source(&results);
        assert_eq!(analysis.inconsistencies.len(), 1);
        assert_eq!(analysis.inconsistencies[0].kind, NormalizationKind::DateTime);
        assert!(analysis.inconsistencies[0].description.contains("2024-01-01 vs 2025-06-01"));
    }

    #[test]
    fn same_day_in_different_formats_agrees() {
        let results = vec![
            result("a", vec![], vec![normalize("Launch 2024-01-01", NormalizationKind::DateTime).unwrap()]),
            result("b", vec![], vec![normalize("January 1, 2024", NormalizationKind::DateTime).unwrap()]),
        ];
        assert!(analyze_cross_source(&results).inconsistencies.is_empty());
    }

    #[test]
    fn failed_results_ignored() {
        let mut failed = result("a", vec![fact(FactKind::Numerical, json!(100))], vec![]);
        failed.success = false;
        let ok = result("b", vec![fact(FactKind::Numerical, json!(100))], vec![]);
        assert!(analyze_cross_source(&[failed, ok]).correlations.is_empty());
    }
}
