use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::heuristics::{contains_word, extract_target_phrase, extract_threshold};
use crate::models::FactType;
use crate::pipeline::facts::numeric_value_of;

/// Tolerance for `equals` on numbers.
const NUMERIC_EQUALS_TOLERANCE: f64 = 0.01;

/// Which branch of the condition grammar decided the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerRule {
    Above,
    Below,
    Equals,
    Drops,
    Rises,
    Contains,
    TextEquals,
    IsTrue,
    IsFalse,
    Changes,
    /// No keyword matched: trigger on any difference from a known previous value.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerOutcome {
    pub triggered: bool,
    pub rule: TriggerRule,
    pub threshold: Option<f64>,
}

impl TriggerOutcome {
    fn new(rule: TriggerRule, triggered: bool) -> Self {
        Self { triggered, rule, threshold: None }
    }

    fn with_threshold(rule: TriggerRule, threshold: Option<f64>, triggered: bool) -> Self {
        Self { triggered, rule, threshold }
    }
}

/// Whether `condition` holds for `current` (and `previous`) under `fact_type`.
pub fn evaluate_trigger(
    condition: &str,
    current: &Value,
    previous: Option<&Value>,
    fact_type: FactType,
) -> bool {
    evaluate_trigger_detailed(condition, current, previous, fact_type).triggered
}

/// As [`evaluate_trigger`], also reporting the rule that decided.
pub fn evaluate_trigger_detailed(
    condition: &str,
    current: &Value,
    previous: Option<&Value>,
    fact_type: FactType,
) -> TriggerOutcome {
    let lower = condition.to_lowercase();
    let previous = previous.filter(|p| !p.is_null());

    let outcome = match fact_type {
        FactType::Number => evaluate_numeric(&lower, current, previous),
        FactType::String => evaluate_text(&lower, current, previous),
        FactType::Boolean => evaluate_boolean(&lower, current, previous),
        FactType::Object => None,
    };

    outcome.unwrap_or_else(|| TriggerOutcome::new(TriggerRule::Fallback, differs(current, previous)))
}

/// Previous is known and its JSON differs from current.
fn differs(current: &Value, previous: Option<&Value>) -> bool {
    previous.is_some_and(|p| p.to_string() != current.to_string())
}

fn evaluate_numeric(lower: &str, current: &Value, previous: Option<&Value>) -> Option<TriggerOutcome> {
    let threshold = extract_threshold(lower);
    let current_num = numeric_value_of(current);
    let previous_num = previous.and_then(numeric_value_of);

    let compare = |rule: TriggerRule, op: fn(f64, f64) -> bool| {
        let triggered = match (current_num, threshold) {
            (Some(c), Some(t)) => op(c, t),
            _ => false,
        };
        TriggerOutcome::with_threshold(rule, threshold, triggered)
    };

    if lower.contains("above") || lower.contains('>') {
        return Some(compare(TriggerRule::Above, |c, t| c > t));
    }
    if lower.contains("below") || lower.contains('<') {
        return Some(compare(TriggerRule::Below, |c, t| c < t));
    }
    if lower.contains("equals") || lower.contains('=') {
        return Some(compare(TriggerRule::Equals, |c, t| (c - t).abs() <= NUMERIC_EQUALS_TOLERANCE));
    }

    let delta = threshold.unwrap_or(0.0);
    if lower.contains("drops") {
        let triggered = matches!((current_num, previous_num), (Some(c), Some(p)) if c < p - delta);
        return Some(TriggerOutcome::with_threshold(TriggerRule::Drops, Some(delta), triggered));
    }
    if lower.contains("rises") || lower.contains("increases") {
        let triggered = matches!((current_num, previous_num), (Some(c), Some(p)) if c > p + delta);
        return Some(TriggerOutcome::with_threshold(TriggerRule::Rises, Some(delta), triggered));
    }
    None
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn evaluate_text(lower: &str, current: &Value, previous: Option<&Value>) -> Option<TriggerOutcome> {
    let current_text = text_of(current).to_lowercase();

    if lower.contains("contains") {
        let triggered = extract_target_phrase(lower)
            .is_some_and(|target| current_text.contains(&target.to_lowercase()));
        return Some(TriggerOutcome::new(TriggerRule::Contains, triggered));
    }
    if lower.contains("equals") || contains_word(lower, "is") {
        let triggered = extract_target_phrase(lower)
            .is_some_and(|target| current_text.trim() == target.to_lowercase());
        return Some(TriggerOutcome::new(TriggerRule::TextEquals, triggered));
    }
    if lower.contains("changes") {
        return Some(TriggerOutcome::new(TriggerRule::Changes, differs(current, previous)));
    }
    None
}

fn bool_of(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn evaluate_boolean(lower: &str, current: &Value, previous: Option<&Value>) -> Option<TriggerOutcome> {
    if lower.contains("true") {
        return Some(TriggerOutcome::new(TriggerRule::IsTrue, bool_of(current) == Some(true)));
    }
    if lower.contains("false") {
        return Some(TriggerOutcome::new(TriggerRule::IsFalse, bool_of(current) == Some(false)));
    }
    if lower.contains("changes") {
        return Some(TriggerOutcome::new(TriggerRule::Changes, differs(current, previous)));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn above_threshold_triggers() {
        assert!(evaluate_trigger("above 200", &json!(215), Some(&json!(195)), FactType::Number));
        assert!(!evaluate_trigger("above 200", &json!(199.5), None, FactType::Number));
        assert!(evaluate_trigger("price > 1,000", &json!("$1,200"), None, FactType::Number));
    }

    #[test]
    fn below_and_equals() {
        assert!(evaluate_trigger("below 200", &json!(190), None, FactType::Number));
        assert!(evaluate_trigger("equals 3.14", &json!(3.145), None, FactType::Number));
        assert!(!evaluate_trigger("equals 3.14", &json!(3.2), None, FactType::Number));
    }

    #[test]
    fn missing_threshold_does_not_trigger() {
        let outcome = evaluate_trigger_detailed("goes above the target", &json!(500), None, FactType::Number);
        assert_eq!(outcome.rule, TriggerRule::Above);
        assert!(!outcome.triggered);
    }

    #[test]
    fn drops_without_threshold_defaults_to_zero() {
        let outcome = evaluate_trigger_detailed("drops", &json!(190), Some(&json!(205)), FactType::Number);
        assert_eq!(outcome.rule, TriggerRule::Drops);
        assert_eq!(outcome.threshold, Some(0.0));
        assert!(outcome.triggered);
    }

    #[test]
    fn drops_requires_previous() {
        assert!(!evaluate_trigger("drops", &json!(190), None, FactType::Number));
    }

    #[test]
    fn drops_by_amount() {
        assert!(evaluate_trigger("drops by 10", &json!(190), Some(&json!(205)), FactType::Number));
        assert!(!evaluate_trigger("drops by 20", &json!(190), Some(&json!(205)), FactType::Number));
    }

    #[test]
    fn rises_and_increases() {
        assert!(evaluate_trigger("rises by 5", &json!(111), Some(&json!(100)), FactType::Number));
        assert!(evaluate_trigger("increases", &json!(101), Some(&json!(100)), FactType::Number));
        assert!(!evaluate_trigger("increases", &json!(100), Some(&json!(100)), FactType::Number));
    }

    #[test]
    fn string_contains_quoted_or_last_word() {
        assert!(evaluate_trigger(r#"contains "Sold Out""#, &json!("Status: sold out today"), None, FactType::String));
        assert!(evaluate_trigger("headline contains recall", &json!("Major RECALL announced"), None, FactType::String));
        assert!(!evaluate_trigger("headline contains recall", &json!("All good"), None, FactType::String));
    }

    #[test]
    fn string_equals_and_is() {
        assert!(evaluate_trigger("status is available", &json!(" Available "), None, FactType::String));
        assert!(evaluate_trigger("equals 'in stock'", &json!("IN STOCK"), None, FactType::String));
        assert!(!evaluate_trigger("status is available", &json!("available soon"), None, FactType::String));
    }

    #[test]
    fn string_changes() {
        assert!(evaluate_trigger("changes", &json!("b"), Some(&json!("a")), FactType::String));
        assert!(!evaluate_trigger("changes", &json!("a"), Some(&json!("a")), FactType::String));
        assert!(!evaluate_trigger("changes", &json!("a"), None, FactType::String));
    }

    #[test]
    fn boolean_rules() {
        assert!(evaluate_trigger("becomes true", &json!(true), None, FactType::Boolean));
        assert!(evaluate_trigger("becomes true", &json!("yes"), None, FactType::Boolean));
        assert!(evaluate_trigger("is false", &json!(false), None, FactType::Boolean));
        assert!(!evaluate_trigger("is false", &json!(true), None, FactType::Boolean));
        assert!(evaluate_trigger("changes", &json!(false), Some(&json!(true)), FactType::Boolean));
    }

    #[test]
    fn fallback_requires_known_previous() {
        let outcome = evaluate_trigger_detailed("whenever", &json!({"a": 2}), Some(&json!({"a": 1})), FactType::Object);
        assert_eq!(outcome.rule, TriggerRule::Fallback);
        assert!(outcome.triggered);
        assert!(!evaluate_trigger("whenever", &json!({"a": 2}), None, FactType::Object));
        assert!(!evaluate_trigger("whenever", &json!({"a": 2}), Some(&Value::Null), FactType::Object));
        assert!(!evaluate_trigger("notify me", &json!(5), Some(&json!(5)), FactType::Number));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let cases = [
            ("above 200", json!(215), Some(json!(195)), FactType::Number),
            ("drops", json!(190), Some(json!(205)), FactType::Number),
            ("contains sale", json!("Big SALE"), None, FactType::String),
            ("changes", json!(true), Some(json!(false)), FactType::Boolean),
        ];
        for (condition, current, previous, fact_type) in cases {
            let first = evaluate_trigger(condition, &current, previous.as_ref(), fact_type);
            for _ in 0..10 {
                assert_eq!(evaluate_trigger(condition, &current, previous.as_ref(), fact_type), first);
            }
        }
    }
}
