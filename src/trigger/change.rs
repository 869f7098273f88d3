use serde_json::Value;

use crate::models::MonitorKind;
use crate::pipeline::facts::numeric_value_of;

/// Relative change a numeric state value must exceed to count as changed.
const NUMERIC_CHANGE_THRESHOLD: f64 = 0.01;

/// Whether `current` is a change from `previous`.
///
/// - no previous value (or null): always changed
/// - `change` monitors: any difference in JSON serialization
/// - two numbers: relative change above 1% (any move away from 0 counts)
/// - otherwise: JSON serialization differs
pub fn detect_change(current: &Value, previous: Option<&Value>, kind: MonitorKind) -> bool {
    let Some(previous) = previous.filter(|p| !p.is_null()) else {
        return true;
    };

    if kind == MonitorKind::Change {
        return current.to_string() != previous.to_string();
    }

    if let (Some(c), Some(p)) = (numeric_value_of(current), numeric_value_of(previous)) {
        if p == 0.0 {
            return c != 0.0;
        }
        return ((c - p) / p).abs() > NUMERIC_CHANGE_THRESHOLD;
    }

    current.to_string() != previous.to_string()
}
