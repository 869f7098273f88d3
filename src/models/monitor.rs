use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::enums::{FactType, MonitorKind};

/// A user-defined condition that is re-checked on a schedule.
///
/// Only the evaluation engine mutates `current_value`, `previous_value`
/// and the counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: String,
    pub user_id: String,
    /// Natural-language request, e.g. "alert me when https://... drops below $200".
    pub prompt: String,
    /// What the extracted value describes ("TSLA share price").
    pub target_fact: String,
    pub trigger_condition: String,
    pub fact_type: FactType,
    pub monitor_kind: MonitorKind,
    pub is_active: bool,
    pub current_value: Option<Value>,
    pub previous_value: Option<Value>,
    pub evaluation_count: u32,
    pub trigger_count: u32,
    pub check_frequency_minutes: u32,
    pub last_evaluated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields supplied when a monitor is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMonitor {
    pub user_id: String,
    pub prompt: String,
    pub target_fact: String,
    pub trigger_condition: String,
    pub fact_type: FactType,
    pub monitor_kind: MonitorKind,
    pub check_frequency_minutes: u32,
}

impl NewMonitor {
    pub fn into_monitor(self, now: DateTime<Utc>) -> Monitor {
        Monitor {
            id: Uuid::new_v4().to_string(),
            user_id: self.user_id,
            prompt: self.prompt,
            target_fact: self.target_fact,
            trigger_condition: self.trigger_condition,
            fact_type: self.fact_type,
            monitor_kind: self.monitor_kind,
            is_active: true,
            current_value: None,
            previous_value: None,
            evaluation_count: 0,
            trigger_count: 0,
            check_frequency_minutes: self.check_frequency_minutes,
            last_evaluated_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The mutation written after a successful evaluation.
///
/// The stored current value moves to `previous_value` inside the write
/// itself; a row with no current value keeps its previous value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorUpdate {
    pub current_value: Value,
    pub triggered: bool,
    pub evaluated_at: DateTime<Utc>,
    /// `evaluation_count` of the row this update was computed against.
    /// Any other count means a concurrent evaluation landed first.
    pub expected_evaluation_count: u32,
}
