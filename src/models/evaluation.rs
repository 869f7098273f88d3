use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::enums::EvaluationPhase;

/// One append-only row of the evaluation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationLogEntry {
    pub id: String,
    pub monitor_id: String,
    pub phase: EvaluationPhase,
    /// Final engine state for completed/failed entries.
    pub state: Option<String>,
    pub value: Option<Value>,
    pub changed: Option<bool>,
    pub triggered: Option<bool>,
    pub error: Option<String>,
    pub duration_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl EvaluationLogEntry {
    pub fn started(monitor_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            monitor_id: monitor_id.to_string(),
            phase: EvaluationPhase::Started,
            state: None,
            value: None,
            changed: None,
            triggered: None,
            error: None,
            duration_ms: None,
            created_at: Utc::now(),
        }
    }
}

/// One append-only row of the fact history, written with the monitor update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactHistoryEntry {
    pub id: String,
    pub monitor_id: String,
    pub value: Value,
    pub confidence: Option<f64>,
    pub source_url: Option<String>,
    pub changed: bool,
    pub triggered: bool,
    pub recorded_at: DateTime<Utc>,
}
