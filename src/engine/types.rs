use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::EvaluationErrorKind;

/// Steps of one evaluation, in order. `Failed` is reachable from any step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationState {
    Fetching,
    Enhancing,
    Evaluating,
    Persisting,
    Notifying,
    Done,
    Failed,
}

impl EvaluationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Enhancing => "enhancing",
            Self::Evaluating => "evaluating",
            Self::Persisting => "persisting",
            Self::Notifying => "notifying",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for EvaluationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchOptions {
    pub selector: Option<String>,
    pub timeout: Duration,
}

/// Outcome of one `evaluate` call. Produced exactly once per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub monitor_id: String,
    pub success: bool,
    pub value: Option<Value>,
    /// Stored value the new one was compared against.
    pub previous_value: Option<Value>,
    pub changed: bool,
    pub triggered: bool,
    pub confidence: Option<f64>,
    pub source_url: Option<String>,
    /// The value came from the synthetic source (no URL in the prompt).
    pub synthetic: bool,
    pub processing_time_ms: u64,
    pub error: Option<String>,
    pub error_kind: Option<EvaluationErrorKind>,
    /// `Done` on success; on failure, the step that failed.
    pub final_state: EvaluationState,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkEvaluationSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub triggered: usize,
    pub results: Vec<EvaluationResult>,
    /// Set when the active monitor list itself could not be loaded.
    pub error: Option<String>,
}
