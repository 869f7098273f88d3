pub mod types;
pub mod fetcher;
pub mod notifier;
pub mod store;
pub mod selection;
pub mod orchestrator;

pub use types::*;
pub use fetcher::*;
pub use notifier::*;
pub use store::*;
pub use selection::*;
pub use orchestrator::*;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db::DatabaseError;
use crate::pipeline::llm::LlmError;

/// Failure classes reported on an [`EvaluationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationErrorKind {
    /// Monitor id does not exist. Terminal.
    NotFound,
    /// Monitor is disabled. Terminal.
    Inactive,
    /// Fetch, model or notification collaborator failed or timed out.
    Collaborator,
    /// Database read or write failed; the monitor row is left as it was.
    Persistence,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Monitor not found: {0}")]
    NotFound(String),

    #[error("Monitor is inactive: {0}")]
    Inactive(String),

    #[error("Fetch returned no content for {0}")]
    FetchFailed(String),

    #[error("Fetch timed out after {0:?}")]
    FetchTimeout(Duration),

    #[error("HTTP client error: {0}")]
    FetchClient(String),

    #[error("Notification failed: {0}")]
    Notify(String),

    #[error("Language model error: {0}")]
    Llm(#[from] LlmError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl EngineError {
    pub fn kind(&self) -> EvaluationErrorKind {
        match self {
            Self::NotFound(_) => EvaluationErrorKind::NotFound,
            Self::Inactive(_) => EvaluationErrorKind::Inactive,
            Self::FetchFailed(_)
            | Self::FetchTimeout(_)
            | Self::FetchClient(_)
            | Self::Notify(_)
            | Self::Llm(_) => EvaluationErrorKind::Collaborator,
            Self::Database(_) => EvaluationErrorKind::Persistence,
        }
    }

    /// Whether a later evaluation of the same monitor may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl EvaluationErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Collaborator | Self::Persistence)
    }
}
