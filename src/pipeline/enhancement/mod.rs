pub mod types;
pub mod markup;
pub mod classifier;
pub mod normalizer;
pub mod temporal;
pub mod language;
pub mod quality;
pub mod cross_source;
pub mod orchestrator;

pub use types::*;
pub use markup::*;
pub use classifier::*;
pub use normalizer::*;
pub use temporal::*;
pub use language::*;
pub use quality::*;
pub use cross_source::*;
pub use orchestrator::*;

use thiserror::Error;

/// Failure of a single normalization attempt. Never fatal for the pipeline:
/// the caller drops that attempt and moves on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizationError {
    #[error("No {kind} pattern found in input")]
    NoMatch { kind: NormalizationKind },

    #[error("Invalid number: {0}")]
    InvalidNumber(String),
}
