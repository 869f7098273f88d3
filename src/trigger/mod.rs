//! Trigger condition evaluation and change detection.
//!
//! Both are pure functions. They use different thresholds on purpose:
//! a trigger compares against the condition's own number, change detection
//! uses a fixed 1% relative band.

pub mod heuristics;
pub mod evaluator;
pub mod change;

pub use heuristics::*;
pub use evaluator::*;
pub use change::*;
