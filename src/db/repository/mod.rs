//! Repository layer: entity-scoped database operations.

mod evaluation_log;
mod monitor;

pub use evaluation_log::*;
pub use monitor::*;

use chrono::{DateTime, Utc};

use super::DatabaseError;

pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::ConstraintViolation(format!("Bad timestamp '{raw}': {e}")))
}

pub(crate) fn value_to_column(
    value: Option<&serde_json::Value>,
) -> Result<Option<String>, DatabaseError> {
    value.map(serde_json::to_string).transpose().map_err(Into::into)
}

pub(crate) fn column_to_value(
    raw: Option<String>,
) -> Result<Option<serde_json::Value>, DatabaseError> {
    raw.map(|s| serde_json::from_str(&s)).transpose().map_err(Into::into)
}
