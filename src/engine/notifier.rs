use async_trait::async_trait;
use serde_json::Value;

use super::EngineError;

/// Delivers trigger notifications. Failures never fail an evaluation.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        monitor_id: &str,
        current: &Value,
        previous: Option<&Value>,
    ) -> Result<(), EngineError>;
}

/// Writes triggers to the tracing log. Default when no delivery channel is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        monitor_id: &str,
        current: &Value,
        previous: Option<&Value>,
    ) -> Result<(), EngineError> {
        let previous = previous.map_or_else(|| "none".to_string(), Value::to_string);
        tracing::info!(monitor_id, current = %current, previous = %previous, "Monitor triggered");
        Ok(())
    }
}
