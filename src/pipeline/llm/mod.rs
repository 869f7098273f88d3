//! Language-model collaborator: trait, Ollama client, cache and output cleanup.

pub mod cache;
pub mod mock;
pub mod ollama;
pub mod sanitize;

pub use cache::CachedLanguageModel;
pub use mock::MockLanguageModel;
pub use ollama::OllamaClient;
pub use sanitize::sanitize_llm_output;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("Language model is not reachable at {0}")]
    Connection(String),

    #[error("Language model returned error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("Language model call timed out after {0:?}")]
    Timeout(Duration),
}

/// Per-call generation options.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateOptions {
    pub system: Option<String>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            system: None,
            temperature: 0.1,
            max_tokens: None,
        }
    }
}

impl GenerateOptions {
    pub fn with_system(system: &str) -> Self {
        Self {
            system: Some(system.to_string()),
            ..Self::default()
        }
    }
}

/// The external model. Implementations return raw text; callers own all parsing.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, LlmError>;
}

/// Call `model.generate` bounded by `timeout`; elapsing is a normal `LlmError::Timeout`.
pub async fn generate_with_timeout(
    model: &dyn LanguageModel,
    prompt: &str,
    options: &GenerateOptions,
    timeout: Duration,
) -> Result<String, LlmError> {
    match tokio::time::timeout(timeout, model.generate(prompt, options)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_model_is_object_safe() {
        fn _assert(_: &dyn LanguageModel) {}
    }

    #[tokio::test]
    async fn timeout_maps_to_llm_error() {
        let slow = MockLanguageModel::new("late").with_delay(Duration::from_millis(200));
        let result = generate_with_timeout(
            &slow,
            "prompt",
            &GenerateOptions::default(),
            Duration::from_millis(20),
        )
        .await;
        assert!(matches!(result, Err(LlmError::Timeout(_))));
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let model = MockLanguageModel::new("ok");
        let result =
            generate_with_timeout(&model, "p", &GenerateOptions::default(), Duration::from_secs(1))
                .await
                .unwrap();
        assert_eq!(result, "ok");
    }
}
