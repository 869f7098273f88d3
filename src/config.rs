use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Application-level constants
pub const APP_NAME: &str = "Watchpost";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum concurrent items in an enhancement batch.
pub const ENHANCEMENT_BATCH_CONCURRENCY: usize = 5;

/// Maximum concurrent items in a fact-extraction batch.
pub const FACT_BATCH_CONCURRENCY: usize = 10;

/// Default filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> String {
    "info,watchpost=debug".to_string()
}

/// Get the application data directory (~/Watchpost/).
/// Falls back to the working directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default SQLite database location.
pub fn default_database_path() -> PathBuf {
    app_data_dir().join("watchpost.db")
}

/// Runtime configuration for the evaluation engine and its collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Base URL of the Ollama instance used for fact extraction and summaries.
    pub ollama_url: String,
    /// Model name passed to Ollama.
    pub model_name: String,
    pub llm_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub notify_timeout_secs: u64,
    /// Per-item timeout inside a fact-extraction batch.
    pub fact_batch_timeout_secs: u64,
    /// Per-item timeout inside an enhancement batch.
    pub enhancement_batch_timeout_secs: u64,
    /// Pause between monitors during `evaluate_all_active`.
    pub inter_evaluation_delay_ms: u64,
    /// Facts scoring below this quality are dropped from results.
    pub quality_threshold: f64,
    /// TTL of the LLM response cache. 0 disables caching.
    pub cache_ttl_secs: u64,
    pub database_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            model_name: "llama3.1".to_string(),
            llm_timeout_secs: 30,
            fetch_timeout_secs: 30,
            notify_timeout_secs: 10,
            fact_batch_timeout_secs: 10,
            enhancement_batch_timeout_secs: 45,
            inter_evaluation_delay_ms: 1000,
            quality_threshold: 0.7,
            cache_ttl_secs: 300,
            database_path: default_database_path(),
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `WATCHPOST_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (testable without touching the process env).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("WATCHPOST_OLLAMA_URL") {
            config.ollama_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("WATCHPOST_MODEL") {
            config.model_name = model;
        }
        if let Some(path) = lookup("WATCHPOST_DB_PATH") {
            config.database_path = PathBuf::from(path);
        }

        override_parsed(&lookup, "WATCHPOST_LLM_TIMEOUT_SECS", &mut config.llm_timeout_secs);
        override_parsed(&lookup, "WATCHPOST_FETCH_TIMEOUT_SECS", &mut config.fetch_timeout_secs);
        override_parsed(&lookup, "WATCHPOST_NOTIFY_TIMEOUT_SECS", &mut config.notify_timeout_secs);
        override_parsed(
            &lookup,
            "WATCHPOST_FACT_BATCH_TIMEOUT_SECS",
            &mut config.fact_batch_timeout_secs,
        );
        override_parsed(
            &lookup,
            "WATCHPOST_ENHANCEMENT_BATCH_TIMEOUT_SECS",
            &mut config.enhancement_batch_timeout_secs,
        );
        override_parsed(
            &lookup,
            "WATCHPOST_EVALUATION_DELAY_MS",
            &mut config.inter_evaluation_delay_ms,
        );
        override_parsed(&lookup, "WATCHPOST_CACHE_TTL_SECS", &mut config.cache_ttl_secs);

        let mut threshold = config.quality_threshold;
        override_parsed(&lookup, "WATCHPOST_QUALITY_THRESHOLD", &mut threshold);
        config.quality_threshold = threshold.clamp(0.0, 1.0);

        config
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }

    pub fn fact_batch_timeout(&self) -> Duration {
        Duration::from_secs(self.fact_batch_timeout_secs)
    }

    pub fn enhancement_batch_timeout(&self) -> Duration {
        Duration::from_secs(self.enhancement_batch_timeout_secs)
    }

    pub fn inter_evaluation_delay(&self) -> Duration {
        Duration::from_millis(self.inter_evaluation_delay_ms)
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        (self.cache_ttl_secs > 0).then(|| Duration::from_secs(self.cache_ttl_secs))
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => *target = value,
        Err(_) => tracing::warn!(key, value = %raw, "Ignoring unparsable config override"),
    }
}
