//! Watchpost: natural-language monitors evaluated against live content.
//!
//! [`engine::MonitorEvaluationEngine`] fetches a monitor's source, runs the
//! [`pipeline::enhancement`] stages over it, reduces the result to one value
//! and checks it with [`trigger`]. Everything it learns is persisted through
//! [`db`].

pub mod config;
pub mod db;
pub mod engine;
pub mod models;
pub mod pipeline;
pub mod trigger;

use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber. `RUST_LOG` wins over
/// [`config::default_log_filter`]. Later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter()));

    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok() {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}
