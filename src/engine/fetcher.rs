//! Content fetching collaborator.
//!
//! A fetcher returns `None` on any failure; the engine turns that into a
//! collaborator error. `HttpFetcher` owns its client explicitly: `init`
//! and `shutdown` are idempotent and `fetch` initializes lazily.

use std::sync::Mutex;

use async_trait::async_trait;

use super::types::FetchOptions;
use super::EngineError;
use crate::config::{APP_NAME, APP_VERSION};

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Option<String>;
}

// ═══════════════════════════════════════════════════════════
// HttpFetcher
// ═══════════════════════════════════════════════════════════

/// Plain HTTP GET fetcher. Selectors are not applied here; the
/// enhancement pipeline works on the full document.
pub struct HttpFetcher {
    client: Mutex<Option<reqwest::Client>>,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: Mutex::new(None),
        }
    }

    /// Build the HTTP client. Calling it again is a no-op.
    pub fn init(&self) -> Result<(), EngineError> {
        let mut guard = self
            .client
            .lock()
            .map_err(|_| EngineError::FetchClient("fetcher lock poisoned".into()))?;
        if guard.is_some() {
            return Ok(());
        }

        let client = reqwest::Client::builder()
            .user_agent(format!("{APP_NAME}/{APP_VERSION}"))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| EngineError::FetchClient(e.to_string()))?;
        *guard = Some(client);
        tracing::debug!("HTTP fetcher initialized");
        Ok(())
    }

    /// Drop the HTTP client. Safe to call when never initialized.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.client.lock() {
            if guard.take().is_some() {
                tracing::debug!("HTTP fetcher shut down");
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.client.lock().map(|g| g.is_some()).unwrap_or(false)
    }

    fn client(&self) -> Result<reqwest::Client, EngineError> {
        self.init()?;
        self.client
            .lock()
            .map_err(|_| EngineError::FetchClient("fetcher lock poisoned".into()))?
            .clone()
            .ok_or_else(|| EngineError::FetchClient("fetcher shut down during init".into()))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> Option<String> {
        let client = match self.client() {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(error = %e, "HTTP fetcher unavailable");
                return None;
            }
        };

        if let Some(selector) = &options.selector {
            tracing::debug!(selector, "Selector ignored by HTTP fetcher");
        }

        let response = match client.get(url).timeout(options.timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(url, error = %e, "Fetch request failed");
                return None;
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url, status = status.as_u16(), "Fetch returned non-success status");
            return None;
        }

        match response.text().await {
            Ok(body) => {
                tracing::debug!(url, bytes = body.len(), "Fetched content");
                Some(body)
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "Failed to read response body");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn options() -> FetchOptions {
        FetchOptions {
            selector: None,
            timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn init_is_idempotent() {
        let fetcher = HttpFetcher::new();
        assert!(!fetcher.is_initialized());
        fetcher.init().unwrap();
        fetcher.init().unwrap();
        assert!(fetcher.is_initialized());
    }

    #[test]
    fn shutdown_without_init_is_noop() {
        let fetcher = HttpFetcher::new();
        fetcher.shutdown();
        fetcher.shutdown();
        assert!(!fetcher.is_initialized());
    }

    #[test]
    fn shutdown_clears_client() {
        let fetcher = HttpFetcher::new();
        fetcher.init().unwrap();
        fetcher.shutdown();
        assert!(!fetcher.is_initialized());
    }

    #[tokio::test]
    async fn invalid_url_returns_none() {
        let fetcher = HttpFetcher::new();
        assert!(fetcher.fetch("not a url", &options()).await.is_none());
        // Lazily initialized by the first fetch
        assert!(fetcher.is_initialized());
    }

    #[tokio::test]
    async fn unreachable_host_returns_none() {
        let fetcher = HttpFetcher::new();
        let body = fetcher.fetch("http://127.0.0.1:9/", &options()).await;
        assert!(body.is_none());
    }
}
