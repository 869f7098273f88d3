//! TTL cache in front of a language model.
//!
//! The cache is never the system of record: a miss, an expired entry or a
//! poisoned lock all fall through to the wrapped model, and errors are not cached.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{GenerateOptions, LanguageModel, LlmError};

/// Entries beyond this count trigger an expiry sweep on insert.
const SWEEP_THRESHOLD: usize = 256;
/// Hard cap; the oldest entry is evicted once the sweep frees nothing.
const DEFAULT_MAX_ENTRIES: usize = 1024;

pub struct CachedLanguageModel<M> {
    inner: M,
    ttl: Duration,
    max_entries: usize,
    entries: Mutex<HashMap<String, (Instant, String)>>,
}

impl<M: LanguageModel> CachedLanguageModel<M> {
    pub fn new(inner: M, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            max_entries: DEFAULT_MAX_ENTRIES,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.max(1);
        self
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn inner(&self) -> &M {
        &self.inner
    }

    fn lookup(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().ok()?;
        entries
            .get(key)
            .filter(|(stored_at, _)| stored_at.elapsed() < self.ttl)
            .map(|(_, response)| response.clone())
    }

    fn store(&self, key: String, response: &str) {
        let Ok(mut entries) = self.entries.lock() else {
            return;
        };
        if entries.len() >= SWEEP_THRESHOLD.min(self.max_entries) {
            let ttl = self.ttl;
            entries.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
        }
        while entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let oldest = entries
                .iter()
                .min_by_key(|(_, (stored_at, _))| *stored_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => entries.remove(&k),
                None => break,
            };
        }
        entries.insert(key, (Instant::now(), response.to_string()));
    }
}

fn cache_key(prompt: &str, options: &GenerateOptions) -> String {
    let mut hasher = Sha256::new();
    hasher.update(options.system.as_deref().unwrap_or("").as_bytes());
    hasher.update([0u8]);
    hasher.update(options.temperature.to_le_bytes());
    match options.max_tokens {
        Some(n) => {
            hasher.update([1u8]);
            hasher.update(n.to_le_bytes());
        }
        None => hasher.update([0u8]),
    }
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl<M: LanguageModel> LanguageModel for CachedLanguageModel<M> {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String, LlmError> {
        let key = cache_key(prompt, options);
        if let Some(hit) = self.lookup(&key) {
            tracing::debug!(key = %&key[..12], "LLM response cache hit");
            return Ok(hit);
        }

        let response = self.inner.generate(prompt, options).await?;
        self.store(key, &response);
        Ok(response)
    }
}
