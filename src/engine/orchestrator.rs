//! Monitor evaluation engine.
//!
//! One `evaluate` call walks a monitor through
//! fetch → enhance → evaluate → persist → notify and always produces an
//! [`EvaluationResult`]. Evaluations of the same monitor are serialized by
//! a per-monitor async lock; different monitors run independently.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use super::fetcher::{Fetcher, HttpFetcher};
use super::notifier::{LogNotifier, Notifier};
use super::selection::{extract_url, select_value, synthetic_content, synthetic_value};
use super::store::{MonitorStore, SqliteMonitorStore};
use super::types::{BulkEvaluationSummary, EvaluationResult, EvaluationState, FetchOptions};
use super::EngineError;
use crate::config::EngineConfig;
use crate::db::DatabaseError;
use crate::models::{EvaluationLogEntry, EvaluationPhase, FactHistoryEntry, Monitor, MonitorUpdate};
use crate::pipeline::enhancement::{ContentEnhancementPipeline, EnhancementInput, EnhancementOptions};
use crate::pipeline::facts::{ExtractedFact, FactKind};
use crate::pipeline::llm::{CachedLanguageModel, LanguageModel, OllamaClient};
use crate::trigger::{detect_change, evaluate_trigger};

/// Conditional monitor writes retried after a concurrent update.
const MAX_WRITE_ATTEMPTS: u32 = 3;

/// Collaborator timeouts and pacing, resolved from [`EngineConfig`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineTimings {
    pub fetch_timeout: Duration,
    pub notify_timeout: Duration,
    pub inter_evaluation_delay: Duration,
    pub quality_threshold: f64,
}

impl From<&EngineConfig> for EngineTimings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            fetch_timeout: config.fetch_timeout(),
            notify_timeout: config.notify_timeout(),
            inter_evaluation_delay: config.inter_evaluation_delay(),
            quality_threshold: config.quality_threshold,
        }
    }
}

/// What a successful run produced.
struct Outcome {
    value: Value,
    previous_value: Option<Value>,
    changed: bool,
    triggered: bool,
    confidence: Option<f64>,
    source_url: Option<String>,
    synthetic: bool,
}

pub struct MonitorEvaluationEngine {
    store: Arc<dyn MonitorStore>,
    fetcher: Arc<dyn Fetcher>,
    notifier: Arc<dyn Notifier>,
    pipeline: ContentEnhancementPipeline,
    timings: EngineTimings,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl MonitorEvaluationEngine {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        fetcher: Arc<dyn Fetcher>,
        notifier: Arc<dyn Notifier>,
        pipeline: ContentEnhancementPipeline,
        timings: EngineTimings,
    ) -> Self {
        Self {
            store,
            fetcher,
            notifier,
            pipeline,
            timings,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Production wiring: SQLite at `config.database_path`, HTTP fetcher,
    /// log notifier and Ollama (cached when `cache_ttl_secs > 0`).
    pub fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        let store = SqliteMonitorStore::open(&config.database_path)?;
        let ollama = OllamaClient::from_config(config)?;
        let llm: Arc<dyn LanguageModel> = match config.cache_ttl() {
            Some(ttl) => Arc::new(CachedLanguageModel::new(ollama, ttl)),
            None => Arc::new(ollama),
        };

        tracing::info!(
            db = %config.database_path.display(),
            model = %config.model_name,
            "Evaluation engine configured"
        );

        Ok(Self::new(
            Arc::new(store),
            Arc::new(HttpFetcher::new()),
            Arc::new(LogNotifier),
            ContentEnhancementPipeline::from_config(llm, config),
            EngineTimings::from(config),
        ))
    }

    pub fn timings(&self) -> EngineTimings {
        self.timings
    }

    // ═══════════════════════════════════════════════════════════
    // Evaluation
    // ═══════════════════════════════════════════════════════════

    /// Evaluate one monitor. Never returns an error: failures are reported
    /// in the result with their [`EvaluationErrorKind`](super::EvaluationErrorKind).
    pub async fn evaluate(&self, monitor_id: &str) -> EvaluationResult {
        let span = tracing::info_span!("evaluate_monitor", monitor_id);
        self.evaluate_locked(monitor_id).instrument(span).await
    }

    async fn evaluate_locked(&self, monitor_id: &str) -> EvaluationResult {
        let lock = self.monitor_lock(monitor_id);
        let result = {
            let _guard = lock.lock().await;
            self.evaluate_inner(monitor_id).await
        };
        self.release_lock(monitor_id, &lock);
        result
    }

    async fn evaluate_inner(&self, monitor_id: &str) -> EvaluationResult {
        let start = Instant::now();
        let mut state = EvaluationState::Fetching;

        match self.run(monitor_id, &mut state, start).await {
            Ok(outcome) => {
                let processing_time_ms = elapsed_ms(start);
                tracing::info!(
                    changed = outcome.changed,
                    triggered = outcome.triggered,
                    synthetic = outcome.synthetic,
                    duration_ms = processing_time_ms,
                    "Evaluation complete"
                );
                EvaluationResult {
                    monitor_id: monitor_id.to_string(),
                    success: true,
                    value: Some(outcome.value),
                    previous_value: outcome.previous_value,
                    changed: outcome.changed,
                    triggered: outcome.triggered,
                    confidence: outcome.confidence,
                    source_url: outcome.source_url,
                    synthetic: outcome.synthetic,
                    processing_time_ms,
                    error: None,
                    error_kind: None,
                    final_state: EvaluationState::Done,
                }
            }
            Err(e) => {
                let processing_time_ms = elapsed_ms(start);
                tracing::warn!(
                    state = %state,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Evaluation failed"
                );

                let entry = EvaluationLogEntry {
                    phase: EvaluationPhase::Failed,
                    state: Some(state.to_string()),
                    error: Some(e.to_string()),
                    duration_ms: Some(processing_time_ms),
                    ..EvaluationLogEntry::started(monitor_id)
                };
                if let Err(log_err) = self.store.insert_evaluation_log(&entry).await {
                    tracing::warn!(error = %log_err, "Could not record failed evaluation");
                }

                EvaluationResult {
                    monitor_id: monitor_id.to_string(),
                    success: false,
                    value: None,
                    previous_value: None,
                    changed: false,
                    triggered: false,
                    confidence: None,
                    source_url: None,
                    synthetic: false,
                    processing_time_ms,
                    error: Some(e.to_string()),
                    error_kind: Some(e.kind()),
                    final_state: EvaluationState::Failed,
                }
            }
        }
    }

    async fn run(
        &self,
        monitor_id: &str,
        state: &mut EvaluationState,
        start: Instant,
    ) -> Result<Outcome, EngineError> {
        let mut monitor = self.load_active(monitor_id).await?;

        self.store
            .insert_evaluation_log(&EvaluationLogEntry::started(monitor_id))
            .await?;

        // 1. Fetch
        let source_url = extract_url(&monitor.prompt);
        let (value, confidence, synthetic) = match &source_url {
            Some(url) => {
                let content = self.fetch(url).await?;

                // 2. Enhance
                transition(state, EvaluationState::Enhancing);
                let facts = self.enhance(&monitor, url, &content).await;

                let (value, confidence) = select_value(&facts, &content, monitor.fact_type);
                (value, confidence, false)
            }
            None => {
                tracing::debug!(
                    content = %synthetic_content(&monitor.target_fact, monitor.fact_type),
                    "No URL in prompt, using synthetic value"
                );
                (synthetic_value(monitor.fact_type), None, true)
            }
        };

        // 3-4. Evaluate against the stored current value and persist. The
        // write is conditional on the row not having moved since it was read;
        // on conflict the row is re-read and the comparison redone.
        let mut attempt = 1;
        let (changed, triggered) = loop {
            transition(state, EvaluationState::Evaluating);
            let stored = monitor.current_value.as_ref();
            let changed = detect_change(&value, stored, monitor.monitor_kind);
            let triggered = evaluate_trigger(&monitor.trigger_condition, &value, stored, monitor.fact_type);

            transition(state, EvaluationState::Persisting);
            let now = Utc::now();
            let update = MonitorUpdate {
                current_value: value.clone(),
                triggered,
                evaluated_at: now,
                expected_evaluation_count: monitor.evaluation_count,
            };
            let history = FactHistoryEntry {
                id: Uuid::new_v4().to_string(),
                monitor_id: monitor.id.clone(),
                value: value.clone(),
                confidence,
                source_url: source_url.clone(),
                changed,
                triggered,
                recorded_at: now,
            };

            match self.store.record_evaluation(&monitor.id, &update, &history).await {
                Ok(()) => break (changed, triggered),
                Err(DatabaseError::Conflict { .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                    tracing::debug!(attempt, "Monitor row moved during evaluation, re-reading");
                    attempt += 1;
                    monitor = self.load_active(monitor_id).await?;
                }
                Err(e) => return Err(e.into()),
            }
        };
        let previous_value = monitor.current_value;

        // 5. Notify
        if triggered {
            transition(state, EvaluationState::Notifying);
            self.notify(monitor_id, &value, previous_value.as_ref()).await;
        }

        transition(state, EvaluationState::Done);
        let completed = EvaluationLogEntry {
            phase: EvaluationPhase::Completed,
            state: Some(state.to_string()),
            value: Some(value.clone()),
            changed: Some(changed),
            triggered: Some(triggered),
            duration_ms: Some(elapsed_ms(start)),
            ..EvaluationLogEntry::started(monitor_id)
        };
        if let Err(e) = self.store.insert_evaluation_log(&completed).await {
            // The monitor row is already committed; the evaluation stands.
            tracing::warn!(error = %e, "Could not record completed evaluation");
        }

        Ok(Outcome {
            value,
            previous_value,
            changed,
            triggered,
            confidence,
            source_url,
            synthetic,
        })
    }

    async fn load_active(&self, monitor_id: &str) -> Result<Monitor, EngineError> {
        let monitor = self
            .store
            .get_monitor(monitor_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(monitor_id.to_string()))?;
        if !monitor.is_active {
            return Err(EngineError::Inactive(monitor_id.to_string()));
        }
        Ok(monitor)
    }

    async fn fetch(&self, url: &str) -> Result<String, EngineError> {
        let options = FetchOptions {
            selector: None,
            timeout: self.timings.fetch_timeout,
        };
        match tokio::time::timeout(self.timings.fetch_timeout, self.fetcher.fetch(url, &options)).await {
            Ok(Some(content)) => Ok(content),
            Ok(None) => Err(EngineError::FetchFailed(url.to_string())),
            Err(_) => Err(EngineError::FetchTimeout(self.timings.fetch_timeout)),
        }
    }

    async fn enhance(&self, monitor: &Monitor, url: &str, content: &str) -> Vec<ExtractedFact> {
        let input = EnhancementInput::new(content)
            .with_source(url)
            .with_expected(vec![FactKind::for_fact_type(monitor.fact_type)]);
        let options = EnhancementOptions {
            quality_threshold: self.timings.quality_threshold,
            ..EnhancementOptions::default()
        };

        let result = self.pipeline.enhance(&input, &options).await;
        for warning in &result.warnings {
            tracing::debug!(warning, "Enhancement warning");
        }
        result.extracted_facts
    }

    async fn notify(&self, monitor_id: &str, current: &Value, previous: Option<&Value>) {
        let outcome = tokio::time::timeout(
            self.timings.notify_timeout,
            self.notifier.notify(monitor_id, current, previous),
        )
        .await;
        match outcome {
            Ok(Ok(())) => tracing::debug!("Trigger notification delivered"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Trigger notification failed"),
            Err(_) => tracing::warn!(
                timeout_ms = self.timings.notify_timeout.as_millis() as u64,
                "Trigger notification timed out"
            ),
        }
    }

    /// Evaluate every active monitor one at a time, pausing
    /// `inter_evaluation_delay` between them.
    pub async fn evaluate_all_active(&self) -> BulkEvaluationSummary {
        let monitors = match self.store.list_active_monitors().await {
            Ok(monitors) => monitors,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load active monitors");
                return BulkEvaluationSummary {
                    error: Some(e.to_string()),
                    ..BulkEvaluationSummary::default()
                };
            }
        };

        tracing::info!(count = monitors.len(), "Evaluating active monitors");
        let mut summary = BulkEvaluationSummary {
            total: monitors.len(),
            ..BulkEvaluationSummary::default()
        };

        for (i, monitor) in monitors.iter().enumerate() {
            if i > 0 && !self.timings.inter_evaluation_delay.is_zero() {
                tokio::time::sleep(self.timings.inter_evaluation_delay).await;
            }
            let result = self.evaluate(&monitor.id).await;
            if result.success {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            if result.triggered {
                summary.triggered += 1;
            }
            summary.results.push(result);
        }

        tracing::info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            triggered = summary.triggered,
            "Bulk evaluation complete"
        );
        summary
    }

    // ═══════════════════════════════════════════════════════════
    // Per-monitor locks
    // ═══════════════════════════════════════════════════════════

    fn monitor_lock(&self, monitor_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        match self.locks.lock() {
            Ok(mut locks) => Arc::clone(locks.entry(monitor_id.to_string()).or_default()),
            // Degrades to an unshared lock; evaluations still complete.
            Err(_) => {
                tracing::error!("Monitor lock table poisoned");
                Arc::new(tokio::sync::Mutex::new(()))
            }
        }
    }

    /// Drop the table entry once no other evaluation holds or waits on it.
    fn release_lock(&self, monitor_id: &str, lock: &Arc<tokio::sync::Mutex<()>>) {
        if let Ok(mut locks) = self.locks.lock() {
            let idle = locks
                .get(monitor_id)
                .is_some_and(|entry| Arc::ptr_eq(entry, lock) && Arc::strong_count(entry) <= 2);
            if idle {
                locks.remove(monitor_id);
            }
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().map(|l| l.len()).unwrap_or(0)
    }
}

fn transition(state: &mut EvaluationState, next: EvaluationState) {
    tracing::debug!(from = %state, to = %next, "Evaluation state");
    *state = next;
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EvaluationErrorKind;
    use crate::models::{FactType, MonitorKind, NewMonitor};
    use crate::pipeline::llm::MockLanguageModel;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TSLA_PAGE: &str = "<p>Tesla closing price: $215.00 as of today</p>";
    const TSLA_FACTS: &str = r#"[{"type":"number","value":215,"confidence":0.95,"unit":"USD"}]"#;

    // ── Test collaborators ──────────────────────────────────

    /// Returns queued responses in order, repeating the last one.
    struct ScriptedFetcher {
        responses: Vec<Option<String>>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(responses: &[Option<&str>]) -> Self {
            Self {
                responses: responses.iter().map(|r| r.map(str::to_string)).collect(),
                delay: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn returning(body: &str) -> Self {
            Self::new(&[Some(body)])
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, _url: &str, _options: &FetchOptions) -> Option<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let idx = n.min(self.responses.len().saturating_sub(1));
            self.responses.get(idx).cloned().flatten()
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        fail: bool,
        calls: Mutex<Vec<(String, Value, Option<Value>)>>,
    }

    impl RecordingNotifier {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<(String, Value, Option<Value>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, monitor_id: &str, current: &Value, previous: Option<&Value>) -> Result<(), EngineError> {
            self.calls
                .lock()
                .unwrap()
                .push((monitor_id.to_string(), current.clone(), previous.cloned()));
            if self.fail {
                Err(EngineError::Notify("webhook returned 500".into()))
            } else {
                Ok(())
            }
        }
    }

    /// Store whose writes of monitor updates always fail.
    struct FailingWriteStore(SqliteMonitorStore);

    #[async_trait]
    impl MonitorStore for FailingWriteStore {
        async fn get_monitor(&self, id: &str) -> Result<Option<Monitor>, DatabaseError> {
            self.0.get_monitor(id).await
        }
        async fn list_active_monitors(&self) -> Result<Vec<Monitor>, DatabaseError> {
            self.0.list_active_monitors().await
        }
        async fn record_evaluation(&self, _: &str, _: &MonitorUpdate, _: &FactHistoryEntry) -> Result<(), DatabaseError> {
            Err(DatabaseError::ConstraintViolation("disk full".into()))
        }
        async fn insert_evaluation_log(&self, entry: &EvaluationLogEntry) -> Result<(), DatabaseError> {
            self.0.insert_evaluation_log(entry).await
        }
    }

    // ── Helpers ─────────────────────────────────────────────

    fn timings() -> EngineTimings {
        EngineTimings {
            fetch_timeout: Duration::from_secs(2),
            notify_timeout: Duration::from_secs(1),
            inter_evaluation_delay: Duration::ZERO,
            quality_threshold: 0.7,
        }
    }

    fn monitor(prompt: &str, condition: &str, fact_type: FactType, current: Option<Value>) -> Monitor {
        let mut monitor = NewMonitor {
            user_id: "user-1".into(),
            prompt: prompt.into(),
            target_fact: "TSLA share price".into(),
            trigger_condition: condition.into(),
            fact_type,
            monitor_kind: MonitorKind::State,
            check_frequency_minutes: 60,
        }
        .into_monitor(Utc::now());
        monitor.current_value = current;
        monitor
    }

    fn tsla_monitor() -> Monitor {
        monitor(
            "Alert me when https://example.com/tsla is above 200",
            "above 200",
            FactType::Number,
            Some(json!(195)),
        )
    }

    struct Harness {
        engine: MonitorEvaluationEngine,
        store: Arc<SqliteMonitorStore>,
        fetcher: Arc<ScriptedFetcher>,
        notifier: Arc<RecordingNotifier>,
    }

    fn harness(fetcher: ScriptedFetcher, notifier: RecordingNotifier, llm_response: &str) -> Harness {
        let store = Arc::new(SqliteMonitorStore::open_in_memory().unwrap());
        let fetcher = Arc::new(fetcher);
        let notifier = Arc::new(notifier);
        let llm: Arc<dyn LanguageModel> = Arc::new(MockLanguageModel::new(llm_response));
        let engine = MonitorEvaluationEngine::new(
            store.clone(),
            fetcher.clone(),
            notifier.clone(),
            ContentEnhancementPipeline::new(llm, Duration::from_secs(2)),
            timings(),
        );
        Harness {
            engine,
            store,
            fetcher,
            notifier,
        }
    }

    fn as_f64(value: &Option<Value>) -> Option<f64> {
        value.as_ref().and_then(Value::as_f64)
    }

    // ── Scenarios ───────────────────────────────────────────

    #[tokio::test]
    async fn price_above_threshold_triggers_and_persists() {
        let h = harness(ScriptedFetcher::returning(TSLA_PAGE), RecordingNotifier::default(), TSLA_FACTS);
        let m = tsla_monitor();
        h.store.insert_monitor(&m).unwrap();

        let result = h.engine.evaluate(&m.id).await;

        assert!(result.success, "error: {:?}", result.error);
        assert_eq!(result.final_state, EvaluationState::Done);
        assert_eq!(as_f64(&result.value), Some(215.0));
        assert_eq!(as_f64(&result.previous_value), Some(195.0));
        assert!(result.changed);
        assert!(result.triggered);
        assert!(!result.synthetic);
        assert_eq!(result.source_url.as_deref(), Some("https://example.com/tsla"));

        let stored = h.store.get_monitor(&m.id).await.unwrap().unwrap();
        assert_eq!(as_f64(&stored.current_value), Some(215.0));
        assert_eq!(as_f64(&stored.previous_value), Some(195.0));
        assert_eq!(stored.evaluation_count, 1);
        assert_eq!(stored.trigger_count, 1);
        assert!(stored.last_evaluated_at.is_some());

        let notified = h.notifier.calls();
        assert_eq!(notified.len(), 1);
        assert_eq!(notified[0].0, m.id);
        assert_eq!(notified[0].1.as_f64(), Some(215.0));
        assert_eq!(notified[0].2.as_ref().and_then(Value::as_f64), Some(195.0));

        let log = h.store.evaluation_log(&m.id).unwrap();
        let phases: Vec<_> = log.iter().map(|e| e.phase).collect();
        assert_eq!(phases, vec![EvaluationPhase::Started, EvaluationPhase::Completed]);
        assert_eq!(log[1].state.as_deref(), Some("done"));
        assert_eq!(log[1].triggered, Some(true));

        let history = h.store.fact_history(&m.id, 10).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].changed);
    }

    #[tokio::test]
    async fn repeated_value_is_unchanged_but_still_shifts_previous() {
        let h = harness(ScriptedFetcher::returning(TSLA_PAGE), RecordingNotifier::default(), TSLA_FACTS);
        let m = tsla_monitor();
        h.store.insert_monitor(&m).unwrap();

        h.engine.evaluate(&m.id).await;
        let second = h.engine.evaluate(&m.id).await;

        assert!(second.success);
        assert!(!second.changed);
        assert!(second.triggered, "level condition still holds");

        let stored = h.store.get_monitor(&m.id).await.unwrap().unwrap();
        assert_eq!(as_f64(&stored.current_value), Some(215.0));
        assert_eq!(as_f64(&stored.previous_value), Some(215.0));
        assert_eq!(stored.evaluation_count, 2);
        assert_eq!(stored.trigger_count, 2);

        let history = h.store.fact_history(&m.id, 10).unwrap();
        assert_eq!(history.iter().filter(|e| e.changed).count(), 1);
    }

    #[tokio::test]
    async fn missing_monitor_is_terminal_failure() {
        let h = harness(ScriptedFetcher::returning(TSLA_PAGE), RecordingNotifier::default(), TSLA_FACTS);

        let result = h.engine.evaluate("does-not-exist").await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(EvaluationErrorKind::NotFound));
        assert!(!result.error_kind.unwrap().is_retryable());
        assert_eq!(result.final_state, EvaluationState::Failed);
        assert_eq!(h.fetcher.calls(), 0);

        let log = h.store.evaluation_log("does-not-exist").unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].phase, EvaluationPhase::Failed);
    }

    #[tokio::test]
    async fn inactive_monitor_is_not_evaluated() {
        let h = harness(ScriptedFetcher::returning(TSLA_PAGE), RecordingNotifier::default(), TSLA_FACTS);
        let m = tsla_monitor();
        h.store.insert_monitor(&m).unwrap();
        h.store.set_monitor_active(&m.id, false).unwrap();

        let result = h.engine.evaluate(&m.id).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(EvaluationErrorKind::Inactive));
        assert_eq!(h.fetcher.calls(), 0);
        let stored = h.store.get_monitor(&m.id).await.unwrap().unwrap();
        assert_eq!(stored.evaluation_count, 0);
    }

    #[tokio::test]
    async fn failed_fetch_leaves_monitor_untouched() {
        let h = harness(ScriptedFetcher::new(&[None]), RecordingNotifier::default(), TSLA_FACTS);
        let m = tsla_monitor();
        h.store.insert_monitor(&m).unwrap();

        let result = h.engine.evaluate(&m.id).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(EvaluationErrorKind::Collaborator));
        assert!(result.error.unwrap().contains("https://example.com/tsla"));

        let stored = h.store.get_monitor(&m.id).await.unwrap().unwrap();
        assert_eq!(stored.evaluation_count, 0);
        assert_eq!(as_f64(&stored.current_value), Some(195.0));

        let log = h.store.evaluation_log(&m.id).unwrap();
        assert_eq!(log.last().unwrap().phase, EvaluationPhase::Failed);
        assert_eq!(log.last().unwrap().state.as_deref(), Some("fetching"));
    }

    #[tokio::test]
    async fn slow_fetch_times_out() {
        let fetcher = ScriptedFetcher::returning(TSLA_PAGE).with_delay(Duration::from_millis(500));
        let mut h = harness(fetcher, RecordingNotifier::default(), TSLA_FACTS);
        h.engine.timings.fetch_timeout = Duration::from_millis(50);
        let m = tsla_monitor();
        h.store.insert_monitor(&m).unwrap();

        let result = h.engine.evaluate(&m.id).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(EvaluationErrorKind::Collaborator));
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn prompt_without_url_uses_synthetic_value() {
        let h = harness(ScriptedFetcher::returning(TSLA_PAGE), RecordingNotifier::default(), TSLA_FACTS);
        let m = monitor("Tell me when the price rises", "above 50", FactType::Number, None);
        h.store.insert_monitor(&m).unwrap();

        let result = h.engine.evaluate(&m.id).await;

        assert!(result.success);
        assert!(result.synthetic);
        assert_eq!(result.value, Some(json!(100)));
        assert!(result.changed, "first value always counts as a change");
        assert!(result.triggered);
        assert_eq!(h.fetcher.calls(), 0);
        assert!(result.source_url.is_none());
    }

    #[tokio::test]
    async fn notifier_failure_does_not_fail_evaluation() {
        let h = harness(ScriptedFetcher::returning(TSLA_PAGE), RecordingNotifier::failing(), TSLA_FACTS);
        let m = tsla_monitor();
        h.store.insert_monitor(&m).unwrap();

        let result = h.engine.evaluate(&m.id).await;

        assert!(result.success);
        assert!(result.triggered);
        assert_eq!(h.notifier.calls().len(), 1);
        let stored = h.store.get_monitor(&m.id).await.unwrap().unwrap();
        assert_eq!(stored.trigger_count, 1);
    }

    #[tokio::test]
    async fn untriggered_evaluation_skips_notifier() {
        let h = harness(ScriptedFetcher::returning(TSLA_PAGE), RecordingNotifier::default(), TSLA_FACTS);
        let m = monitor(
            "Alert me when https://example.com/tsla is below 200",
            "below 200",
            FactType::Number,
            Some(json!(195)),
        );
        h.store.insert_monitor(&m).unwrap();

        let result = h.engine.evaluate(&m.id).await;

        assert!(result.success);
        assert!(!result.triggered);
        assert!(h.notifier.calls().is_empty());
    }

    #[tokio::test]
    async fn raw_content_used_when_model_finds_nothing() {
        let h = harness(
            ScriptedFetcher::returning("Current queue length: 42"),
            RecordingNotifier::default(),
            "I could not find any facts.",
        );
        let m = monitor("Watch https://example.com/queue", "above 40", FactType::Number, None);
        h.store.insert_monitor(&m).unwrap();

        let result = h.engine.evaluate(&m.id).await;

        assert!(result.success);
        assert_eq!(result.value, Some(json!(42)));
        assert!(result.confidence.is_none());
        assert!(result.triggered);
    }

    #[tokio::test]
    async fn persistence_failure_is_retryable() {
        let inner = SqliteMonitorStore::open_in_memory().unwrap();
        let m = tsla_monitor();
        inner.insert_monitor(&m).unwrap();
        let store = Arc::new(FailingWriteStore(inner));
        let notifier = Arc::new(RecordingNotifier::default());
        let llm: Arc<dyn LanguageModel> = Arc::new(MockLanguageModel::new(TSLA_FACTS));
        let engine = MonitorEvaluationEngine::new(
            store.clone(),
            Arc::new(ScriptedFetcher::returning(TSLA_PAGE)),
            notifier.clone(),
            ContentEnhancementPipeline::new(llm, Duration::from_secs(2)),
            timings(),
        );

        let result = engine.evaluate(&m.id).await;

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(EvaluationErrorKind::Persistence));
        assert!(result.error_kind.unwrap().is_retryable());
        assert!(notifier.calls().is_empty(), "no notification without a committed update");

        let stored = store.0.get_monitor(&m.id).await.unwrap().unwrap();
        assert_eq!(stored.evaluation_count, 0);
        let log = store.0.evaluation_log(&m.id).unwrap();
        assert_eq!(log.last().unwrap().state.as_deref(), Some("persisting"));
    }

    #[tokio::test]
    async fn concurrent_evaluations_of_one_monitor_are_serialized() {
        let fetcher = ScriptedFetcher::new(&[Some("Current value: 210"), Some("Current value: 220")])
            .with_delay(Duration::from_millis(30));
        let h = harness(fetcher, RecordingNotifier::default(), "[]");
        let m = monitor("Watch https://example.com/metric", "above 500", FactType::Number, Some(json!(195)));
        h.store.insert_monitor(&m).unwrap();

        let (a, b) = tokio::join!(h.engine.evaluate(&m.id), h.engine.evaluate(&m.id));

        assert!(a.success && b.success);
        let stored = h.store.get_monitor(&m.id).await.unwrap().unwrap();
        assert_eq!(stored.evaluation_count, 2);
        assert_eq!(as_f64(&stored.current_value), Some(220.0));
        // The second evaluation saw the first one's value, not the original.
        assert_eq!(as_f64(&stored.previous_value), Some(210.0));
        assert_eq!(h.engine.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn engines_sharing_a_store_do_not_lose_updates() {
        let store = Arc::new(SqliteMonitorStore::open_in_memory().unwrap());
        let m = monitor("Watch https://example.com/metric", "above 500", FactType::Number, Some(json!(195)));
        store.insert_monitor(&m).unwrap();

        let engine_with = |body: &str, delay_ms: u64| {
            let llm: Arc<dyn LanguageModel> = Arc::new(MockLanguageModel::new("[]"));
            MonitorEvaluationEngine::new(
                store.clone(),
                Arc::new(ScriptedFetcher::returning(body).with_delay(Duration::from_millis(delay_ms))),
                Arc::new(RecordingNotifier::default()),
                ContentEnhancementPipeline::new(llm, Duration::from_secs(2)),
                timings(),
            )
        };
        // Separate engines share no lock table; both read the row at 195.
        let scheduled = engine_with("Current value: 210", 20);
        let manual = engine_with("Current value: 220", 150);

        let (a, b) = tokio::join!(scheduled.evaluate(&m.id), manual.evaluate(&m.id));

        assert!(a.success && b.success, "{:?} / {:?}", a.error, b.error);
        assert_eq!(as_f64(&a.previous_value), Some(195.0));
        assert_eq!(as_f64(&b.previous_value), Some(210.0), "second write compared against the first");

        let stored = store.get_monitor(&m.id).await.unwrap().unwrap();
        assert_eq!(stored.evaluation_count, 2);
        assert_eq!(as_f64(&stored.current_value), Some(220.0));
        assert_eq!(as_f64(&stored.previous_value), Some(210.0));
        assert_eq!(store.fact_history(&m.id, 10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn evaluate_all_active_skips_inactive() {
        let h = harness(ScriptedFetcher::returning(TSLA_PAGE), RecordingNotifier::default(), TSLA_FACTS);
        let first = tsla_monitor();
        let second = monitor("Watch the market", "above 500", FactType::Number, None);
        let disabled = tsla_monitor();
        for m in [&first, &second, &disabled] {
            h.store.insert_monitor(m).unwrap();
        }
        h.store.set_monitor_active(&disabled.id, false).unwrap();

        let summary = h.engine.evaluate_all_active().await;

        assert_eq!(summary.total, 2);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.triggered, 1);
        assert!(summary.error.is_none());
        assert!(summary.results.iter().all(|r| r.monitor_id != disabled.id));
    }

    #[test]
    fn timings_follow_config() {
        let config = EngineConfig {
            fetch_timeout_secs: 7,
            inter_evaluation_delay_ms: 250,
            ..EngineConfig::default()
        };
        let timings = EngineTimings::from(&config);
        assert_eq!(timings.fetch_timeout, Duration::from_secs(7));
        assert_eq!(timings.inter_evaluation_delay, Duration::from_millis(250));
    }

    #[tokio::test]
    async fn from_config_opens_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            database_path: dir.path().join("engine.db"),
            ..EngineConfig::default()
        };
        let engine = MonitorEvaluationEngine::from_config(&config).unwrap();
        assert_eq!(engine.timings().quality_threshold, config.quality_threshold);

        let summary = engine.evaluate_all_active().await;
        assert_eq!(summary.total, 0);
        assert!(config.database_path.exists());
    }
}
