use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use mg_domain::config::DispatcherConfig;
use mg_domain::error::ProviderErrorKind;
use mg_domain::{Error, Result};
use mg_events::{event_types, Event, EventStore};

use crate::classifier::{classify_error, is_retryable};
use crate::traits::{CompletionRequest, CompletionStream, ModelProvider};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-provider circuit state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Circuit-breaker state for one provider.
#[derive(Debug, Clone)]
pub struct ProviderState {
    pub name: String,
    pub consecutive_failures: u32,
    pub last_failure: Option<DateTime<Utc>>,
    pub circuit_open: bool,
    pub circuit_open_at: Option<Instant>,
}

impl ProviderState {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            consecutive_failures: 0,
            last_failure: None,
            circuit_open: false,
            circuit_open_at: None,
        }
    }
}

/// Counters kept by the dispatcher; snapshot via [`FailoverDispatcher::metrics`].
#[derive(Debug, Clone, Default)]
pub struct DispatcherMetrics {
    pub total_requests: u64,
    pub total_failovers: u64,
    pub total_retries: u64,
    pub circuit_breaks: u64,
    pub provider_failures: HashMap<String, u64>,
}

#[derive(Default)]
struct Counters {
    total_requests: AtomicU64,
    total_failovers: AtomicU64,
    total_retries: AtomicU64,
    circuit_breaks: AtomicU64,
    provider_failures: Mutex<HashMap<String, u64>>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// FailoverDispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Wraps an ordered list of model providers.
///
/// Per provider: skip while its circuit is open (until the half-open trial
/// window), retry retryable errors with doubling backoff, then fail over to
/// the next provider. Billing/auth/model-unavailable errors fail over
/// immediately; rate-limit and server errors do so too when configured.
/// Non-failover fatal errors return at once. Cancellation is propagated
/// without touching circuit counters.
pub struct FailoverDispatcher {
    providers: Vec<Arc<dyn ModelProvider>>,
    config: DispatcherConfig,
    states: Mutex<HashMap<String, ProviderState>>,
    counters: Counters,
    events: Option<Arc<EventStore>>,
}

impl FailoverDispatcher {
    pub fn new(providers: Vec<Arc<dyn ModelProvider>>, config: DispatcherConfig) -> Self {
        Self {
            providers,
            config,
            states: Mutex::new(HashMap::new()),
            counters: Counters::default(),
            events: None,
        }
    }

    /// Mirror failover decisions onto the event timeline.
    pub fn with_event_store(mut self, events: Arc<EventStore>) -> Self {
        self.events = Some(events);
        self
    }

    /// Names of the wrapped providers, in dispatch order.
    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_owned()).collect()
    }

    /// Run one completion through the provider chain.
    pub async fn complete(
        &self,
        cancel: &CancellationToken,
        req: &CompletionRequest,
    ) -> Result<CompletionStream> {
        self.counters.total_requests.fetch_add(1, Ordering::Relaxed);

        if self.providers.is_empty() {
            return Err(Error::Config("no model providers configured".into()));
        }

        let providers = self.providers.clone();
        let total = providers.len();
        let mut last_err: Option<Error> = None;

        'providers: for (idx, provider) in providers.iter().enumerate() {
            let name = provider.name().to_owned();
            if !self.may_attempt(&name) {
                tracing::debug!(provider = %name, "circuit open, skipping provider");
                continue;
            }

            let mut backoff = Duration::from_millis(self.config.initial_retry_backoff_ms);
            let max_backoff = Duration::from_millis(self.config.max_retry_backoff_ms);

            for attempt in 0..=self.config.max_retries {
                if cancel.is_cancelled() {
                    return Err(Error::Cancelled("model request cancelled".into()));
                }

                match provider.complete(req).await {
                    Ok(stream) => {
                        self.record_success(&name);
                        return Ok(stream);
                    }
                    Err(err) if err.is_cancelled() => {
                        // Counters deliberately untouched on cancellation.
                        return Err(err);
                    }
                    Err(err) => {
                        let kind = classify_error(&err.to_string());
                        self.record_failure(&name);
                        tracing::warn!(
                            provider = %name,
                            attempt,
                            kind = %kind,
                            error = %err,
                            "provider call failed"
                        );
                        last_err = Some(err);

                        if self.fails_over_immediately(kind) {
                            self.note_failover(&name, kind, idx, total);
                            continue 'providers;
                        }
                        if is_retryable(kind) {
                            if attempt < self.config.max_retries {
                                self.counters.total_retries.fetch_add(1, Ordering::Relaxed);
                                tokio::select! {
                                    _ = cancel.cancelled() => {
                                        return Err(Error::Cancelled(
                                            "model request cancelled during backoff".into(),
                                        ));
                                    }
                                    _ = tokio::time::sleep(backoff) => {}
                                }
                                backoff = (backoff * 2).min(max_backoff);
                                continue;
                            }
                            // Retries exhausted: move on down the chain.
                            self.note_failover(&name, kind, idx, total);
                            continue 'providers;
                        }
                        // Fatal and non-failover: surface immediately.
                        return Err(last_err.take().unwrap_or_else(|| {
                            Error::Provider {
                                provider: name.clone(),
                                kind,
                                message: "provider failed".into(),
                            }
                        }));
                    }
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::Provider {
            provider: "dispatcher".into(),
            kind: ProviderErrorKind::Unknown,
            message: "all providers skipped (circuits open)".into(),
        }))
    }

    /// Snapshot the dispatch counters.
    pub fn metrics(&self) -> DispatcherMetrics {
        DispatcherMetrics {
            total_requests: self.counters.total_requests.load(Ordering::Relaxed),
            total_failovers: self.counters.total_failovers.load(Ordering::Relaxed),
            total_retries: self.counters.total_retries.load(Ordering::Relaxed),
            circuit_breaks: self.counters.circuit_breaks.load(Ordering::Relaxed),
            provider_failures: self.counters.provider_failures.lock().clone(),
        }
    }

    /// Snapshot per-provider circuit state.
    pub fn provider_states(&self) -> Vec<ProviderState> {
        let states = self.states.lock();
        self.providers
            .iter()
            .map(|p| {
                states
                    .get(p.name())
                    .cloned()
                    .unwrap_or_else(|| ProviderState::new(p.name()))
            })
            .collect()
    }

    // ── Internal helpers ───────────────────────────────────────────

    /// Whether a provider may be attempted: circuit closed, or open long
    /// enough for a half-open trial.
    fn may_attempt(&self, name: &str) -> bool {
        let states = self.states.lock();
        let Some(state) = states.get(name) else {
            return true;
        };
        if !state.circuit_open {
            return true;
        }
        match state.circuit_open_at {
            Some(opened) => {
                opened.elapsed() > Duration::from_millis(self.config.circuit_breaker_timeout_ms)
            }
            None => true,
        }
    }

    fn record_success(&self, name: &str) {
        let mut states = self.states.lock();
        let state = states
            .entry(name.to_owned())
            .or_insert_with(|| ProviderState::new(name));
        state.consecutive_failures = 0;
        state.circuit_open = false;
        state.circuit_open_at = None;
    }

    fn record_failure(&self, name: &str) {
        *self
            .counters
            .provider_failures
            .lock()
            .entry(name.to_owned())
            .or_insert(0) += 1;

        let mut states = self.states.lock();
        let state = states
            .entry(name.to_owned())
            .or_insert_with(|| ProviderState::new(name));
        state.consecutive_failures += 1;
        state.last_failure = Some(Utc::now());
        if state.consecutive_failures >= self.config.circuit_breaker_threshold {
            if !state.circuit_open {
                self.counters.circuit_breaks.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    provider = %name,
                    failures = state.consecutive_failures,
                    "circuit opened"
                );
            }
            state.circuit_open = true;
            state.circuit_open_at = Some(Instant::now());
        }
    }

    /// Whether this error class skips remaining retries and moves on.
    fn fails_over_immediately(&self, kind: ProviderErrorKind) -> bool {
        match kind {
            ProviderErrorKind::Billing
            | ProviderErrorKind::Auth
            | ProviderErrorKind::ModelUnavailable => true,
            ProviderErrorKind::RateLimit => self.config.failover_on_rate_limit,
            ProviderErrorKind::ServerError => self.config.failover_on_server_error,
            _ => false,
        }
    }

    fn note_failover(&self, from: &str, kind: ProviderErrorKind, idx: usize, total: usize) {
        if idx + 1 >= total {
            return; // Nothing left to fail over to.
        }
        self.counters.total_failovers.fetch_add(1, Ordering::Relaxed);
        if let Some(events) = &self.events {
            events.record(
                Event::builder(event_types::LLM_FAILOVER)
                    .name(from)
                    .data("kind", serde_json::json!(kind.to_string()))
                    .build(),
            );
        }
    }
}
