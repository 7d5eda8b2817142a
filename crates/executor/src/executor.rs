use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use mg_domain::config::ExecutorConfig;
use mg_domain::message::ToolCall;
use mg_domain::{Error, Result};

use crate::registry::ToolRegistry;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result & metrics types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Outcome of one tool call, including how hard we had to try.
#[derive(Debug)]
pub struct ExecutionResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub result: Option<serde_json::Value>,
    pub error: Option<Error>,
    pub duration: Duration,
    pub attempts: u32,
}

impl ExecutionResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Snapshot of the executor's counters.
#[derive(Debug, Clone, Default)]
pub struct ExecutorMetrics {
    pub executions: u64,
    pub retries: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub panics: u64,
}

#[derive(Default)]
struct Counters {
    executions: AtomicU64,
    retries: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    panics: AtomicU64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ParallelToolExecutor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Runs batches of tool calls concurrently with bounded parallelism.
///
/// Results come back in input order regardless of completion order. Every
/// semaphore slot is released on all exit paths, including timeout, panic,
/// and cancellation.
pub struct ParallelToolExecutor {
    registry: Arc<ToolRegistry>,
    config: ExecutorConfig,
    semaphore: Arc<Semaphore>,
    counters: Counters,
}

impl ParallelToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, config: ExecutorConfig) -> Self {
        let permits = config.max_concurrency.max(1);
        Self {
            registry,
            config,
            semaphore: Arc::new(Semaphore::new(permits)),
            counters: Counters::default(),
        }
    }

    /// Execute every call in the batch. `results[i]` corresponds to
    /// `calls[i]`.
    pub async fn execute_all(
        &self,
        cancel: &CancellationToken,
        calls: &[ToolCall],
    ) -> Vec<ExecutionResult> {
        let futures: Vec<_> = calls.iter().map(|call| self.execute_one(cancel, call)).collect();
        futures_util::future::join_all(futures).await
    }

    /// Snapshot counters.
    pub fn metrics(&self) -> ExecutorMetrics {
        ExecutorMetrics {
            executions: self.counters.executions.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
            timeouts: self.counters.timeouts.load(Ordering::Relaxed),
            panics: self.counters.panics.load(Ordering::Relaxed),
        }
    }

    // ── Single call ────────────────────────────────────────────────

    async fn execute_one(&self, cancel: &CancellationToken, call: &ToolCall) -> ExecutionResult {
        let started = Instant::now();
        self.counters.executions.fetch_add(1, Ordering::Relaxed);

        let finish = |result: Result<serde_json::Value>, attempts: u32| {
            let (result, error) = match result {
                Ok(v) => (Some(v), None),
                Err(e) => {
                    self.counters.failures.fetch_add(1, Ordering::Relaxed);
                    (None, Some(e))
                }
            };
            ExecutionResult {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                result,
                error,
                duration: started.elapsed(),
                attempts,
            }
        };

        // Slot first; a cancelled caller aborts the wait.
        let permit = tokio::select! {
            permit = self.semaphore.clone().acquire_owned() => match permit {
                Ok(p) => p,
                Err(_) => {
                    return finish(Err(Error::Other("executor semaphore closed".into())), 0);
                }
            },
            _ = cancel.cancelled() => {
                return finish(Err(Error::Cancelled("tool batch cancelled".into())), 0);
            }
        };

        let Some(handler) = self.registry.get(&call.name) else {
            drop(permit);
            return finish(Err(Error::ToolNotFound(call.name.clone())), 0);
        };

        let (timeout, retries, initial_backoff) = self.limits_for(&call.name);
        let max_backoff = Duration::from_millis(self.config.max_retry_backoff_ms);

        let mut attempts = 0u32;
        let mut last_err: Option<Error> = None;
        while attempts <= retries {
            if cancel.is_cancelled() {
                drop(permit);
                return finish(Err(Error::Cancelled("tool batch cancelled".into())), attempts);
            }
            let attempt_index = attempts;
            attempts += 1;

            match self.run_attempt(cancel, &call.name, handler.clone(), &call.input, timeout).await
            {
                Ok(value) => {
                    drop(permit);
                    return finish(Ok(value), attempts);
                }
                Err(err) => {
                    match &err {
                        Error::Cancelled(_) => {
                            drop(permit);
                            return finish(Err(err), attempts);
                        }
                        Error::ToolTimeout { .. } => {
                            self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
                        }
                        Error::ToolPanic { .. } => {
                            self.counters.panics.fetch_add(1, Ordering::Relaxed);
                        }
                        _ => {}
                    }

                    let retry = err.is_tool_retryable() && attempts <= retries;
                    tracing::warn!(
                        tool = %call.name,
                        attempt = attempt_index,
                        retrying = retry,
                        error = %err,
                        "tool attempt failed"
                    );
                    last_err = Some(err);
                    if !retry {
                        break;
                    }

                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                    let backoff =
                        shifted_backoff(initial_backoff, attempt_index).min(max_backoff);
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            drop(permit);
                            return finish(
                                Err(Error::Cancelled("tool batch cancelled".into())),
                                attempts,
                            );
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }

        drop(permit);
        let err = last_err
            .unwrap_or_else(|| Error::Other(format!("tool '{}' produced no result", call.name)));
        finish(Err(err), attempts)
    }

    /// One attempt on a spawned worker: panics become `ToolPanic`, the
    /// deadline produces `ToolTimeout`, caller cancellation aborts the
    /// worker.
    async fn run_attempt(
        &self,
        cancel: &CancellationToken,
        tool: &str,
        handler: Arc<dyn crate::ToolHandler>,
        input: &serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        let input = input.clone();
        let mut worker = tokio::spawn(async move { handler.invoke(input).await });

        tokio::select! {
            joined = &mut worker => match joined {
                Ok(result) => result,
                Err(join_err) if join_err.is_panic() => Err(Error::ToolPanic {
                    tool: tool.to_owned(),
                    message: panic_message(join_err.into_panic()),
                }),
                Err(_) => Err(Error::Other(format!("tool '{tool}' worker aborted"))),
            },
            _ = tokio::time::sleep(timeout) => {
                worker.abort();
                Err(Error::ToolTimeout {
                    tool: tool.to_owned(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            _ = cancel.cancelled() => {
                worker.abort();
                Err(Error::Cancelled("tool attempt cancelled".into()))
            }
        }
    }

    /// Effective (timeout, retries, initial backoff) after per-tool overrides.
    fn limits_for(&self, tool: &str) -> (Duration, u32, Duration) {
        let o = self.config.overrides.get(tool);
        let timeout_ms = o
            .and_then(|o| o.timeout_ms)
            .unwrap_or(self.config.default_timeout_ms);
        let retries = o
            .and_then(|o| o.retries)
            .unwrap_or(self.config.default_retries);
        let backoff_ms = o
            .and_then(|o| o.initial_backoff_ms)
            .unwrap_or(self.config.initial_backoff_ms);
        (
            Duration::from_millis(timeout_ms),
            retries,
            Duration::from_millis(backoff_ms),
        )
    }
}

/// `initial << attempt` without overflowing.
fn shifted_backoff(initial: Duration, attempt: u32) -> Duration {
    initial.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX))
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolHandler;
    use std::sync::atomic::AtomicU32;

    struct EchoTool;

    #[async_trait::async_trait]
    impl ToolHandler for EchoTool {
        async fn invoke(&self, input: serde_json::Value) -> Result<serde_json::Value> {
            Ok(serde_json::json!({ "echo": input }))
        }
    }

    struct PanickingTool;

    #[async_trait::async_trait]
    impl ToolHandler for PanickingTool {
        async fn invoke(&self, _input: serde_json::Value) -> Result<serde_json::Value> {
            panic!("boom");
        }
    }

    struct SlowTool;

    #[async_trait::async_trait]
    impl ToolHandler for SlowTool {
        async fn invoke(&self, _input: serde_json::Value) -> Result<serde_json::Value> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(serde_json::json!("done"))
        }
    }

    /// Fails with a retryable error until the Nth call.
    struct FlakyTool {
        fail_times: u32,
        calls: AtomicU32,
    }

    #[async_trait::async_trait]
    impl ToolHandler for FlakyTool {
        async fn invoke(&self, _input: serde_json::Value) -> Result<serde_json::Value> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(Error::ToolFailed {
                    tool: "flaky".into(),
                    message: "transient".into(),
                    retryable: true,
                })
            } else {
                Ok(serde_json::json!("recovered"))
            }
        }
    }

    fn def(name: &str) -> mg_domain::message::ToolDefinition {
        mg_domain::message::ToolDefinition {
            name: name.into(),
            description: format!("{name} test tool"),
            input_schema: serde_json::json!({"type": "object"}),
        }
    }

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            input: serde_json::json!({}),
        }
    }

    fn executor_with(registry: Arc<ToolRegistry>, config: ExecutorConfig) -> ParallelToolExecutor {
        ParallelToolExecutor::new(registry, config)
    }

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            max_concurrency: 4,
            default_timeout_ms: 100,
            default_retries: 1,
            initial_backoff_ms: 1,
            max_retry_backoff_ms: 4,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn results_keep_input_order() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(def("echo"), Arc::new(EchoTool));
        let exec = executor_with(registry, fast_config());

        let calls: Vec<ToolCall> = (0..6).map(|i| call(&format!("c{i}"), "echo")).collect();
        let results = exec.execute_all(&CancellationToken::new(), &calls).await;

        assert_eq!(results.len(), 6);
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.tool_call_id, format!("c{i}"));
            assert!(!r.is_error());
        }
    }

    #[tokio::test]
    async fn unknown_tool_errors_without_attempts() {
        let exec = executor_with(Arc::new(ToolRegistry::new()), fast_config());
        let results = exec
            .execute_all(&CancellationToken::new(), &[call("c1", "nope")])
            .await;
        assert!(matches!(results[0].error, Some(Error::ToolNotFound(_))));
        assert_eq!(results[0].attempts, 0);
    }

    #[tokio::test]
    async fn panic_is_recovered_as_tool_panic() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(def("bad"), Arc::new(PanickingTool));
        let exec = executor_with(registry, fast_config());

        let results = exec
            .execute_all(&CancellationToken::new(), &[call("c1", "bad")])
            .await;
        match &results[0].error {
            Some(Error::ToolPanic { message, .. }) => assert_eq!(message, "boom"),
            other => panic!("expected ToolPanic, got {other:?}"),
        }
        assert_eq!(exec.metrics().panics, 1);
        // Panics are not retried.
        assert_eq!(results[0].attempts, 1);
    }

    #[tokio::test]
    async fn timeout_produces_tool_timeout_and_retries() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(def("slow"), Arc::new(SlowTool));
        let exec = executor_with(registry, fast_config());

        let results = exec
            .execute_all(&CancellationToken::new(), &[call("c1", "slow")])
            .await;
        assert!(matches!(
            results[0].error,
            Some(Error::ToolTimeout { timeout_ms: 100, .. })
        ));
        // retries = 1 -> two attempts, both timing out.
        assert_eq!(results[0].attempts, 2);
        let m = exec.metrics();
        assert_eq!(m.timeouts, 2);
        assert_eq!(m.retries, 1);
        assert_eq!(m.failures, 1);
    }

    #[tokio::test]
    async fn retryable_failure_eventually_succeeds() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(
            def("flaky"),
            Arc::new(FlakyTool {
                fail_times: 2,
                calls: AtomicU32::new(0),
            }),
        );
        let mut config = fast_config();
        config.default_retries = 3;
        let exec = executor_with(registry, config);

        let results = exec
            .execute_all(&CancellationToken::new(), &[call("c1", "flaky")])
            .await;
        assert!(!results[0].is_error());
        assert_eq!(results[0].attempts, 3);
        assert!(results[0].attempts <= 4, "attempts bounded by retries+1");
        assert_eq!(exec.metrics().retries, 2);
    }

    #[tokio::test]
    async fn non_retryable_failure_stops_immediately() {
        struct FatalTool;
        #[async_trait::async_trait]
        impl ToolHandler for FatalTool {
            async fn invoke(&self, _input: serde_json::Value) -> Result<serde_json::Value> {
                Err(Error::ToolFailed {
                    tool: "fatal".into(),
                    message: "no".into(),
                    retryable: false,
                })
            }
        }
        let registry = Arc::new(ToolRegistry::new());
        registry.register(def("fatal"), Arc::new(FatalTool));
        let mut config = fast_config();
        config.default_retries = 5;
        let exec = executor_with(registry, config);

        let results = exec
            .execute_all(&CancellationToken::new(), &[call("c1", "fatal")])
            .await;
        assert_eq!(results[0].attempts, 1);
        assert_eq!(exec.metrics().retries, 0);
    }

    #[tokio::test]
    async fn per_tool_override_shortens_timeout() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(def("slow"), Arc::new(SlowTool));
        let mut config = fast_config();
        config.default_timeout_ms = 60_000;
        config.default_retries = 0;
        config.overrides.insert(
            "slow".into(),
            mg_domain::config::ToolOverride {
                timeout_ms: Some(50),
                ..Default::default()
            },
        );
        let exec = executor_with(registry, config);

        let started = Instant::now();
        let results = exec
            .execute_all(&CancellationToken::new(), &[call("c1", "slow")])
            .await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(
            results[0].error,
            Some(Error::ToolTimeout { timeout_ms: 50, .. })
        ));
    }

    #[tokio::test]
    async fn cancellation_aborts_batch() {
        let registry = Arc::new(ToolRegistry::new());
        registry.register(def("slow"), Arc::new(SlowTool));
        let mut config = fast_config();
        config.default_timeout_ms = 60_000;
        let exec = Arc::new(executor_with(registry, config));

        let cancel = CancellationToken::new();
        let c2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            c2.cancel();
        });

        let results = exec.execute_all(&cancel, &[call("c1", "slow")]).await;
        assert!(matches!(results[0].error, Some(Error::Cancelled(_))));
    }

    #[tokio::test]
    async fn semaphore_bounds_concurrency() {
        use std::sync::atomic::AtomicI32;

        struct GaugeTool {
            current: Arc<AtomicI32>,
            peak: Arc<AtomicI32>,
        }

        #[async_trait::async_trait]
        impl ToolHandler for GaugeTool {
            async fn invoke(&self, _input: serde_json::Value) -> Result<serde_json::Value> {
                let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.current.fetch_sub(1, Ordering::SeqCst);
                Ok(serde_json::json!("ok"))
            }
        }

        let current = Arc::new(AtomicI32::new(0));
        let peak = Arc::new(AtomicI32::new(0));
        let registry = Arc::new(ToolRegistry::new());
        registry.register(
            def("gauge"),
            Arc::new(GaugeTool {
                current: current.clone(),
                peak: peak.clone(),
            }),
        );
        let mut config = fast_config();
        config.max_concurrency = 2;
        config.default_timeout_ms = 5_000;
        let exec = executor_with(registry, config);

        let calls: Vec<ToolCall> = (0..8).map(|i| call(&format!("c{i}"), "gauge")).collect();
        let results = exec.execute_all(&CancellationToken::new(), &calls).await;
        assert!(results.iter().all(|r| !r.is_error()));
        assert!(peak.load(Ordering::SeqCst) <= 2, "semaphore must cap concurrency");
    }
}
