use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Failover dispatcher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for the failover model dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Retries per provider on retryable errors (attempts = retries + 1).
    #[serde(default = "d_2")]
    pub max_retries: u32,
    /// Initial backoff between retries; doubles each attempt.
    #[serde(default = "d_500")]
    pub initial_retry_backoff_ms: u64,
    /// Cap on a single backoff sleep. Caps the sleep only, not cumulative
    /// time; callers bound total time via cancellation.
    #[serde(default = "d_10000")]
    pub max_retry_backoff_ms: u64,
    /// Consecutive failures that open a provider's circuit.
    #[serde(default = "d_5")]
    pub circuit_breaker_threshold: u32,
    /// How long an open circuit blocks a provider before a half-open trial.
    #[serde(default = "d_60000")]
    pub circuit_breaker_timeout_ms: u64,
    /// Also fail over (instead of only retrying in place) on rate limits.
    #[serde(default)]
    pub failover_on_rate_limit: bool,
    /// Also fail over on server errors.
    #[serde(default)]
    pub failover_on_server_error: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_retries: d_2(),
            initial_retry_backoff_ms: d_500(),
            max_retry_backoff_ms: d_10000(),
            circuit_breaker_threshold: d_5(),
            circuit_breaker_timeout_ms: d_60000(),
            failover_on_rate_limit: false,
            failover_on_server_error: false,
        }
    }
}

fn d_2() -> u32 {
    2
}
fn d_5() -> u32 {
    5
}
fn d_500() -> u64 {
    500
}
fn d_10000() -> u64 {
    10_000
}
fn d_60000() -> u64 {
    60_000
}
