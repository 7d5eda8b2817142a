use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Parallel tool executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for local parallel tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Global cap on concurrently running tool calls.
    #[serde(default = "d_8")]
    pub max_concurrency: usize,
    /// Default per-attempt timeout.
    #[serde(default = "d_30000")]
    pub default_timeout_ms: u64,
    /// Default retries on retryable tool errors (attempts = retries + 1).
    #[serde(default = "d_1")]
    pub default_retries: u32,
    /// Initial backoff between attempts; shifts left per attempt.
    #[serde(default = "d_250")]
    pub initial_backoff_ms: u64,
    /// Cap on a single backoff sleep.
    #[serde(default = "d_5000")]
    pub max_retry_backoff_ms: u64,
    /// Per-tool overrides keyed by tool name.
    #[serde(default)]
    pub overrides: HashMap<String, ToolOverride>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: d_8(),
            default_timeout_ms: d_30000(),
            default_retries: d_1(),
            initial_backoff_ms: d_250(),
            max_retry_backoff_ms: d_5000(),
            overrides: HashMap::new(),
        }
    }
}

/// Per-tool execution overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_backoff_ms: Option<u64>,
}

fn d_8() -> usize {
    8
}
fn d_1() -> u32 {
    1
}
fn d_250() -> u64 {
    250
}
fn d_5000() -> u64 {
    5_000
}
fn d_30000() -> u64 {
    30_000
}
