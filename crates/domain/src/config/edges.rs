use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Edge plane
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for the edge orchestration plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgesConfig {
    /// How edges authenticate on registration.
    #[serde(default)]
    pub auth: EdgeAuthMode,
    /// Pre-shared tokens: edge_id -> token (token mode only).
    #[serde(default)]
    pub tokens: HashMap<String, String>,
    /// Heartbeat interval advertised to edges in the `Registered` ack.
    #[serde(default = "d_30")]
    pub heartbeat_interval_secs: u64,
    /// Edges silent for longer than this are swept as stale.
    #[serde(default = "d_120")]
    pub liveness_timeout_secs: u64,
    /// Default timeout for an edge tool execution when neither the call
    /// options nor the tool declaration supply one.
    #[serde(default = "d_60")]
    pub default_tool_timeout_secs: u64,
    /// Capacity of the outbound frame channel per edge. When full, tool
    /// requests are rejected with an overload error.
    #[serde(default = "d_64")]
    pub outbound_capacity: usize,
    /// Capacity of the bounded edge-event channel; overflow drops.
    #[serde(default = "d_256")]
    pub event_capacity: usize,
    /// Timeout for a spawned inbound channel-message handler task.
    #[serde(default = "d_30")]
    pub channel_handler_timeout_secs: u64,
}

impl Default for EdgesConfig {
    fn default() -> Self {
        Self {
            auth: EdgeAuthMode::default(),
            tokens: HashMap::new(),
            heartbeat_interval_secs: d_30(),
            liveness_timeout_secs: d_120(),
            default_tool_timeout_secs: d_60(),
            outbound_capacity: d_64(),
            event_capacity: d_256(),
            channel_handler_timeout_secs: d_30(),
        }
    }
}

/// How edge registrations are authenticated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeAuthMode {
    /// Accept any token (local development).
    #[default]
    Dev,
    /// Pre-shared per-edge tokens.
    Token,
    /// Trust-on-first-use: first contact blocks pending operator approval.
    Tofu,
}

fn d_30() -> u64 {
    30
}
fn d_60() -> u64 {
    60
}
fn d_120() -> u64 {
    120
}
fn d_64() -> usize {
    64
}
fn d_256() -> usize {
    256
}
