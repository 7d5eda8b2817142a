//! Edge wire protocol: the tagged-union frames exchanged between the core
//! and edge daemons over a bidirectional stream.
//!
//! Edges are semi-trusted daemons on user machines that register tools and
//! channels with the gateway and execute tool calls on behalf of the agent
//! runtime. The first edge frame on a connection MUST be [`EdgeFrame::Register`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A tool declared by an edge at registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON Schema for the tool's input.
    #[serde(default)]
    pub input_schema: serde_json::Value,
    #[serde(default)]
    pub requires_approval: bool,
    /// Per-tool execution timeout; 0 = use the gateway default.
    #[serde(default)]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub produces_artifacts: bool,
}

/// What an edge can do, declared at registration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EdgeCapabilities {
    #[serde(default)]
    pub tools: bool,
    #[serde(default)]
    pub channels: bool,
    #[serde(default)]
    pub streaming: bool,
    #[serde(default)]
    pub artifacts: bool,
}

/// Point-in-time load metrics reported in heartbeats.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeMetrics {
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub memory_mb: u64,
    #[serde(default)]
    pub active_executions: u64,
    #[serde(default)]
    pub uptime_seconds: u64,
}

/// A binary or referenced artifact attached to a tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub mime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Inline payload (base64 by convention); mutually exclusive with `reference`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// An inbound message arriving from an edge-hosted channel (chat bridge).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelInbound {
    pub channel_type: String,
    pub channel_id: String,
    /// Stable key identifying the conversation for session resolution.
    pub session_key: String,
    pub sender_id: String,
    #[serde(default)]
    pub sender_name: String,
    pub body: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// An outbound message for an edge-hosted channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelOutbound {
    pub message_id: String,
    pub session_id: String,
    pub channel_type: String,
    pub channel_id: String,
    pub body: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Edge → Core frames
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeFrame {
    /// First frame on every connection.
    Register {
        edge_id: String,
        name: String,
        auth_token: String,
        #[serde(default)]
        tools: Vec<EdgeToolSpec>,
        #[serde(default)]
        channel_types: Vec<String>,
        #[serde(default)]
        capabilities: EdgeCapabilities,
        #[serde(default)]
        version: String,
        #[serde(default)]
        metadata: HashMap<String, String>,
    },

    Heartbeat {
        edge_id: String,
        timestamp: i64,
        #[serde(default)]
        metrics: EdgeMetrics,
    },

    ToolResult {
        execution_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
        #[serde(default)]
        duration_ms: u64,
        #[serde(default)]
        artifacts: Vec<Artifact>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_details: Option<String>,
    },

    /// Free-form edge lifecycle event, forwarded to the event plane.
    Event {
        #[serde(rename = "event_type")]
        kind: String,
        timestamp: i64,
        #[serde(default)]
        data: HashMap<String, serde_json::Value>,
    },

    ChannelInbound(ChannelInbound),

    ChannelAck {
        message_id: String,
        status: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core → Edge frames
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoreFrame {
    Registered {
        success: bool,
        edge_id: String,
        heartbeat_interval_seconds: u64,
        core_version: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    ToolRequest {
        execution_id: String,
        run_id: String,
        session_id: String,
        tool_name: String,
        input: serde_json::Value,
        timeout_seconds: u64,
        #[serde(default)]
        approved: bool,
        #[serde(default)]
        metadata: HashMap<String, String>,
    },

    ToolCancel {
        execution_id: String,
        reason: String,
    },

    ChannelOutbound(ChannelOutbound),
}
