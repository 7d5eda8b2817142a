//! Correlated event timeline for runs, tools, edges, and model calls.
//!
//! Every state change in the gateway records an [`Event`]. The store is an
//! append-only in-memory ring; the process-wide [`diagnostics`] emitter
//! mirrors events to registered listeners for live observation.

mod event;
mod store;

pub mod diagnostics;

pub use event::{Event, EventBuilder};
pub use store::EventStore;

// ── Event type constants ────────────────────────────────────────────
// The gateway emits these; anything else is free-form (edge events carry
// whatever type the edge reported, prefixed with "edge.").

pub mod event_types {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_COMPLETED: &str = "run.completed";
    pub const RUN_FAILED: &str = "run.failed";
    pub const TURN_STARTED: &str = "turn.started";
    pub const TURN_COMPLETED: &str = "turn.completed";
    pub const TOOL_STARTED: &str = "tool.started";
    pub const TOOL_COMPLETED: &str = "tool.completed";
    pub const TOOL_FAILED: &str = "tool.failed";
    pub const TOOL_CANCELLED: &str = "tool.cancelled";
    pub const EDGE_CONNECTED: &str = "edge.connected";
    pub const EDGE_DISCONNECTED: &str = "edge.disconnected";
    pub const EDGE_HEARTBEAT: &str = "edge.heartbeat";
    pub const LLM_REQUEST: &str = "llm.request";
    pub const LLM_FAILOVER: &str = "llm.failover";
    pub const STEERING_INJECTED: &str = "steering.injected";
    pub const SUMMARY_CREATED: &str = "summary.created";
    pub const CHANNEL_INBOUND: &str = "channel.inbound";
    pub const CHANNEL_OUTBOUND: &str = "channel.outbound";
}
