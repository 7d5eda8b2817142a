use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use mg_protocol::{Artifact, CoreFrame, EdgeCapabilities, EdgeMetrics, EdgeToolSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStatus {
    Connected,
    Disconnected,
}

/// The final value delivered to an `execute_tool` waiter.
#[derive(Debug, Clone)]
pub struct EdgeToolResult {
    pub execution_id: String,
    pub content: String,
    pub is_error: bool,
    pub duration_ms: u64,
    pub artifacts: Vec<Artifact>,
    pub error_details: Option<String>,
}

/// An in-flight tool execution awaiting its result frame.
pub(crate) struct PendingTool {
    pub meta: PendingToolInfo,
    /// Exactly one writer (the frame dispatcher) and one reader (the
    /// `execute_tool` caller).
    pub result_tx: oneshot::Sender<EdgeToolResult>,
}

/// Metadata describing an in-flight execution (observability surface).
#[derive(Debug, Clone, Serialize)]
pub struct PendingToolInfo {
    pub exec_id: String,
    pub run_id: String,
    pub session_id: String,
    pub tool_name: String,
    pub edge_id: String,
    pub started_at: DateTime<Utc>,
    pub timeout_secs: u64,
}

/// Mutable per-connection state, guarded by the connection's own lock.
pub(crate) struct ConnectionState {
    pub tools: HashMap<String, EdgeToolSpec>,
    pub last_heartbeat: DateTime<Utc>,
    pub reported_metrics: EdgeMetrics,
    /// exec_id -> in-flight metadata; the manager's global index holds the
    /// result channel. Removal must stay consistent across both.
    pub active_tools: HashMap<String, PendingToolInfo>,
}

/// A connected edge daemon.
///
/// Created on successful registration, destroyed on stream close. On
/// reconnect the manager cancels the previous connection's token before
/// installing the replacement (last writer wins by edge id).
pub(crate) struct EdgeConnection {
    /// Distinguishes this connection from a replacement with the same
    /// edge id during teardown races.
    pub conn_id: String,
    pub edge_id: String,
    pub name: String,
    pub channel_types: Vec<String>,
    pub capabilities: EdgeCapabilities,
    pub version: String,
    pub metadata: HashMap<String, String>,
    pub connected_at: DateTime<Utc>,
    pub outbound: mpsc::Sender<CoreFrame>,
    pub cancel: CancellationToken,
    pub state: Mutex<ConnectionState>,
}

impl EdgeConnection {
    pub fn active_tool_count(&self) -> usize {
        self.state.lock().active_tools.len()
    }

    pub fn info(&self) -> EdgeInfo {
        let state = self.state.lock();
        EdgeInfo {
            id: self.edge_id.clone(),
            name: self.name.clone(),
            status: EdgeStatus::Connected,
            connected_at: self.connected_at,
            last_heartbeat: state.last_heartbeat,
            tools: {
                let mut names: Vec<String> = state.tools.keys().cloned().collect();
                names.sort();
                names
            },
            channel_types: self.channel_types.clone(),
            capabilities: self.capabilities,
            version: self.version.clone(),
            metadata: self.metadata.clone(),
            metrics: state.reported_metrics.clone(),
            active_tools: state.active_tools.len(),
        }
    }
}

/// Cloneable summary of a connected edge.
#[derive(Debug, Clone, Serialize)]
pub struct EdgeInfo {
    pub id: String,
    pub name: String,
    pub status: EdgeStatus,
    pub connected_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    pub tools: Vec<String>,
    pub channel_types: Vec<String>,
    pub capabilities: EdgeCapabilities,
    pub version: String,
    pub metadata: HashMap<String, String>,
    pub metrics: EdgeMetrics,
    pub active_tools: usize,
}
