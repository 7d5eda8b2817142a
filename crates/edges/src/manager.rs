use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use mg_domain::config::EdgesConfig;
use mg_domain::{Error, Result};
use mg_events::{event_types, Event, EventStore};
use mg_protocol::{
    Artifact, ChannelInbound, ChannelOutbound, CoreFrame, EdgeFrame, EdgeToolSpec,
};

use crate::connection::{
    ConnectionState, EdgeConnection, EdgeInfo, EdgeToolResult, PendingTool, PendingToolInfo,
};
use crate::selection::{SelectionCriteria, SelectionStrategy};
use crate::Authenticator;

/// How long an edge gets to send its `Register` frame.
const REGISTER_TIMEOUT: Duration = Duration::from_secs(10);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Callbacks & event payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Handles inbound channel messages (chat bridges hosted on edges).
/// Invocations run on their own cancellation-scoped task with a timeout so
/// the stream reader never blocks on user code.
#[async_trait::async_trait]
pub trait ChannelHandler: Send + Sync {
    async fn handle(&self, edge_id: &str, msg: ChannelInbound) -> Result<()>;
}

/// Redacts artifact payloads before they reach waiters.
pub trait ArtifactPolicy: Send + Sync {
    fn apply(&self, edge_id: &str, artifacts: &mut Vec<Artifact>);
}

/// A lifecycle event reported by an edge, forwarded on the bounded
/// events channel.
#[derive(Debug, Clone)]
pub struct EdgeEvent {
    pub edge_id: String,
    pub kind: String,
    pub timestamp: i64,
    pub data: HashMap<String, serde_json::Value>,
}

/// Per-call options for [`EdgeManager::execute_tool`].
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub run_id: String,
    pub session_id: String,
    /// Overrides the tool's declared timeout and the manager default.
    pub timeout: Option<Duration>,
    pub approved: bool,
    pub metadata: HashMap<String, String>,
}

/// Counter snapshot.
#[derive(Debug, Clone, Default)]
pub struct EdgeManagerMetrics {
    pub edges_connected: usize,
    pub total_tool_calls: u64,
    pub active_tool_calls: i64,
    pub failed_tool_calls: u64,
    pub tool_timeouts: u64,
    pub events_dropped: u64,
    pub overload_rejections: u64,
}

#[derive(Default)]
struct Counters {
    total_tool_calls: AtomicU64,
    active_tool_calls: AtomicI64,
    failed_tool_calls: AtomicU64,
    tool_timeouts: AtomicU64,
    events_dropped: AtomicU64,
    overload_rejections: AtomicU64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// EdgeManager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Owns every connected edge and the full request/response bookkeeping.
///
/// Transport-agnostic: adapters (WebSocket or tests) pump decoded frames
/// through [`EdgeManager::serve`]. No lock is held across a channel send or
/// user callback; connection data is copied out under the lock first.
pub struct EdgeManager {
    config: EdgesConfig,
    auth: Arc<dyn Authenticator>,
    events: Arc<EventStore>,
    edges: RwLock<HashMap<String, Arc<EdgeConnection>>>,
    /// exec_id -> pending record. Mirrored per-edge in
    /// `EdgeConnection::state::active_tools`; `take_pending` keeps both
    /// sides and the active counter consistent.
    pending_tools: Mutex<HashMap<String, PendingTool>>,
    pending_channel_msgs: Mutex<HashMap<String, oneshot::Sender<String>>>,
    channel_handler: RwLock<Option<Arc<dyn ChannelHandler>>>,
    artifact_policy: RwLock<Option<Arc<dyn ArtifactPolicy>>>,
    edge_events_tx: mpsc::Sender<EdgeEvent>,
    edge_events_rx: Mutex<Option<mpsc::Receiver<EdgeEvent>>>,
    round_robin: AtomicU64,
    counters: Counters,
}

impl EdgeManager {
    pub fn new(config: EdgesConfig, auth: Arc<dyn Authenticator>, events: Arc<EventStore>) -> Self {
        let (tx, rx) = mpsc::channel(config.event_capacity.max(1));
        Self {
            config,
            auth,
            events,
            edges: RwLock::new(HashMap::new()),
            pending_tools: Mutex::new(HashMap::new()),
            pending_channel_msgs: Mutex::new(HashMap::new()),
            channel_handler: RwLock::new(None),
            artifact_policy: RwLock::new(None),
            edge_events_tx: tx,
            edge_events_rx: Mutex::new(Some(rx)),
            round_robin: AtomicU64::new(0),
            counters: Counters::default(),
        }
    }

    /// Capacity adapters should use for the outbound frame channel.
    pub fn outbound_capacity(&self) -> usize {
        self.config.outbound_capacity.max(1)
    }

    /// Install the singleton inbound channel-message handler.
    pub fn set_channel_handler(&self, handler: Arc<dyn ChannelHandler>) {
        *self.channel_handler.write() = Some(handler);
    }

    pub fn set_artifact_policy(&self, policy: Arc<dyn ArtifactPolicy>) {
        *self.artifact_policy.write() = Some(policy);
    }

    /// The bounded edge-event stream. Single consumer; `None` after the
    /// first call.
    pub fn take_event_receiver(&self) -> Option<mpsc::Receiver<EdgeEvent>> {
        self.edge_events_rx.lock().take()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Connection lifecycle
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Drive one edge connection to completion.
    ///
    /// Protocol: the first inbound frame must be `Register`; the manager
    /// authenticates, installs the connection (cancelling any previous
    /// connection with the same edge id), acks with `Registered`, then
    /// dispatches frames until the stream closes or the connection token is
    /// cancelled. Teardown fails all in-flight executions on this edge.
    pub async fn serve(
        &self,
        mut inbound: mpsc::Receiver<EdgeFrame>,
        outbound: mpsc::Sender<CoreFrame>,
    ) -> Result<()> {
        // ── Handshake ─────────────────────────────────────────────
        let first = tokio::time::timeout(REGISTER_TIMEOUT, inbound.recv())
            .await
            .map_err(|_| Error::Other("timed out waiting for registration".into()))?;

        let Some(EdgeFrame::Register {
            edge_id,
            name,
            auth_token,
            tools,
            channel_types,
            capabilities,
            version,
            metadata,
        }) = first
        else {
            let _ = outbound
                .send(registered_err("", "first message must be registration"))
                .await;
            return Err(Error::Other("first message must be registration".into()));
        };

        let cancel = CancellationToken::new();
        let edge_id = match self.auth.authenticate(&cancel, &edge_id, &auth_token).await {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(edge_id = %edge_id, error = %err, "edge authentication failed");
                let _ = outbound.send(registered_err(&edge_id, &err.to_string())).await;
                return Err(err);
            }
        };

        // ── Install (replace-on-reconnect) ────────────────────────
        let now = Utc::now();
        let conn = Arc::new(EdgeConnection {
            conn_id: uuid::Uuid::new_v4().to_string(),
            edge_id: edge_id.clone(),
            name,
            channel_types,
            capabilities,
            version,
            metadata,
            connected_at: now,
            outbound: outbound.clone(),
            cancel: cancel.clone(),
            state: Mutex::new(ConnectionState {
                tools: tools.into_iter().map(|t| (t.name.clone(), t)).collect(),
                last_heartbeat: now,
                reported_metrics: Default::default(),
                active_tools: HashMap::new(),
            }),
        });

        {
            // Cancel-old + insert-new under one write lock: at most one
            // connection per edge id at any instant. The old connection's
            // tasks observe cancellation on their own.
            let mut edges = self.edges.write();
            if let Some(old) = edges.insert(edge_id.clone(), conn.clone()) {
                tracing::info!(edge_id = %edge_id, "edge reconnected, replacing connection");
                old.cancel.cancel();
            }
        }

        let ack = CoreFrame::Registered {
            success: true,
            edge_id: edge_id.clone(),
            heartbeat_interval_seconds: self.config.heartbeat_interval_secs,
            core_version: env!("CARGO_PKG_VERSION").to_string(),
            error: None,
        };
        if outbound.send(ack).await.is_err() {
            self.remove_edge(&conn);
            return Err(Error::Other(format!(
                "edge '{edge_id}' dropped before registration ack"
            )));
        }

        let tool_count = conn.state.lock().tools.len();
        tracing::info!(edge_id = %edge_id, tools = tool_count, "edge connected");
        self.events.record(
            Event::builder(event_types::EDGE_CONNECTED)
                .edge_id(&edge_id)
                .data("tools", serde_json::json!(tool_count))
                .build(),
        );

        // ── Message loop ──────────────────────────────────────────
        loop {
            tokio::select! {
                _ = conn.cancel.cancelled() => break,
                frame = inbound.recv() => match frame {
                    Some(frame) => self.handle_frame(&conn, frame).await,
                    None => break,
                }
            }
        }

        self.remove_edge(&conn);
        Ok(())
    }

    /// Teardown: drop the connection (only if it is still the installed
    /// one), fail its in-flight executions, emit the disconnect event.
    fn remove_edge(&self, conn: &Arc<EdgeConnection>) {
        conn.cancel.cancel();
        {
            let mut edges = self.edges.write();
            if edges
                .get(&conn.edge_id)
                .is_some_and(|current| current.conn_id == conn.conn_id)
            {
                edges.remove(&conn.edge_id);
            }
        }

        // Cancel still-pending tools; dropping the result sender surfaces
        // a failure to every waiter.
        let exec_ids: Vec<String> = conn.state.lock().active_tools.keys().cloned().collect();
        let failed = exec_ids.len();
        for exec_id in exec_ids {
            if self.take_pending(&exec_id).is_some() {
                tracing::debug!(exec_id = %exec_id, "pending tool cancelled by disconnect");
            }
        }

        tracing::info!(
            edge_id = %conn.edge_id,
            failed_in_flight = failed,
            "edge disconnected"
        );
        self.events.record(
            Event::builder(event_types::EDGE_DISCONNECTED)
                .edge_id(&conn.edge_id)
                .data("failed_in_flight", serde_json::json!(failed))
                .build(),
        );
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Inbound dispatch
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn handle_frame(&self, conn: &Arc<EdgeConnection>, frame: EdgeFrame) {
        match frame {
            EdgeFrame::Heartbeat { metrics, .. } => {
                {
                    let mut state = conn.state.lock();
                    state.last_heartbeat = Utc::now();
                    state.reported_metrics = metrics;
                }
                self.events.record(
                    Event::builder(event_types::EDGE_HEARTBEAT)
                        .edge_id(&conn.edge_id)
                        .build(),
                );
            }

            EdgeFrame::ToolResult {
                execution_id,
                content,
                is_error,
                duration_ms,
                mut artifacts,
                error_details,
            } => {
                let Some(pending) = self.take_pending(&execution_id) else {
                    tracing::warn!(
                        exec_id = %execution_id,
                        edge_id = %conn.edge_id,
                        "tool result for unknown execution"
                    );
                    return;
                };

                if let Some(policy) = self.artifact_policy.read().clone() {
                    policy.apply(&conn.edge_id, &mut artifacts);
                }
                if is_error {
                    self.counters.failed_tool_calls.fetch_add(1, Ordering::Relaxed);
                }
                self.events.record(
                    Event::builder(if is_error {
                        event_types::TOOL_FAILED
                    } else {
                        event_types::TOOL_COMPLETED
                    })
                    .edge_id(&conn.edge_id)
                    .run_id(&pending.meta.run_id)
                    .session_id(&pending.meta.session_id)
                    .name(&pending.meta.tool_name)
                    .duration_ms(duration_ms)
                    .build(),
                );

                let result = EdgeToolResult {
                    execution_id: execution_id.clone(),
                    content,
                    is_error,
                    duration_ms,
                    artifacts,
                    error_details,
                };
                // Capacity-1 channel with exactly one writer; a send error
                // means the waiter already gave up.
                if pending.result_tx.send(result).is_err() {
                    tracing::debug!(exec_id = %execution_id, "tool result had no waiter");
                }
            }

            EdgeFrame::Event {
                kind,
                timestamp,
                data,
            } => {
                self.events.record(
                    Event::builder(format!("edge.{kind}"))
                        .edge_id(&conn.edge_id)
                        .build(),
                );
                let event = EdgeEvent {
                    edge_id: conn.edge_id.clone(),
                    kind,
                    timestamp,
                    data,
                };
                if self.edge_events_tx.try_send(event).is_err() {
                    self.counters.events_dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(edge_id = %conn.edge_id, "edge event channel full, dropping");
                }
            }

            EdgeFrame::ChannelInbound(msg) => {
                self.events.record(
                    Event::builder(event_types::CHANNEL_INBOUND)
                        .edge_id(&conn.edge_id)
                        .session_id(&msg.session_key)
                        .build(),
                );
                let Some(handler) = self.channel_handler.read().clone() else {
                    tracing::warn!(
                        edge_id = %conn.edge_id,
                        channel = %msg.channel_type,
                        "inbound channel message with no handler installed"
                    );
                    return;
                };
                // Never block the message loop on user code.
                let edge_id = conn.edge_id.clone();
                let timeout = Duration::from_secs(self.config.channel_handler_timeout_secs);
                let conn_cancel = conn.cancel.clone();
                tokio::spawn(async move {
                    let work = handler.handle(&edge_id, msg);
                    tokio::select! {
                        res = tokio::time::timeout(timeout, work) => match res {
                            Ok(Ok(())) => {}
                            Ok(Err(err)) => {
                                tracing::warn!(edge_id = %edge_id, error = %err, "channel handler failed");
                            }
                            Err(_) => {
                                tracing::warn!(edge_id = %edge_id, "channel handler timed out");
                            }
                        },
                        _ = conn_cancel.cancelled() => {}
                    }
                });
            }

            EdgeFrame::ChannelAck { message_id, status } => {
                if let Some(tx) = self.pending_channel_msgs.lock().remove(&message_id) {
                    let _ = tx.send(status);
                } else {
                    tracing::warn!(message_id = %message_id, "ack for unknown channel message");
                }
            }

            EdgeFrame::Register { .. } => {
                tracing::warn!(edge_id = %conn.edge_id, "duplicate register frame ignored");
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Tool execution
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Execute a tool on a specific edge and wait for its result.
    pub async fn execute_tool(
        &self,
        cancel: &CancellationToken,
        edge_id: &str,
        tool_name: &str,
        input: serde_json::Value,
        opts: ExecuteOptions,
    ) -> Result<EdgeToolResult> {
        let conn = self
            .edges
            .read()
            .get(edge_id)
            .cloned()
            .ok_or_else(|| Error::EdgeNotFound(edge_id.to_owned()))?;

        let declared_timeout = {
            let state = conn.state.lock();
            let spec: &EdgeToolSpec = state
                .tools
                .get(tool_name)
                .ok_or_else(|| Error::ToolNotFound(format!("{tool_name} on edge {edge_id}")))?;
            spec.timeout_seconds
        };
        let timeout = opts
            .timeout
            .or((declared_timeout > 0).then(|| Duration::from_secs(declared_timeout)))
            .unwrap_or(Duration::from_secs(self.config.default_tool_timeout_secs));

        // ── Register the pending execution in both indices ────────
        let exec_id = uuid::Uuid::new_v4().to_string();
        let (result_tx, mut result_rx) = oneshot::channel();
        let meta = PendingToolInfo {
            exec_id: exec_id.clone(),
            run_id: opts.run_id.clone(),
            session_id: opts.session_id.clone(),
            tool_name: tool_name.to_owned(),
            edge_id: edge_id.to_owned(),
            started_at: Utc::now(),
            timeout_secs: timeout.as_secs(),
        };
        self.pending_tools.lock().insert(
            exec_id.clone(),
            PendingTool {
                meta: meta.clone(),
                result_tx,
            },
        );
        conn.state.lock().active_tools.insert(exec_id.clone(), meta);
        self.counters.total_tool_calls.fetch_add(1, Ordering::Relaxed);
        self.counters.active_tool_calls.fetch_add(1, Ordering::Relaxed);

        // ── Send the request; a full channel means the edge is behind ──
        let frame = CoreFrame::ToolRequest {
            execution_id: exec_id.clone(),
            run_id: opts.run_id.clone(),
            session_id: opts.session_id.clone(),
            tool_name: tool_name.to_owned(),
            input,
            timeout_seconds: timeout.as_secs(),
            approved: opts.approved,
            metadata: opts.metadata.clone(),
        };
        if let Err(err) = conn.outbound.try_send(frame) {
            self.take_pending(&exec_id);
            return match err {
                mpsc::error::TrySendError::Full(_) => {
                    self.counters
                        .overload_rejections
                        .fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(edge_id = %edge_id, tool = %tool_name, "edge daemon overloaded");
                    Err(Error::ToolFailed {
                        tool: tool_name.to_owned(),
                        message: "edge daemon overloaded".into(),
                        retryable: true,
                    })
                }
                mpsc::error::TrySendError::Closed(_) => {
                    Err(Error::EdgeNotFound(format!("edge '{edge_id}' disconnected")))
                }
            };
        }

        self.events.record(
            Event::builder(event_types::TOOL_STARTED)
                .edge_id(edge_id)
                .run_id(&opts.run_id)
                .session_id(&opts.session_id)
                .name(tool_name)
                .tool_call_id(&exec_id)
                .build(),
        );

        // ── Wait: result vs timeout vs caller cancellation ────────
        tokio::select! {
            result = &mut result_rx => match result {
                Ok(result) => Ok(result),
                Err(_) => Err(Error::ToolFailed {
                    tool: tool_name.to_owned(),
                    message: "tool execution failed: edge disconnected".into(),
                    retryable: false,
                }),
            },
            _ = tokio::time::sleep(timeout) => {
                self.take_pending(&exec_id);
                self.counters.tool_timeouts.fetch_add(1, Ordering::Relaxed);
                self.counters.failed_tool_calls.fetch_add(1, Ordering::Relaxed);
                self.send_cancel_frame(&conn, &exec_id, "timeout");
                self.events.record(
                    Event::builder(event_types::TOOL_CANCELLED)
                        .edge_id(edge_id)
                        .name(tool_name)
                        .tool_call_id(&exec_id)
                        .error("timeout")
                        .build(),
                );
                Err(Error::ToolTimeout {
                    tool: tool_name.to_owned(),
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            _ = cancel.cancelled() => {
                self.take_pending(&exec_id);
                self.send_cancel_frame(&conn, &exec_id, "cancelled by caller");
                self.events.record(
                    Event::builder(event_types::TOOL_CANCELLED)
                        .edge_id(edge_id)
                        .name(tool_name)
                        .tool_call_id(&exec_id)
                        .error("cancelled")
                        .build(),
                );
                Err(Error::Cancelled(format!("tool '{tool_name}' cancelled")))
            }
        }
    }

    /// Best-effort `ToolCancel`; whether the edge aborts in-flight work is
    /// an edge-implementation concern.
    fn send_cancel_frame(&self, conn: &EdgeConnection, exec_id: &str, reason: &str) {
        let frame = CoreFrame::ToolCancel {
            execution_id: exec_id.to_owned(),
            reason: reason.to_owned(),
        };
        if conn.outbound.try_send(frame).is_err() {
            tracing::debug!(exec_id = %exec_id, "could not deliver tool cancel");
        }
    }

    /// Remove a pending execution from the global and per-edge indices.
    /// The single place the active counter is decremented.
    fn take_pending(&self, exec_id: &str) -> Option<PendingTool> {
        let pending = self.pending_tools.lock().remove(exec_id)?;
        if let Some(conn) = self.edges.read().get(&pending.meta.edge_id).cloned() {
            conn.state.lock().active_tools.remove(exec_id);
        }
        self.counters.active_tool_calls.fetch_sub(1, Ordering::Relaxed);
        Some(pending)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Channel outbound
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Deliver an outbound channel message and wait for the edge's ack.
    /// No default timeout — the caller bounds the wait via `cancel`.
    pub async fn send_channel_message(
        &self,
        cancel: &CancellationToken,
        edge_id: &str,
        msg: ChannelOutbound,
    ) -> Result<String> {
        let conn = self
            .edges
            .read()
            .get(edge_id)
            .cloned()
            .ok_or_else(|| Error::EdgeNotFound(edge_id.to_owned()))?;

        let message_id = msg.message_id.clone();
        let (ack_tx, ack_rx) = oneshot::channel();
        self.pending_channel_msgs
            .lock()
            .insert(message_id.clone(), ack_tx);

        let send = conn.outbound.send(CoreFrame::ChannelOutbound(msg));
        tokio::select! {
            sent = send => {
                if sent.is_err() {
                    self.pending_channel_msgs.lock().remove(&message_id);
                    return Err(Error::EdgeNotFound(format!("edge '{edge_id}' disconnected")));
                }
            }
            _ = cancel.cancelled() => {
                self.pending_channel_msgs.lock().remove(&message_id);
                return Err(Error::Cancelled("channel send cancelled".into()));
            }
        }

        self.events.record(
            Event::builder(event_types::CHANNEL_OUTBOUND)
                .edge_id(edge_id)
                .message_id(&message_id)
                .build(),
        );

        tokio::select! {
            ack = ack_rx => ack.map_err(|_| Error::EdgeNotFound(
                format!("edge '{edge_id}' disconnected before ack"),
            )),
            _ = cancel.cancelled() => {
                self.pending_channel_msgs.lock().remove(&message_id);
                Err(Error::Cancelled("channel ack wait cancelled".into()))
            }
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Selection & observability
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Pick an edge satisfying the criteria.
    pub fn select_edge(&self, criteria: &SelectionCriteria) -> Result<EdgeInfo> {
        let mut candidates: Vec<Arc<EdgeConnection>> = self
            .edges
            .read()
            .values()
            .filter(|conn| matches_criteria(conn, criteria))
            .cloned()
            .collect();
        if candidates.is_empty() {
            return Err(Error::EdgeNotFound("no candidates".into()));
        }
        // Stable candidate order.
        candidates.sort_by(|a, b| {
            a.connected_at
                .cmp(&b.connected_at)
                .then_with(|| a.edge_id.cmp(&b.edge_id))
        });

        let picked = match criteria.strategy {
            SelectionStrategy::LeastBusy => candidates
                .iter()
                .enumerate()
                .min_by_key(|(i, c)| (c.active_tool_count(), *i))
                .map(|(_, c)| c.clone())
                .unwrap_or_else(|| candidates[0].clone()),
            SelectionStrategy::RoundRobin => {
                let n = self.round_robin.fetch_add(1, Ordering::Relaxed);
                candidates[(n % candidates.len() as u64) as usize].clone()
            }
            SelectionStrategy::Random => {
                let idx = rand::thread_rng().gen_range(0..candidates.len());
                candidates[idx].clone()
            }
        };
        Ok(picked.info())
    }

    pub fn get_edge(&self, edge_id: &str) -> Option<EdgeInfo> {
        self.edges.read().get(edge_id).map(|c| c.info())
    }

    /// Every `(edge_id, tool)` pair currently available, for building the
    /// model-facing tool catalog.
    pub fn edge_tool_specs(&self) -> Vec<(String, EdgeToolSpec)> {
        let conns: Vec<Arc<EdgeConnection>> = self.edges.read().values().cloned().collect();
        let mut specs = Vec::new();
        for conn in conns {
            let state = conn.state.lock();
            for spec in state.tools.values() {
                specs.push((conn.edge_id.clone(), spec.clone()));
            }
        }
        specs.sort_by(|a, b| (&a.0, &a.1.name).cmp(&(&b.0, &b.1.name)));
        specs
    }

    pub fn list_edges(&self) -> Vec<EdgeInfo> {
        let mut infos: Vec<EdgeInfo> = self.edges.read().values().map(|c| c.info()).collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }

    pub fn edge_count(&self) -> usize {
        self.edges.read().len()
    }

    /// In-flight executions across all edges (observability).
    pub fn pending_tool_count(&self) -> usize {
        self.pending_tools.lock().len()
    }

    pub fn metrics(&self) -> EdgeManagerMetrics {
        EdgeManagerMetrics {
            edges_connected: self.edge_count(),
            total_tool_calls: self.counters.total_tool_calls.load(Ordering::Relaxed),
            active_tool_calls: self.counters.active_tool_calls.load(Ordering::Relaxed),
            failed_tool_calls: self.counters.failed_tool_calls.load(Ordering::Relaxed),
            tool_timeouts: self.counters.tool_timeouts.load(Ordering::Relaxed),
            events_dropped: self.counters.events_dropped.load(Ordering::Relaxed),
            overload_rejections: self.counters.overload_rejections.load(Ordering::Relaxed),
        }
    }

    /// Cancel edges whose last heartbeat is older than the liveness
    /// timeout. Their serve loops observe the cancellation and run the
    /// normal teardown. Returns how many were swept.
    pub fn sweep_stale(&self) -> usize {
        let timeout = chrono::Duration::seconds(self.config.liveness_timeout_secs as i64);
        let now = Utc::now();
        let stale: Vec<Arc<EdgeConnection>> = self
            .edges
            .read()
            .values()
            .filter(|conn| now - conn.state.lock().last_heartbeat > timeout)
            .cloned()
            .collect();
        for conn in &stale {
            tracing::warn!(edge_id = %conn.edge_id, "edge missed heartbeats, disconnecting");
            conn.cancel.cancel();
        }
        stale.len()
    }
}

fn registered_err(edge_id: &str, error: &str) -> CoreFrame {
    CoreFrame::Registered {
        success: false,
        edge_id: edge_id.to_owned(),
        heartbeat_interval_seconds: 0,
        core_version: env!("CARGO_PKG_VERSION").to_string(),
        error: Some(error.to_owned()),
    }
}

fn matches_criteria(conn: &EdgeConnection, criteria: &SelectionCriteria) -> bool {
    let caps = &conn.capabilities;
    if criteria.require_tools && !caps.tools {
        return false;
    }
    if criteria.require_channels && !caps.channels {
        return false;
    }
    if criteria.require_streaming && !caps.streaming {
        return false;
    }
    if criteria.require_artifacts && !caps.artifacts {
        return false;
    }
    if let Some(channel) = &criteria.channel_type {
        if !conn.channel_types.iter().any(|c| c == channel) {
            return false;
        }
    }
    for (key, value) in &criteria.metadata {
        if conn.metadata.get(key) != Some(value) {
            return false;
        }
    }
    if let Some(tool) = &criteria.tool_name {
        if !conn.state.lock().tools.contains_key(tool) {
            return false;
        }
    }
    true
}
