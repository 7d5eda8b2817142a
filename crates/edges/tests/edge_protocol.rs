//! Integration tests driving the full edge protocol loop through an
//! in-process frame transport: registration handshake, tool execution
//! round-trips, timeouts and cancellation, replace-on-reconnect, channel
//! acks, and selection.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use mg_domain::config::EdgesConfig;
use mg_domain::Error;
use mg_edges::{
    DevAuthenticator, EdgeManager, ExecuteOptions, SelectionCriteria, SelectionStrategy,
    TokenAuthenticator,
};
use mg_events::EventStore;
use mg_protocol::{
    ChannelOutbound, CoreFrame, EdgeCapabilities, EdgeFrame, EdgeMetrics, EdgeToolSpec,
};

// ── Harness ─────────────────────────────────────────────────────────

/// The edge half of an in-process connection.
struct FakeEdge {
    /// Frames this edge sends to the core.
    to_core: mpsc::Sender<EdgeFrame>,
    /// Frames the core sent to this edge.
    from_core: mpsc::Receiver<CoreFrame>,
    serve_task: tokio::task::JoinHandle<mg_domain::Result<()>>,
}

impl FakeEdge {
    /// Connect and register, returning after the `Registered` ack.
    async fn register(
        manager: Arc<EdgeManager>,
        edge_id: &str,
        tools: Vec<EdgeToolSpec>,
    ) -> Self {
        Self::register_full(manager, edge_id, "token", tools, vec![], HashMap::new()).await
    }

    async fn register_full(
        manager: Arc<EdgeManager>,
        edge_id: &str,
        token: &str,
        tools: Vec<EdgeToolSpec>,
        channel_types: Vec<String>,
        metadata: HashMap<String, String>,
    ) -> Self {
        let (to_core, inbound) = mpsc::channel(16);
        let (outbound, from_core) = mpsc::channel(manager.outbound_capacity());

        let mgr = manager.clone();
        let serve_task = tokio::spawn(async move { mgr.serve(inbound, outbound).await });

        to_core
            .send(EdgeFrame::Register {
                edge_id: edge_id.into(),
                name: format!("{edge_id} daemon"),
                auth_token: token.into(),
                tools,
                channel_types,
                capabilities: EdgeCapabilities {
                    tools: true,
                    channels: true,
                    streaming: false,
                    artifacts: false,
                },
                version: "0.1.0".into(),
                metadata,
            })
            .await
            .unwrap();

        let mut edge = Self {
            to_core,
            from_core,
            serve_task,
        };
        match edge.next_frame().await {
            CoreFrame::Registered { success: true, .. } => {}
            other => panic!("expected successful Registered, got {other:?}"),
        }
        edge
    }

    async fn next_frame(&mut self) -> CoreFrame {
        tokio::time::timeout(Duration::from_secs(5), self.from_core.recv())
            .await
            .expect("timed out waiting for core frame")
            .expect("core closed the connection")
    }

    async fn send(&self, frame: EdgeFrame) {
        self.to_core.send(frame).await.unwrap();
    }

    /// Drop the edge side of the stream, simulating a disconnect.
    async fn disconnect(self) {
        drop(self.to_core);
        let _ = tokio::time::timeout(Duration::from_secs(5), self.serve_task).await;
    }
}

fn tool_spec(name: &str, timeout_seconds: u64) -> EdgeToolSpec {
    EdgeToolSpec {
        name: name.into(),
        description: format!("{name} tool"),
        input_schema: serde_json::json!({"type": "object"}),
        requires_approval: false,
        timeout_seconds,
        produces_artifacts: false,
    }
}

fn manager() -> Arc<EdgeManager> {
    manager_with(EdgesConfig::default())
}

fn manager_with(config: EdgesConfig) -> Arc<EdgeManager> {
    Arc::new(EdgeManager::new(
        config,
        Arc::new(DevAuthenticator),
        Arc::new(EventStore::new(1_000)),
    ))
}

fn opts() -> ExecuteOptions {
    ExecuteOptions {
        run_id: "r1".into(),
        session_id: "s1".into(),
        ..Default::default()
    }
}

// ── Registration lifecycle ──────────────────────────────────────────

#[tokio::test]
async fn first_frame_must_be_registration() {
    let manager = manager();
    let (to_core, inbound) = mpsc::channel(4);
    let (outbound, mut from_core) = mpsc::channel(4);

    let mgr = manager.clone();
    let serve = tokio::spawn(async move { mgr.serve(inbound, outbound).await });

    to_core
        .send(EdgeFrame::Heartbeat {
            edge_id: "e1".into(),
            timestamp: 0,
            metrics: EdgeMetrics::default(),
        })
        .await
        .unwrap();

    match from_core.recv().await.unwrap() {
        CoreFrame::Registered { success, error, .. } => {
            assert!(!success);
            assert_eq!(error.unwrap(), "first message must be registration");
        }
        other => panic!("unexpected frame {other:?}"),
    }
    assert!(serve.await.unwrap().is_err());
    assert_eq!(manager.edge_count(), 0);
}

#[tokio::test]
async fn failed_auth_sends_error_ack_and_closes() {
    let mut tokens = HashMap::new();
    tokens.insert("mac1".to_string(), "right".to_string());
    let manager = Arc::new(EdgeManager::new(
        EdgesConfig::default(),
        Arc::new(TokenAuthenticator::new(tokens)),
        Arc::new(EventStore::new(100)),
    ));

    let (to_core, inbound) = mpsc::channel(4);
    let (outbound, mut from_core) = mpsc::channel(4);
    let mgr = manager.clone();
    let serve = tokio::spawn(async move { mgr.serve(inbound, outbound).await });

    to_core
        .send(EdgeFrame::Register {
            edge_id: "mac1".into(),
            name: "mac".into(),
            auth_token: "wrong".into(),
            tools: vec![],
            channel_types: vec![],
            capabilities: EdgeCapabilities::default(),
            version: "0.1.0".into(),
            metadata: HashMap::new(),
        })
        .await
        .unwrap();

    match from_core.recv().await.unwrap() {
        CoreFrame::Registered { success, error, .. } => {
            assert!(!success);
            assert!(error.unwrap().contains("invalid token"));
        }
        other => panic!("unexpected frame {other:?}"),
    }
    assert!(serve.await.unwrap().is_err());
    assert_eq!(manager.edge_count(), 0);
}

#[tokio::test]
async fn register_lists_edge_with_tools() {
    let manager = manager();
    let edge = FakeEdge::register(
        manager.clone(),
        "mac1",
        vec![tool_spec("notes_search", 30), tool_spec("clipboard", 0)],
    )
    .await;

    let info = manager.get_edge("mac1").expect("edge should be listed");
    assert_eq!(info.tools, vec!["clipboard", "notes_search"]);
    assert_eq!(info.active_tools, 0);
    assert_eq!(manager.list_edges().len(), 1);

    edge.disconnect().await;
    assert_eq!(manager.edge_count(), 0);
}

#[tokio::test]
async fn reconnect_replaces_old_connection() {
    let manager = manager();
    let first = FakeEdge::register(manager.clone(), "mac1", vec![tool_spec("a", 0)]).await;
    let _second = FakeEdge::register(
        manager.clone(),
        "mac1",
        vec![tool_spec("a", 0), tool_spec("b", 0)],
    )
    .await;

    // Still exactly one edge, now with the new tool set.
    assert_eq!(manager.edge_count(), 1);
    let info = manager.get_edge("mac1").unwrap();
    assert_eq!(info.tools.len(), 2);

    // The first serve loop observed its cancellation and exited without
    // tearing down the replacement.
    let _ = tokio::time::timeout(Duration::from_secs(5), first.serve_task)
        .await
        .expect("old serve loop should exit");
    assert_eq!(manager.edge_count(), 1);
}

// ── Tool execution ──────────────────────────────────────────────────

#[tokio::test]
async fn tool_round_trip() {
    let manager = manager();
    let mut edge = FakeEdge::register(manager.clone(), "mac1", vec![tool_spec("echo", 30)]).await;

    let mgr = manager.clone();
    let exec = tokio::spawn(async move {
        mgr.execute_tool(
            &CancellationToken::new(),
            "mac1",
            "echo",
            serde_json::json!({"text": "hi"}),
            opts(),
        )
        .await
    });

    // The edge receives the request and answers.
    let exec_id = match edge.next_frame().await {
        CoreFrame::ToolRequest {
            execution_id,
            tool_name,
            input,
            run_id,
            ..
        } => {
            assert_eq!(tool_name, "echo");
            assert_eq!(run_id, "r1");
            assert_eq!(input, serde_json::json!({"text": "hi"}));
            execution_id
        }
        other => panic!("expected ToolRequest, got {other:?}"),
    };
    edge.send(EdgeFrame::ToolResult {
        execution_id: exec_id.clone(),
        content: "hi".into(),
        is_error: false,
        duration_ms: 3,
        artifacts: vec![],
        error_details: None,
    })
    .await;

    let result = exec.await.unwrap().unwrap();
    assert_eq!(result.execution_id, exec_id);
    assert_eq!(result.content, "hi");
    assert!(!result.is_error);

    let metrics = manager.metrics();
    assert_eq!(metrics.total_tool_calls, 1);
    assert_eq!(metrics.active_tool_calls, 0);
    assert_eq!(manager.pending_tool_count(), 0);
}

#[tokio::test]
async fn unknown_tool_is_rejected() {
    let manager = manager();
    let _edge = FakeEdge::register(manager.clone(), "mac1", vec![tool_spec("echo", 0)]).await;

    let err = manager
        .execute_tool(
            &CancellationToken::new(),
            "mac1",
            "missing",
            serde_json::json!({}),
            opts(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ToolNotFound(_)));

    let err = manager
        .execute_tool(
            &CancellationToken::new(),
            "ghost",
            "echo",
            serde_json::json!({}),
            opts(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EdgeNotFound(_)));
}

#[tokio::test]
async fn call_timeout_beats_declared_timeout_and_sends_cancel() {
    let manager = manager();
    // The tool declares 30s but the call caps it far lower.
    let mut edge =
        FakeEdge::register(manager.clone(), "mac1", vec![tool_spec("slow_task", 30)]).await;

    let mut call_opts = opts();
    call_opts.timeout = Some(Duration::from_millis(50));
    let mgr = manager.clone();
    let exec = tokio::spawn(async move {
        mgr.execute_tool(
            &CancellationToken::new(),
            "mac1",
            "slow_task",
            serde_json::json!({}),
            call_opts,
        )
        .await
    });

    // Swallow the request, never answer.
    let exec_id = match edge.next_frame().await {
        CoreFrame::ToolRequest {
            execution_id,
            timeout_seconds,
            ..
        } => {
            assert_eq!(timeout_seconds, 0, "50ms rounds down to 0s on the wire");
            execution_id
        }
        other => panic!("expected ToolRequest, got {other:?}"),
    };

    let err = exec.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::ToolTimeout { .. }));

    // A best-effort ToolCancel went out.
    match edge.next_frame().await {
        CoreFrame::ToolCancel {
            execution_id,
            reason,
        } => {
            assert_eq!(execution_id, exec_id);
            assert_eq!(reason, "timeout");
        }
        other => panic!("expected ToolCancel, got {other:?}"),
    }

    // Bookkeeping balanced, edge still connected.
    let metrics = manager.metrics();
    assert_eq!(metrics.active_tool_calls, 0);
    assert_eq!(metrics.tool_timeouts, 1);
    assert!(manager.get_edge("mac1").is_some());
    assert_eq!(manager.pending_tool_count(), 0);
}

#[tokio::test]
async fn caller_cancellation_cleans_up() {
    let manager = manager();
    let mut edge = FakeEdge::register(manager.clone(), "mac1", vec![tool_spec("echo", 30)]).await;

    let cancel = CancellationToken::new();
    let c2 = cancel.clone();
    let mgr = manager.clone();
    let exec = tokio::spawn(async move {
        mgr.execute_tool(&c2, "mac1", "echo", serde_json::json!({}), opts())
            .await
    });

    let _ = edge.next_frame().await; // the ToolRequest
    cancel.cancel();

    let err = exec.await.unwrap().unwrap_err();
    assert!(matches!(err, Error::Cancelled(_)));
    match edge.next_frame().await {
        CoreFrame::ToolCancel { reason, .. } => assert!(reason.contains("cancelled")),
        other => panic!("expected ToolCancel, got {other:?}"),
    }
    assert_eq!(manager.metrics().active_tool_calls, 0);
}

#[tokio::test]
async fn disconnect_fails_pending_waiters() {
    let manager = manager();
    let mut edge = FakeEdge::register(manager.clone(), "mac1", vec![tool_spec("echo", 30)]).await;

    let mgr = manager.clone();
    let exec = tokio::spawn(async move {
        mgr.execute_tool(
            &CancellationToken::new(),
            "mac1",
            "echo",
            serde_json::json!({}),
            opts(),
        )
        .await
    });

    let _ = edge.next_frame().await;
    assert_eq!(manager.pending_tool_count(), 1);
    edge.disconnect().await;

    let err = exec.await.unwrap().unwrap_err();
    assert!(err.to_string().contains("edge disconnected"));

    // No pending record survives removal.
    assert_eq!(manager.pending_tool_count(), 0);
    assert_eq!(manager.metrics().active_tool_calls, 0);
    assert_eq!(manager.edge_count(), 0);
}

#[tokio::test]
async fn overloaded_edge_rejects_requests() {
    let mut config = EdgesConfig::default();
    config.outbound_capacity = 1;
    let manager = manager_with(config);
    let mut edge = FakeEdge::register(manager.clone(), "mac1", vec![tool_spec("echo", 30)]).await;

    // First request occupies the only outbound slot (the edge reads
    // nothing). The second must be rejected as overload.
    let mgr = manager.clone();
    let first = tokio::spawn(async move {
        mgr.execute_tool(
            &CancellationToken::new(),
            "mac1",
            "echo",
            serde_json::json!({}),
            ExecuteOptions {
                timeout: Some(Duration::from_secs(5)),
                ..opts()
            },
        )
        .await
    });
    // Wait until the frame is actually queued.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = manager
        .execute_tool(
            &CancellationToken::new(),
            "mac1",
            "echo",
            serde_json::json!({}),
            opts(),
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("edge daemon overloaded"));
    assert_eq!(manager.metrics().overload_rejections, 1);

    // Drain and answer the first request so the task finishes cleanly.
    if let CoreFrame::ToolRequest { execution_id, .. } = edge.next_frame().await {
        edge.send(EdgeFrame::ToolResult {
            execution_id,
            content: "ok".into(),
            is_error: false,
            duration_ms: 1,
            artifacts: vec![],
            error_details: None,
        })
        .await;
    }
    assert!(first.await.unwrap().is_ok());
}

// ── Heartbeats, events, channels ────────────────────────────────────

#[tokio::test]
async fn heartbeat_updates_liveness_and_metrics() {
    let manager = manager();
    let edge = FakeEdge::register(manager.clone(), "mac1", vec![]).await;

    let before = manager.get_edge("mac1").unwrap().last_heartbeat;
    tokio::time::sleep(Duration::from_millis(10)).await;
    edge.send(EdgeFrame::Heartbeat {
        edge_id: "mac1".into(),
        timestamp: 42,
        metrics: EdgeMetrics {
            cpu_percent: 12.5,
            memory_mb: 256,
            active_executions: 1,
            uptime_seconds: 60,
        },
    })
    .await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let info = manager.get_edge("mac1").unwrap();
    assert!(info.last_heartbeat > before);
    assert_eq!(info.metrics.memory_mb, 256);
}

#[tokio::test]
async fn edge_events_flow_and_drop_on_overflow() {
    let mut config = EdgesConfig::default();
    config.event_capacity = 2;
    let manager = manager_with(config);
    let mut events = manager.take_event_receiver().unwrap();
    let edge = FakeEdge::register(manager.clone(), "mac1", vec![]).await;

    for i in 0..5 {
        edge.send(EdgeFrame::Event {
            kind: "battery_low".into(),
            timestamp: i,
            data: HashMap::new(),
        })
        .await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Two delivered, the rest dropped with a counter bump.
    assert_eq!(events.recv().await.unwrap().kind, "battery_low");
    assert_eq!(events.recv().await.unwrap().kind, "battery_low");
    assert_eq!(manager.metrics().events_dropped, 3);
}

#[tokio::test]
async fn channel_ack_round_trip() {
    let manager = manager();
    let mut edge = FakeEdge::register_full(
        manager.clone(),
        "mac1",
        "token",
        vec![],
        vec!["imessage".into()],
        HashMap::new(),
    )
    .await;

    let mgr = manager.clone();
    let send = tokio::spawn(async move {
        mgr.send_channel_message(
            &CancellationToken::new(),
            "mac1",
            ChannelOutbound {
                message_id: "m1".into(),
                session_id: "s1".into(),
                channel_type: "imessage".into(),
                channel_id: "chat42".into(),
                body: "hello".into(),
                metadata: HashMap::new(),
            },
        )
        .await
    });

    match edge.next_frame().await {
        CoreFrame::ChannelOutbound(out) => {
            assert_eq!(out.message_id, "m1");
            edge.send(EdgeFrame::ChannelAck {
                message_id: "m1".into(),
                status: "delivered".into(),
            })
            .await;
        }
        other => panic!("expected ChannelOutbound, got {other:?}"),
    }

    assert_eq!(send.await.unwrap().unwrap(), "delivered");
}

// ── Selection ───────────────────────────────────────────────────────

#[tokio::test]
async fn selection_filters_and_strategies() {
    let manager = manager();
    let mut meta_eu = HashMap::new();
    meta_eu.insert("region".to_string(), "eu".to_string());

    let _a = FakeEdge::register_full(
        manager.clone(),
        "edge-a",
        "token",
        vec![tool_spec("fs_read", 0)],
        vec!["telegram".into()],
        meta_eu,
    )
    .await;
    let _b = FakeEdge::register_full(
        manager.clone(),
        "edge-b",
        "token",
        vec![tool_spec("fs_read", 0), tool_spec("notes", 0)],
        vec![],
        HashMap::new(),
    )
    .await;

    // Tool filter: only edges exposing "notes".
    let picked = manager
        .select_edge(&SelectionCriteria::for_tool("notes"))
        .unwrap();
    assert_eq!(picked.id, "edge-b");

    // Channel filter.
    let picked = manager
        .select_edge(&SelectionCriteria::for_channel("telegram"))
        .unwrap();
    assert_eq!(picked.id, "edge-a");

    // Metadata filter.
    let picked = manager
        .select_edge(&SelectionCriteria::for_tool("fs_read").with_metadata("region", "eu"))
        .unwrap();
    assert_eq!(picked.id, "edge-a");

    // No candidates.
    let err = manager
        .select_edge(&SelectionCriteria::for_tool("nothing"))
        .unwrap_err();
    assert!(err.to_string().contains("no candidates"));

    // Round-robin cycles over the stable candidate order.
    let criteria = SelectionCriteria::for_tool("fs_read").with_strategy(SelectionStrategy::RoundRobin);
    let first = manager.select_edge(&criteria).unwrap().id;
    let second = manager.select_edge(&criteria).unwrap().id;
    let third = manager.select_edge(&criteria).unwrap().id;
    assert_ne!(first, second);
    assert_eq!(first, third);

    // Random stays within the candidate set.
    let criteria = SelectionCriteria::for_tool("fs_read").with_strategy(SelectionStrategy::Random);
    for _ in 0..8 {
        let id = manager.select_edge(&criteria).unwrap().id;
        assert!(id == "edge-a" || id == "edge-b");
    }
}

#[tokio::test]
async fn least_busy_prefers_idle_edge() {
    let manager = manager();
    let mut busy =
        FakeEdge::register(manager.clone(), "busy", vec![tool_spec("echo", 30)]).await;
    let _idle = FakeEdge::register(manager.clone(), "idle", vec![tool_spec("echo", 30)]).await;

    // Put one in-flight call on "busy".
    let mgr = manager.clone();
    let inflight = tokio::spawn(async move {
        mgr.execute_tool(
            &CancellationToken::new(),
            "busy",
            "echo",
            serde_json::json!({}),
            ExecuteOptions {
                timeout: Some(Duration::from_secs(5)),
                ..opts()
            },
        )
        .await
    });
    let exec_id = match busy.next_frame().await {
        CoreFrame::ToolRequest { execution_id, .. } => execution_id,
        other => panic!("expected ToolRequest, got {other:?}"),
    };

    let picked = manager
        .select_edge(&SelectionCriteria::for_tool("echo"))
        .unwrap();
    assert_eq!(picked.id, "idle");

    busy.send(EdgeFrame::ToolResult {
        execution_id: exec_id,
        content: "done".into(),
        is_error: false,
        duration_ms: 1,
        artifacts: vec![],
        error_details: None,
    })
    .await;
    assert!(inflight.await.unwrap().is_ok());
}

// ── Artifact policy ─────────────────────────────────────────────────

#[tokio::test]
async fn artifact_policy_redacts_before_delivery() {
    use mg_edges::ArtifactPolicy;
    use mg_protocol::Artifact;

    struct StripInlineData;
    impl ArtifactPolicy for StripInlineData {
        fn apply(&self, _edge_id: &str, artifacts: &mut Vec<Artifact>) {
            for artifact in artifacts {
                artifact.data = None;
            }
        }
    }

    let manager = manager();
    manager.set_artifact_policy(Arc::new(StripInlineData));
    let mut edge =
        FakeEdge::register(manager.clone(), "mac1", vec![tool_spec("screenshot", 30)]).await;

    let mgr = manager.clone();
    let exec = tokio::spawn(async move {
        mgr.execute_tool(
            &CancellationToken::new(),
            "mac1",
            "screenshot",
            serde_json::json!({}),
            opts(),
        )
        .await
    });

    let exec_id = match edge.next_frame().await {
        CoreFrame::ToolRequest { execution_id, .. } => execution_id,
        other => panic!("expected ToolRequest, got {other:?}"),
    };
    edge.send(EdgeFrame::ToolResult {
        execution_id: exec_id,
        content: "captured".into(),
        is_error: false,
        duration_ms: 5,
        artifacts: vec![Artifact {
            id: "a1".into(),
            kind: "image".into(),
            mime: "image/png".into(),
            filename: Some("shot.png".into()),
            data: Some("aGVsbG8=".into()),
            reference: None,
        }],
        error_details: None,
    })
    .await;

    let result = exec.await.unwrap().unwrap();
    assert_eq!(result.artifacts.len(), 1);
    assert!(result.artifacts[0].data.is_none(), "inline data must be redacted");
    assert_eq!(result.artifacts[0].id, "a1");
}

// ── Stale sweep ─────────────────────────────────────────────────────

#[tokio::test]
async fn stale_edges_are_swept() {
    let mut config = EdgesConfig::default();
    config.liveness_timeout_secs = 0; // everything is instantly stale
    let manager = manager_with(config);
    let edge = FakeEdge::register(manager.clone(), "mac1", vec![]).await;

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(manager.sweep_stale(), 1);

    let _ = tokio::time::timeout(Duration::from_secs(5), edge.serve_task)
        .await
        .expect("serve loop should exit after sweep");
    assert_eq!(manager.edge_count(), 0);
}
