//! WebSocket adapter for edge connections.
//!
//! Flow:
//! 1. Edge connects to `GET /v1/edges/ws` and upgrades.
//! 2. The adapter decodes JSON text frames into [`EdgeFrame`]s and pumps
//!    them into [`EdgeManager::serve`]; core frames flow back out.
//! 3. Registration, authentication, and all protocol bookkeeping happen
//!    inside the manager — this file only moves bytes.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use mg_protocol::{CoreFrame, EdgeFrame};

use crate::state::AppState;

/// GET /v1/edges/ws — upgrade to the edge protocol stream.
pub async fn edge_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();

    let (inbound_tx, inbound_rx) = mpsc::channel::<EdgeFrame>(16);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<CoreFrame>(state.edges.outbound_capacity());

    // Writer: core frames -> socket.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(err) => {
                    tracing::warn!(error = %err, "failed to encode core frame");
                    continue;
                }
            };
            if ws_sink.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    });

    // Reader: socket -> decoded edge frames.
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_stream.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<EdgeFrame>(&text) {
                    Ok(frame) => {
                        if inbound_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::debug!(error = %err, "ignoring unparseable edge frame");
                    }
                },
                Message::Close(_) => break,
                // WS-level ping/pong is handled by axum; protocol
                // heartbeats arrive as text frames.
                _ => {}
            }
        }
    });

    // The manager drives the connection to completion.
    if let Err(err) = state.edges.serve(inbound_rx, outbound_tx).await {
        tracing::debug!(error = %err, "edge connection ended with error");
    }

    writer.abort();
    reader.abort();
}
