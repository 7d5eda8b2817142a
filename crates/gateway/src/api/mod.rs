//! The edge-facing HTTP surface. Deliberately small: the control plane
//! lives elsewhere; this router only exposes the edge WebSocket endpoint
//! and a liveness probe.

pub mod edges;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/v1/edges/ws", get(edges::edge_ws))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}
