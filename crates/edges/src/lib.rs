//! The edge orchestration plane.
//!
//! Owns the set of connected edge daemons: authenticates registrations,
//! tracks heartbeats, dispatches per-tool-call execution requests with
//! timeouts and cancellation, selects edges by capability, and routes
//! inbound channel messages and acks.

mod auth;
mod connection;
mod manager;
mod selection;

pub use auth::{
    token_eq, Authenticator, CompositeAuthenticator, DevAuthenticator, TofuAuthenticator,
    TokenAuthenticator,
};
pub use connection::{EdgeInfo, EdgeStatus, EdgeToolResult, PendingToolInfo};
pub use manager::{
    ArtifactPolicy, ChannelHandler, EdgeEvent, EdgeManager, EdgeManagerMetrics, ExecuteOptions,
};
pub use selection::{SelectionCriteria, SelectionStrategy};
