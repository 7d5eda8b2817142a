use std::sync::Arc;

use mg_context::{ContextPacker, ContextPruner, Summarizer};
use mg_domain::config::Config;
use mg_edges::EdgeManager;
use mg_events::EventStore;
use mg_executor::{ParallelToolExecutor, ToolRegistry};
use mg_naming::NamingRegistry;
use mg_providers::FailoverDispatcher;
use mg_sessions::MemorySessionStore;

use crate::runtime::steering::SteeringQueue;

/// Shared application state passed to all handlers and the turn loop.
///
/// Grouped by concern:
/// - **Edge plane** — connected edges and their tool dispatch
/// - **Agent side** — model dispatcher, context shaping, local tools
/// - **Bookkeeping** — sessions, naming, steering, events
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── Edge plane ────────────────────────────────────────────────
    pub edges: Arc<EdgeManager>,

    // ── Agent side ────────────────────────────────────────────────
    pub dispatcher: Arc<FailoverDispatcher>,
    pub packer: Arc<ContextPacker>,
    pub pruner: Arc<ContextPruner>,
    /// `None` when no summary provider is configured.
    pub summarizer: Option<Arc<Summarizer>>,
    pub local_tools: Arc<ToolRegistry>,
    pub executor: Arc<ParallelToolExecutor>,

    // ── Bookkeeping ───────────────────────────────────────────────
    pub sessions: Arc<MemorySessionStore>,
    pub naming: Arc<NamingRegistry>,
    pub steering: Arc<SteeringQueue>,
    pub events: Arc<EventStore>,
}
