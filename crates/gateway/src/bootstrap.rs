//! Wires the subsystems into a runnable gateway.

use std::sync::Arc;
use std::time::Duration;

use mg_context::{ContextPacker, ContextPruner, Summarizer, SummaryProvider};
use mg_domain::config::{Config, EdgeAuthMode};
use mg_domain::Result;
use mg_edges::{
    Authenticator, DevAuthenticator, EdgeManager, TofuAuthenticator, TokenAuthenticator,
};
use mg_events::EventStore;
use mg_executor::{ParallelToolExecutor, ToolRegistry};
use mg_naming::NamingRegistry;
use mg_providers::{FailoverDispatcher, ModelProvider};
use mg_sessions::MemorySessionStore;

use crate::runtime::steering::SteeringQueue;
use crate::state::AppState;

/// Build the shared state. Model providers (and the optional summary
/// provider) are injected by the caller — provider SDKs live outside the
/// core.
pub fn build_state(
    config: Config,
    providers: Vec<Arc<dyn ModelProvider>>,
    summary_provider: Option<Arc<dyn SummaryProvider>>,
) -> Result<AppState> {
    let config = Arc::new(config);
    let events = Arc::new(EventStore::new(config.events.capacity));

    let auth = build_authenticator(&config);
    let edges = Arc::new(EdgeManager::new(
        config.edges.clone(),
        auth,
        events.clone(),
    ));

    let dispatcher = Arc::new(
        FailoverDispatcher::new(providers, config.dispatcher.clone())
            .with_event_store(events.clone()),
    );

    let local_tools = Arc::new(ToolRegistry::new());
    let executor = Arc::new(ParallelToolExecutor::new(
        local_tools.clone(),
        config.executor.clone(),
    ));

    let summarizer = summary_provider
        .map(|provider| Arc::new(Summarizer::new(config.summarizer.clone(), provider)));

    Ok(AppState {
        edges,
        dispatcher,
        packer: Arc::new(ContextPacker::new(config.packer.clone())),
        pruner: Arc::new(ContextPruner::new(config.pruning.clone())?),
        summarizer,
        local_tools,
        executor,
        sessions: Arc::new(MemorySessionStore::new()),
        naming: Arc::new(NamingRegistry::new()),
        steering: Arc::new(SteeringQueue::new(config.steering.clone())),
        events,
        config,
    })
}

fn build_authenticator(config: &Config) -> Arc<dyn Authenticator> {
    match config.edges.auth {
        EdgeAuthMode::Dev => Arc::new(DevAuthenticator),
        EdgeAuthMode::Token => Arc::new(TokenAuthenticator::new(config.edges.tokens.clone())),
        EdgeAuthMode::Tofu => {
            let tofu = TofuAuthenticator::new().with_on_pending(|edge_id| {
                tracing::warn!(edge_id = %edge_id, "edge awaiting approval");
            });
            for (edge_id, token) in &config.edges.tokens {
                tofu.preapprove(edge_id.clone(), token.clone());
            }
            Arc::new(tofu)
        }
    }
}

/// Periodically disconnect edges that stopped heartbeating.
pub fn spawn_stale_sweeper(state: &AppState) -> tokio::task::JoinHandle<()> {
    let edges = state.edges.clone();
    let interval = Duration::from_secs(state.config.edges.heartbeat_interval_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let swept = edges.sweep_stale();
            if swept > 0 {
                tracing::info!(swept, "stale edge sweep");
            }
        }
    })
}
