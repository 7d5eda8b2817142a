//! Tool catalog assembly and batch dispatch for the turn loop.
//!
//! The model sees LLM-safe aliases; this module maps them back to local
//! handlers or edge executions. Local calls go through the parallel
//! executor; edge calls fan out through the edge manager. Results come
//! back in input order either way.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use mg_domain::message::{ToolCall, ToolDefinition};
use mg_edges::ExecuteOptions;
use mg_naming::ToolIdentity;

use crate::state::AppState;

/// Where a safe name leads.
#[derive(Debug, Clone)]
enum ToolRoute {
    Local { tool_name: String },
    Edge { edge_id: String, tool_name: String },
}

/// The per-turn tool surface: definitions for the model plus the reverse
/// mapping from safe alias to destination.
pub struct ToolCatalog {
    pub definitions: Vec<ToolDefinition>,
    routes: HashMap<String, ToolRoute>,
}

/// One dispatched result, paired to its call.
pub struct ToolOutcome {
    pub call_id: String,
    pub tool_name: String,
    pub content: String,
    pub is_error: bool,
}

/// Build the catalog from registered local tools and every connected
/// edge's declared tools. Rebuilt per turn so edge churn is picked up.
pub fn build_catalog(state: &AppState) -> ToolCatalog {
    let mut definitions = Vec::new();
    let mut routes = HashMap::new();

    for def in state.local_tools.definitions() {
        let identity = state
            .naming
            .resolve(&def.name)
            .unwrap_or_else(|| ToolIdentity::core(&def.name));
        routes.insert(
            identity.safe_name.clone(),
            ToolRoute::Local {
                tool_name: def.name.clone(),
            },
        );
        definitions.push(ToolDefinition {
            name: identity.safe_name,
            description: def.description,
            input_schema: def.input_schema,
        });
    }

    for (edge_id, spec) in state.edges.edge_tool_specs() {
        let identity = ToolIdentity::edge(&edge_id, &spec.name);
        routes.insert(
            identity.safe_name.clone(),
            ToolRoute::Edge {
                edge_id,
                tool_name: spec.name.clone(),
            },
        );
        definitions.push(ToolDefinition {
            name: identity.safe_name,
            description: spec.description,
            input_schema: spec.input_schema,
        });
    }

    ToolCatalog {
        definitions,
        routes,
    }
}

impl ToolCatalog {
    /// Dispatch a batch; `outcomes[i]` corresponds to `calls[i]`.
    pub async fn dispatch(
        &self,
        state: &AppState,
        cancel: &CancellationToken,
        run_id: &str,
        session_id: &str,
        calls: &[ToolCall],
    ) -> Vec<ToolOutcome> {
        // Split while remembering original positions.
        let mut local: Vec<(usize, ToolCall)> = Vec::new();
        let mut remote: Vec<(usize, ToolCall, String, String)> = Vec::new();
        let mut outcomes: Vec<Option<ToolOutcome>> = Vec::with_capacity(calls.len());
        outcomes.resize_with(calls.len(), || None);

        for (i, call) in calls.iter().enumerate() {
            match self.routes.get(&call.name) {
                Some(ToolRoute::Local { tool_name }) => {
                    local.push((
                        i,
                        ToolCall {
                            id: call.id.clone(),
                            name: tool_name.clone(),
                            input: call.input.clone(),
                        },
                    ));
                }
                Some(ToolRoute::Edge { edge_id, tool_name }) => {
                    remote.push((i, call.clone(), edge_id.clone(), tool_name.clone()));
                }
                None => {
                    outcomes[i] = Some(ToolOutcome {
                        call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        content: format!("unknown tool: {}", call.name),
                        is_error: true,
                    });
                }
            }
        }

        // Local batch through the executor (already input-ordered).
        let local_calls: Vec<ToolCall> = local.iter().map(|(_, c)| c.clone()).collect();
        let local_results = state.executor.execute_all(cancel, &local_calls).await;
        for ((i, _), result) in local.iter().zip(local_results) {
            let (content, is_error) = match (&result.result, &result.error) {
                (Some(value), _) => (render_value(value), false),
                (None, Some(err)) => (err.to_string(), true),
                (None, None) => ("tool produced no result".to_string(), true),
            };
            outcomes[*i] = Some(ToolOutcome {
                call_id: result.tool_call_id,
                tool_name: result.tool_name,
                content,
                is_error,
            });
        }

        // Edge calls fan out concurrently.
        let remote_futures: Vec<_> = remote
            .iter()
            .map(|(_, call, edge_id, tool_name)| {
                // No per-call override: the tool's declared timeout or the
                // manager default applies.
                let opts = ExecuteOptions {
                    run_id: run_id.to_owned(),
                    session_id: session_id.to_owned(),
                    ..Default::default()
                };
                state
                    .edges
                    .execute_tool(cancel, edge_id, tool_name, call.input.clone(), opts)
            })
            .collect();
        let remote_results = futures_util::future::join_all(remote_futures).await;
        for ((i, call, _, tool_name), result) in remote.iter().zip(remote_results) {
            let (content, is_error) = match result {
                Ok(r) => (r.content, r.is_error),
                Err(err) => (err.to_string(), true),
            };
            outcomes[*i] = Some(ToolOutcome {
                call_id: call.id.clone(),
                tool_name: tool_name.clone(),
                content,
                is_error,
            });
        }

        outcomes
            .into_iter()
            .map(|o| o.expect("every call produces an outcome"))
            .collect()
    }
}

/// Tool results are strings on the wire; unwrap plain JSON strings so the
/// model does not see extra quotes.
fn render_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
