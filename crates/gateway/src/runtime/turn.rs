//! The run loop: pack context, stream a completion, dispatch tool calls,
//! fold results back into history, repeat.
//!
//! Tool failures are reported to the model as error tool-results rather
//! than aborting the conversation; only dispatcher-fatal errors (or the
//! turn budget) end a run early.

use std::collections::HashMap;

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use mg_domain::message::{Message, ToolCall};
use mg_domain::stream::Usage;
use mg_domain::{Error, Result};
use mg_events::{event_types, Event};
use mg_providers::CompletionRequest;
use mg_sessions::SessionStore;

use crate::runtime::tools::{self, ToolOutcome};
use crate::state::AppState;

/// Hard cap on (prompt -> completion -> tool batch) cycles per run.
const MAX_TURNS: usize = 25;

/// Synthetic tool-result body for calls skipped by steering.
const STEERING_SKIP: &str = "Skipped due to steering message";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Input / outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One inbound message to run the agent against.
pub struct RunInput {
    pub session_key: String,
    pub agent_id: String,
    pub channel: String,
    pub channel_id: String,
    pub user_message: String,
    /// Model override passed through to the dispatcher.
    pub model: Option<String>,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub session_id: String,
    pub final_text: String,
    pub turns: usize,
    pub tool_calls_executed: usize,
    pub usage: Usage,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// run
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run the agent for one inbound message, to completion.
pub async fn run(
    state: &AppState,
    cancel: &CancellationToken,
    input: RunInput,
) -> Result<RunOutcome> {
    let session = state
        .sessions
        .get_or_create(
            &input.session_key,
            &input.agent_id,
            &input.channel,
            &input.channel_id,
        )
        .await?;
    let run_id = uuid::Uuid::new_v4().to_string();

    state.events.record(
        Event::builder(event_types::RUN_STARTED)
            .run_id(&run_id)
            .session_id(&session.id)
            .agent_id(&input.agent_id)
            .build(),
    );

    let result = run_inner(state, cancel, &input, &run_id, &session.id).await;

    match &result {
        Ok(outcome) => {
            state.events.record(
                Event::builder(event_types::RUN_COMPLETED)
                    .run_id(&run_id)
                    .session_id(&session.id)
                    .data("turns", serde_json::json!(outcome.turns))
                    .build(),
            );
        }
        Err(err) => {
            state.events.record(
                Event::builder(event_types::RUN_FAILED)
                    .run_id(&run_id)
                    .session_id(&session.id)
                    .error(err.to_string())
                    .build(),
            );
        }
    }
    result
}

async fn run_inner(
    state: &AppState,
    cancel: &CancellationToken,
    input: &RunInput,
    run_id: &str,
    session_id: &str,
) -> Result<RunOutcome> {
    let mut incoming = Some(Message::user(session_id, &input.user_message));
    let mut total_usage = Usage::default();
    let mut tool_calls_executed = 0usize;
    let window_chars = state.config.packer.max_chars;

    for turn_index in 0..MAX_TURNS {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled("run cancelled".into()));
        }

        // ── Shape history: summarize, prune, pack ─────────────────
        let history = state.sessions.get_history(session_id, 0).await?;
        let mut summary = history.iter().rev().find(|m| m.is_summary()).cloned();

        if let Some(summarizer) = &state.summarizer {
            if let Some(fresh) = summarizer
                .summarize(session_id, &history, summary.as_ref())
                .await?
            {
                state.events.record(
                    Event::builder(event_types::SUMMARY_CREATED)
                        .run_id(run_id)
                        .session_id(session_id)
                        .message_id(&fresh.id)
                        .build(),
                );
                state.sessions.append_message(fresh.clone()).await?;
                summary = Some(fresh);
            }
        }

        let pruned = state.pruner.prune(&history, window_chars);
        let packed = state
            .packer
            .pack(&pruned, incoming.as_ref(), summary.as_ref());

        // The incoming message is part of history from here on.
        if let Some(msg) = incoming.take() {
            state.sessions.append_message(msg).await?;
        }

        // ── Completion ────────────────────────────────────────────
        let catalog = tools::build_catalog(state);
        let req = CompletionRequest {
            messages: packed.messages,
            tools: catalog.definitions.clone(),
            model: input.model.clone(),
            ..Default::default()
        };

        state.events.record(
            Event::builder(event_types::TURN_STARTED)
                .run_id(run_id)
                .session_id(session_id)
                .data("turn", serde_json::json!(turn_index))
                .build(),
        );

        let mut stream = state.dispatcher.complete(cancel, &req).await?;
        let mut text_buf = String::new();
        let mut assembler = ToolCallAssembler::default();
        while let Some(chunk) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled("run cancelled mid-stream".into()));
            }
            let chunk = chunk?;
            if let Some(text) = chunk.delta_text {
                text_buf.push_str(&text);
            }
            if let Some(delta) = chunk.tool_call_delta {
                assembler.push(delta);
            }
            if let Some(usage) = chunk.usage {
                total_usage.prompt_tokens += usage.prompt_tokens;
                total_usage.completion_tokens += usage.completion_tokens;
                total_usage.total_tokens += usage.total_tokens;
            }
        }
        let calls = assembler.finish();

        state.events.record(
            Event::builder(event_types::LLM_REQUEST)
                .run_id(run_id)
                .session_id(session_id)
                .data("tool_calls", serde_json::json!(calls.len()))
                .build(),
        );

        // ── Final answer ──────────────────────────────────────────
        if calls.is_empty() {
            state
                .sessions
                .append_message(Message::assistant(session_id, &text_buf))
                .await?;
            return Ok(RunOutcome {
                run_id: run_id.to_owned(),
                session_id: session_id.to_owned(),
                final_text: text_buf,
                turns: turn_index + 1,
                tool_calls_executed,
                usage: total_usage,
            });
        }

        // ── Record the assistant tool-call message ────────────────
        let mut assistant = Message::assistant(session_id, &text_buf);
        assistant.tool_calls = calls.clone();
        state.sessions.append_message(assistant).await?;

        // ── Steering: skip the batch when the user interjects ─────
        let steering = state.steering.get_steering_messages();
        if !steering.is_empty() {
            for call in &calls {
                state
                    .sessions
                    .append_message(Message::tool_result(
                        session_id,
                        &call.id,
                        STEERING_SKIP,
                        true,
                    ))
                    .await?;
            }
            for text in steering {
                state.events.record(
                    Event::builder(event_types::STEERING_INJECTED)
                        .run_id(run_id)
                        .session_id(session_id)
                        .build(),
                );
                state
                    .sessions
                    .append_message(Message::user(session_id, text))
                    .await?;
            }
            continue;
        }

        // ── Execute the batch ─────────────────────────────────────
        let outcomes: Vec<ToolOutcome> = catalog
            .dispatch(state, cancel, run_id, session_id, &calls)
            .await;
        tool_calls_executed += outcomes.len();
        for outcome in outcomes {
            state
                .sessions
                .append_message(Message::tool_result(
                    session_id,
                    &outcome.call_id,
                    &outcome.content,
                    outcome.is_error,
                ))
                .await?;
        }
    }

    Err(Error::BudgetExceeded(format!(
        "run exceeded {MAX_TURNS} turns"
    )))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool-call assembly
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Folds `tool_call_delta` chunks into complete calls, preserving the
/// order in which call ids first appeared.
#[derive(Default)]
struct ToolCallAssembler {
    order: Vec<String>,
    parts: HashMap<String, (Option<String>, String)>,
}

impl ToolCallAssembler {
    fn push(&mut self, delta: mg_domain::stream::ToolCallDelta) {
        if !self.parts.contains_key(&delta.id) {
            self.order.push(delta.id.clone());
            self.parts.insert(delta.id.clone(), (None, String::new()));
        }
        if let Some(entry) = self.parts.get_mut(&delta.id) {
            if let Some(name) = delta.name {
                entry.0 = Some(name);
            }
            if let Some(input) = delta.input_delta {
                entry.1.push_str(&input);
            }
        }
    }

    fn finish(mut self) -> Vec<ToolCall> {
        let mut calls = Vec::with_capacity(self.order.len());
        for id in self.order {
            let Some((name, args)) = self.parts.remove(&id) else {
                continue;
            };
            let Some(name) = name else {
                tracing::warn!(call_id = %id, "tool call stream never named the tool");
                continue;
            };
            let input = if args.trim().is_empty() {
                serde_json::Value::Object(Default::default())
            } else {
                match serde_json::from_str(&args) {
                    Ok(v) => v,
                    Err(err) => {
                        tracing::warn!(
                            call_id = %id,
                            tool = %name,
                            error = %err,
                            "tool call arguments are not valid JSON, defaulting to empty object"
                        );
                        serde_json::Value::Object(Default::default())
                    }
                }
            };
            calls.push(ToolCall {
                id,
                name,
                input,
            });
        }
        calls
    }
}
