use serde::Serialize;
use sha2::{Digest, Sha256};

use mg_domain::config::PackerConfig;
use mg_domain::message::Message;

/// Suffix appended to truncated tool-result bodies.
const TRUNCATION_SUFFIX: &str = "\n...[truncated]";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Output types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The packed prompt: `[summary?] + history tail + [incoming?]`, within the
/// char and message budgets.
#[derive(Debug, Clone)]
pub struct PackedPrompt {
    pub messages: Vec<Message>,
    pub used_chars: usize,
    pub used_messages: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackItemKind {
    Summary,
    Tool,
    History,
    Incoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackItemReason {
    /// Budget was reserved up front (incoming, summary).
    Reserved,
    /// Selected during the newest-to-oldest walk.
    Fit,
    /// Dropped once the walk hit either budget.
    OverBudget,
}

/// Per-message packing decision.
#[derive(Debug, Clone, Serialize)]
pub struct PackItem {
    pub kind: PackItemKind,
    pub reason: PackItemReason,
    pub included: bool,
    /// 12-char content hash for correlating without quoting bodies.
    pub id: String,
}

/// Machine-readable packing report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PackDiagnostics {
    pub items: Vec<PackItem>,
    pub candidates: usize,
    pub included: usize,
    pub dropped: usize,
    pub budget_chars: usize,
    pub used_chars: usize,
    pub budget_messages: usize,
    pub used_messages: usize,
    pub summary_used: bool,
    pub summary_chars: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ContextPacker
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Selects a suffix of history plus an optional rolling summary, truncates
/// overlong tool results, and honors char and message budgets.
///
/// Pure: input slices are never mutated; tool-result truncation produces
/// shallow copies.
pub struct ContextPacker {
    config: PackerConfig,
}

impl ContextPacker {
    pub fn new(config: PackerConfig) -> Self {
        Self { config }
    }

    /// Pack a prompt. `incoming` is always included when present; `summary`
    /// is included when enabled and present. History is walked newest to
    /// oldest and the first message that violates either budget stops
    /// selection.
    pub fn pack(
        &self,
        history: &[Message],
        incoming: Option<&Message>,
        summary: Option<&Message>,
    ) -> PackedPrompt {
        self.pack_with_diagnostics(history, incoming, summary).0
    }

    /// Pack and report per-item decisions.
    pub fn pack_with_diagnostics(
        &self,
        history: &[Message],
        incoming: Option<&Message>,
        summary: Option<&Message>,
    ) -> (PackedPrompt, PackDiagnostics) {
        let mut used_chars = 0usize;
        let mut used_messages = 0usize;

        // ── Reserve: incoming, then summary ───────────────────────
        if let Some(inc) = incoming {
            used_chars += inc.estimated_chars();
            used_messages += 1;
        }
        let active_summary = if self.config.include_summary {
            summary
        } else {
            None
        };
        let summary_chars = active_summary.map(Message::estimated_chars).unwrap_or(0);
        if active_summary.is_some() {
            used_chars += summary_chars;
            used_messages += 1;
        }

        // ── Select a contiguous suffix of history ─────────────────
        // Stale summary messages never slip through; they are handled
        // separately via the `summary` argument.
        let candidates: Vec<&Message> = history.iter().filter(|m| !m.is_summary()).collect();

        // Index into `candidates` of the first (oldest) selected message.
        let mut cut = candidates.len();
        for (i, msg) in candidates.iter().enumerate().rev() {
            let chars = msg.estimated_chars();
            if used_chars + chars > self.config.max_chars
                || used_messages + 1 > self.config.max_messages
            {
                break;
            }
            used_chars += chars;
            used_messages += 1;
            cut = i;
        }

        // ── Assemble output, truncating overlong tool results ─────
        let mut messages = Vec::with_capacity(used_messages);
        if let Some(s) = active_summary {
            messages.push(s.clone());
        }
        for msg in &candidates[cut..] {
            messages.push(self.truncated_copy(msg));
        }
        if let Some(inc) = incoming {
            messages.push(inc.clone());
        }

        // ── Diagnostics ───────────────────────────────────────────
        let mut items = Vec::with_capacity(candidates.len() + 2);
        if let Some(s) = active_summary {
            items.push(PackItem {
                kind: PackItemKind::Summary,
                reason: PackItemReason::Reserved,
                included: true,
                id: content_id(s),
            });
        }
        for (i, msg) in candidates.iter().enumerate() {
            let included = i >= cut;
            items.push(PackItem {
                kind: if msg.tool_results.is_empty() {
                    PackItemKind::History
                } else {
                    PackItemKind::Tool
                },
                reason: if included {
                    PackItemReason::Fit
                } else {
                    PackItemReason::OverBudget
                },
                included,
                id: content_id(msg),
            });
        }
        if let Some(inc) = incoming {
            items.push(PackItem {
                kind: PackItemKind::Incoming,
                reason: PackItemReason::Reserved,
                included: true,
                id: content_id(inc),
            });
        }

        let included = candidates.len() - cut;
        let diagnostics = PackDiagnostics {
            items,
            candidates: candidates.len(),
            included,
            dropped: cut,
            budget_chars: self.config.max_chars,
            used_chars,
            budget_messages: self.config.max_messages,
            used_messages,
            summary_used: active_summary.is_some(),
            summary_chars,
        };

        (
            PackedPrompt {
                messages,
                used_chars,
                used_messages,
            },
            diagnostics,
        )
    }

    /// Shallow copy with overlong tool-result bodies truncated. Returns a
    /// plain clone when nothing exceeds the cap.
    fn truncated_copy(&self, msg: &Message) -> Message {
        let cap = self.config.max_tool_result_chars;
        if msg.tool_results.iter().all(|tr| tr.content.len() <= cap) {
            return msg.clone();
        }
        let mut copy = msg.clone();
        for tr in &mut copy.tool_results {
            if tr.content.len() > cap {
                let mut boundary = cap;
                while boundary > 0 && !tr.content.is_char_boundary(boundary) {
                    boundary -= 1;
                }
                tr.content.truncate(boundary);
                tr.content.push_str(TRUNCATION_SUFFIX);
            }
        }
        copy
    }
}

/// 12-char hex hash of a message's content.
fn content_id(msg: &Message) -> String {
    let digest = Sha256::digest(msg.content.as_bytes());
    hex::encode(digest)[..12].to_string()
}
