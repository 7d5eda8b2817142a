use std::collections::HashMap;

use regex::RegexSet;

use mg_domain::config::{PruningConfig, PruningMode};
use mg_domain::message::{estimate_history_chars, Message, Role};
use mg_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prune policy (allow/deny patterns)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Compiled allow/deny tool-name patterns.
///
/// Patterns support `*` wildcards. Deny wins over allow; with a non-empty
/// allow list, a named tool must match one entry. Results whose tool name
/// is unknown or empty are allowed by default — only an explicit deny can
/// protect them.
pub struct PrunePolicy {
    allow: Option<RegexSet>,
    deny: Option<RegexSet>,
}

impl PrunePolicy {
    pub fn compile(allow: &[String], deny: &[String]) -> Result<Self> {
        Ok(Self {
            allow: compile_set(allow)?,
            deny: compile_set(deny)?,
        })
    }

    /// Whether a tool result with this (possibly unknown) tool name may be
    /// trimmed or cleared.
    pub fn allows(&self, tool_name: Option<&str>) -> bool {
        let name = tool_name.unwrap_or("");
        if let Some(deny) = &self.deny {
            if deny.is_match(name) {
                return false;
            }
        }
        if name.is_empty() {
            return true;
        }
        match &self.allow {
            Some(allow) => allow.is_match(name),
            None => true,
        }
    }
}

fn compile_set(patterns: &[String]) -> Result<Option<RegexSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let regexes: Vec<String> = patterns.iter().map(|p| wildcard_to_regex(p)).collect();
    RegexSet::new(&regexes)
        .map(Some)
        .map_err(|e| Error::Config(format!("bad prune pattern: {e}")))
}

/// Translate a `*` wildcard pattern into an anchored regex.
fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 4);
    out.push('^');
    for ch in pattern.chars() {
        if ch == '*' {
            out.push_str(".*");
        } else {
            out.push_str(&regex::escape(&ch.to_string()));
        }
    }
    out.push('$');
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ContextPruner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Soft-trims or hard-clears old tool results when history occupies too
/// large a fraction of the model window.
///
/// Runs on the whole history before packing. The input slice is never
/// mutated; the output is a new vec sharing untouched messages by clone.
/// The most recent `keep_last_assistants` assistant messages and everything
/// after them are always left alone.
pub struct ContextPruner {
    config: PruningConfig,
    policy: PrunePolicy,
}

impl ContextPruner {
    pub fn new(config: PruningConfig) -> Result<Self> {
        let policy = PrunePolicy::compile(&config.allow, &config.deny)?;
        Ok(Self { config, policy })
    }

    /// Prune a history copy. `context_window_chars` is the model window in
    /// chars (callers use ~4x the token window).
    pub fn prune(&self, history: &[Message], context_window_chars: usize) -> Vec<Message> {
        if self.config.mode == PruningMode::Off {
            return history.to_vec();
        }

        // 1. Protection cutoff: the k-th assistant from the end.
        let Some(cutoff) = protection_cutoff(history, self.config.keep_last_assistants) else {
            return history.to_vec();
        };

        // 2. Prunable region starts at the first user message.
        let Some(start) = history.iter().position(|m| m.role == Role::User) else {
            return history.to_vec();
        };
        if start >= cutoff {
            return history.to_vec();
        }

        // 3. Pressure gate.
        let window = context_window_chars.max(1) as f64;
        let mut total = estimate_history_chars(history);
        if (total as f64) / window < self.config.soft_trim_ratio {
            return history.to_vec();
        }

        // 4. Tool names for policy decisions, from assistant tool-calls
        // across the entire history.
        let names: HashMap<&str, &str> = history
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .flat_map(|m| m.tool_calls.iter())
            .map(|tc| (tc.id.as_str(), tc.name.as_str()))
            .collect();

        let mut out = history.to_vec();

        // Prunable (message, result) refs in registration order.
        let mut refs: Vec<(usize, usize)> = Vec::new();
        for (i, msg) in history.iter().enumerate().take(cutoff).skip(start) {
            if msg.role != Role::Tool {
                continue;
            }
            for (j, tr) in msg.tool_results.iter().enumerate() {
                let name = names.get(tr.tool_call_id.as_str()).copied();
                if self.policy.allows(name) {
                    refs.push((i, j));
                }
            }
        }

        // 5. Soft pass.
        let soft = &self.config.soft_trim;
        for &(i, j) in &refs {
            let body = &out[i].tool_results[j].content;
            if body.len() <= soft.max_chars || soft.head_chars + soft.tail_chars >= body.len() {
                continue;
            }
            let trimmed = soft_trim(body, soft.head_chars, soft.tail_chars);
            total = total - body.len() + trimmed.len();
            out[i].tool_results[j].content = trimmed;
        }

        // 6. Hard-clear gate.
        if !self.config.hard_clear.enabled
            || (total as f64) / window < self.config.hard_clear_ratio
        {
            return out;
        }

        // 7. Not worth clearing a trickle.
        let prunable_sum: usize = refs
            .iter()
            .map(|&(i, j)| out[i].tool_results[j].content.len())
            .sum();
        if prunable_sum < self.config.min_prunable_tool_chars {
            return out;
        }

        // 8. Hard pass, oldest refs first, until under the ratio.
        let placeholder = &self.config.hard_clear.placeholder;
        for &(i, j) in &refs {
            if (total as f64) / window < self.config.hard_clear_ratio {
                break;
            }
            let body_len = out[i].tool_results[j].content.len();
            total = total - body_len + placeholder.len();
            out[i].tool_results[j].content = placeholder.clone();
        }

        out
    }
}

/// Index of the k-th assistant message counting from the end; `None` when
/// fewer than `k` assistants exist (nothing to prune safely).
fn protection_cutoff(messages: &[Message], keep_last_assistants: usize) -> Option<usize> {
    if keep_last_assistants == 0 {
        return Some(messages.len());
    }
    let mut seen = 0usize;
    for (i, msg) in messages.iter().enumerate().rev() {
        if msg.role == Role::Assistant {
            seen += 1;
            if seen >= keep_last_assistants {
                return Some(i);
            }
        }
    }
    None
}

/// `head + "\n...\n" + tail` with an explanatory footer.
fn soft_trim(body: &str, head_chars: usize, tail_chars: usize) -> String {
    let head_end = floor_char_boundary(body, head_chars);
    let tail_start = ceil_char_boundary(body, body.len() - tail_chars);
    let head = &body[..head_end];
    let tail = &body[tail_start..];
    format!(
        "{head}\n...\n{tail}\n[tool result trimmed: {} of {} chars elided]",
        body.len() - head.len() - tail.len(),
        body.len()
    )
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}
