use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Maximum length of an LLM-safe tool alias.
pub const MAX_SAFE_NAME_LEN: usize = 64;

/// Where a tool lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolSource {
    Core,
    Mcp,
    Edge,
}

impl ToolSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Mcp => "mcp",
            Self::Edge => "edge",
        }
    }
}

/// The fully-resolved identity of a tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolIdentity {
    pub source: ToolSource,
    /// MCP server name or edge id; empty for core tools.
    pub namespace: String,
    pub name: String,
    /// LLM-compatible alias: `[a-z0-9_]+`, at most 64 chars, unique.
    pub safe_name: String,
    /// Globally unique hierarchical id, e.g. `mcp:github.search_issues`.
    pub canonical_name: String,
}

impl ToolIdentity {
    /// Build an identity, deriving the canonical and safe names.
    pub fn new(source: ToolSource, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let name = name.into();
        let canonical_name = canonicalize(source, &namespace, &name);
        let safe_name = derive_safe_name(source, &namespace, &name);
        Self {
            source,
            namespace,
            name,
            safe_name,
            canonical_name,
        }
    }

    pub fn core(name: impl Into<String>) -> Self {
        Self::new(ToolSource::Core, "", name)
    }

    pub fn mcp(server: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ToolSource::Mcp, server, name)
    }

    pub fn edge(edge_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(ToolSource::Edge, edge_id, name)
    }
}

/// Canonical form: `core.X`, `mcp:server.X`, `edge:id.X`.
fn canonicalize(source: ToolSource, namespace: &str, name: &str) -> String {
    match source {
        ToolSource::Core => format!("core.{name}"),
        ToolSource::Mcp => format!("mcp:{namespace}.{name}"),
        ToolSource::Edge => format!("edge:{namespace}.{name}"),
    }
}

/// Derive the LLM-safe alias from `(source, namespace, name)`.
///
/// Lowercases, maps every non-`[a-z0-9]` run to a single underscore, and
/// joins the parts with underscores. When the result exceeds 64 chars it is
/// truncated and given a 8-hex-char hash suffix so two identities that only
/// differ past the truncation point cannot alias to the same safe name.
pub fn derive_safe_name(source: ToolSource, namespace: &str, name: &str) -> String {
    let mut raw = String::new();
    raw.push_str(source.as_str());
    if !namespace.is_empty() {
        raw.push('_');
        raw.push_str(namespace);
    }
    raw.push('_');
    raw.push_str(name);

    let mut safe = String::with_capacity(raw.len());
    let mut last_was_sep = false;
    for ch in raw.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_lowercase() || lower.is_ascii_digit() {
            safe.push(lower);
            last_was_sep = false;
        } else if !last_was_sep && !safe.is_empty() {
            safe.push('_');
            last_was_sep = true;
        }
    }
    while safe.ends_with('_') {
        safe.pop();
    }
    if safe.is_empty() {
        safe.push_str("tool");
    }

    if safe.len() <= MAX_SAFE_NAME_LEN {
        return safe;
    }

    // Deterministic suffix over the untruncated input.
    let digest = Sha256::digest(raw.as_bytes());
    let suffix = hex::encode(&digest[..4]);
    let keep = MAX_SAFE_NAME_LEN - suffix.len() - 1;
    let mut truncated: String = safe.chars().take(keep).collect();
    while truncated.ends_with('_') {
        truncated.pop();
    }
    format!("{truncated}_{suffix}")
}
