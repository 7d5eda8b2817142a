//! Tool naming registry.
//!
//! Canonicalizes tool names across their three sources (built-in `core.X`,
//! MCP servers `mcp:server.X`, edges `edge:id.X`), derives LLM-safe aliases,
//! and detects collisions. Different surfaces refer to tools by canonical
//! name, safe name, or registered alias; [`NamingRegistry::resolve`] accepts
//! any of them.

mod identity;
mod registry;

pub use identity::{derive_safe_name, ToolIdentity, ToolSource};
pub use registry::NamingRegistry;
