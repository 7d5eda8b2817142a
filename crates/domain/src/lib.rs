//! Shared domain types for the MeshGate gateway.
//!
//! Everything the other crates agree on lives here: the error taxonomy,
//! the configuration tree, chat messages, and the provider streaming types.

pub mod config;
pub mod error;
pub mod message;
pub mod stream;

pub use error::{Error, Result};
