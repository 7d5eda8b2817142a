//! MeshGate: a gateway mediating language-model agents and a fleet of
//! edge daemons.
//!
//! The binary wires the edge WebSocket endpoint; embedders use
//! [`bootstrap::build_state`] plus [`runtime::turn::run`] to drive the
//! agent loop with their own model providers.

pub mod api;
pub mod bootstrap;
pub mod runtime;
pub mod state;
