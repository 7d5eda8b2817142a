//! Session store contract and the in-memory reference implementation.
//!
//! Message persistence backends are external collaborators; the gateway
//! only relies on the [`SessionStore`] operations. [`MemorySessionStore`]
//! is the reference implementation and is safe for parallel callers.

mod store;

pub use store::{MemorySessionStore, Session, SessionStore};
