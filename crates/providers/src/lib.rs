//! Model provider contract and the failover dispatcher.
//!
//! Providers are external adapters; this crate only defines the streaming
//! contract ([`ModelProvider`]) and wraps an ordered list of providers in a
//! [`FailoverDispatcher`] that retries transient failures, fails over on
//! billing/auth/model-unavailable, and tracks per-provider circuit breakers.

mod classifier;
mod failover;
mod traits;

pub use classifier::classify_error;
pub use failover::{DispatcherMetrics, FailoverDispatcher, ProviderState};
pub use traits::{CompletionRequest, CompletionStream, ModelProvider};
