//! Parallel execution of local tool calls.
//!
//! Runs a batch of tool calls concurrently against registered handlers,
//! with per-tool timeouts, retry with exponential backoff, panic recovery,
//! and a semaphore bounding global concurrency.

mod executor;
mod registry;

pub use executor::{ExecutionResult, ExecutorMetrics, ParallelToolExecutor};
pub use registry::{ToolHandler, ToolRegistry};
