use mg_domain::message::{Message, ToolDefinition};
use mg_domain::stream::{BoxStream, CompletionChunk};
use mg_domain::Result;

/// A provider-agnostic completion request.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// The packed prompt, in order.
    pub messages: Vec<Message>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// Model identifier override. `None` lets the provider choose.
    pub model: Option<String>,
    /// Maximum tokens in the response.
    pub max_tokens: Option<u32>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
}

/// The stream of chunks a provider yields for one completion.
pub type CompletionStream = BoxStream<'static, Result<CompletionChunk>>;

/// Trait every model adapter must implement.
///
/// Implementations live outside this crate (they wrap vendor HTTP APIs);
/// the dispatcher is oblivious to provider-specific types. A per-attempt
/// timeout belongs inside the implementation — the dispatcher only
/// classifies whatever error comes back.
#[async_trait::async_trait]
pub trait ModelProvider: Send + Sync {
    /// Start a streaming completion.
    async fn complete(&self, req: &CompletionRequest) -> Result<CompletionStream>;

    /// Unique provider name, used for circuit-breaker state and metrics.
    fn name(&self) -> &str;

    /// Models this provider can serve.
    fn models(&self) -> Vec<String>;

    /// Whether the provider supports tool calling.
    fn supports_tools(&self) -> bool;
}
