use vitrine_domain::error::Result;
use vitrine_domain::history::HistoryEntry;
use vitrine_domain::stream::{BoxStream, StreamEvent};
use vitrine_domain::tool::ToolDefinition;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One LLM call: the assembled conversation plus the tools the model may
/// invoke. Model identity and sampling parameters live in the provider
/// (bound once from config), not here.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub messages: Vec<HistoryEntry>,
    pub tools: Vec<ToolDefinition>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait implemented by LLM adapters.
///
/// The orchestrator consumes the event stream until it ends; dropping the
/// stream cancels the underlying response.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Open a streaming chat completion.
    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
