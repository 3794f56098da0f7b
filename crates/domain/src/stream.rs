use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events surfaced by the LLM transport while a completion streams.
///
/// The stream is finite and not restartable; dropping the reader cancels
/// the underlying HTTP response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// A text chunk.
    #[serde(rename = "text")]
    Text { text: String },

    /// A fully-assembled tool call (arguments already parsed as JSON).
    #[serde(rename = "tool_call")]
    ToolCall {
        name: String,
        arguments: serde_json::Value,
    },

    /// Token accounting reported by the provider.
    #[serde(rename = "usage")]
    Usage(Usage),
}

/// Token usage for a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
