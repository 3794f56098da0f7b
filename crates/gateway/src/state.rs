use std::sync::Arc;

use vitrine_domain::config::Config;
use vitrine_mcp_client::ToolDispatcher;
use vitrine_providers::LlmProvider;
use vitrine_sessions::SessionRegistry;

use crate::runtime::greeting::GreetingFilter;
use crate::security::admission::Admission;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    /// Session actors, keyed by session id.
    pub sessions: Arc<SessionRegistry>,

    /// Per-shop admission window.
    pub admission: Arc<Admission>,

    /// JSON-RPC client for the merchant tool service.
    pub tools: Arc<dyn ToolDispatcher>,

    /// LLM transport. `None` when no API key is configured; chat requests
    /// then answer with an `error` SSE frame.
    pub llm: Option<Arc<dyn LlmProvider>>,

    /// Compiled greeting prefilter.
    pub greeting: Arc<GreetingFilter>,

    /// App-proxy HMAC secret (read once at boot). `None` = verification
    /// cannot succeed; proxied routes answer 500.
    pub app_secret: Option<Arc<String>>,
}
