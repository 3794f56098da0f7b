use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Model binding for the LLM transport.
///
/// The model identifier and sampling parameters are fixed here; they are
/// not tunable at the request boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible chat-completions endpoint.
    #[serde(default = "d_base_url")]
    pub base_url: String,

    /// Environment variable holding the bearer API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "d_model")]
    pub model: String,

    #[serde(default = "d_temperature")]
    pub temperature: f32,

    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "d_top_p")]
    pub top_p: f32,

    /// Request `stream_options.include_usage` so the final chunk carries
    /// token accounting.
    #[serde(default = "d_true")]
    pub include_usage: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            api_key_env: d_api_key_env(),
            model: d_model(),
            temperature: d_temperature(),
            max_tokens: d_max_tokens(),
            top_p: d_top_p(),
            include_usage: true,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_api_key_env() -> String {
    "LLM_API_KEY".into()
}
fn d_model() -> String {
    "gpt-4o-mini".into()
}
fn d_temperature() -> f32 {
    0.4
}
fn d_max_tokens() -> u32 {
    1024
}
fn d_top_p() -> f32 {
    1.0
}
fn d_true() -> bool {
    true
}
