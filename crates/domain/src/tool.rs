use serde::{Deserialize, Serialize};

/// Tool definition exposed to the LLM and to the `tools/list` surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}
