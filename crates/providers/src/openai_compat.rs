//! OpenAI-compatible adapter.
//!
//! Speaks the chat-completions wire format: streaming `data:` chunks with
//! text under `choices[0].delta.content`, tool calls as per-index
//! `delta.tool_calls` fragments, and token accounting in `usage` payloads.
//! Also tolerates the non-streaming shape (`choices[0].message.…`) that
//! some gateways return for short completions.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::sse;
use crate::traits::{ChatRequest, LlmProvider};
use crate::util::from_reqwest;
use vitrine_domain::config::LlmConfig;
use vitrine_domain::error::{Error, Result};
use vitrine_domain::history::{HistoryEntry, Role};
use vitrine_domain::stream::{BoxStream, StreamEvent, Usage};
use vitrine_domain::tool::ToolDefinition;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An adapter for any OpenAI-compatible chat-completions endpoint.
///
/// Model identity and sampling parameters are bound once from `[llm]`
/// config; requests cannot override them.
pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    include_usage: bool,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Build the provider from config plus the API key resolved from the
    /// environment by the caller.
    pub fn from_config(cfg: &LlmConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: "openai_compat".into(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            top_p: cfg.top_p,
            include_usage: cfg.include_usage,
            client,
        })
    }

    fn build_chat_body(&self, req: &ChatRequest) -> Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages_to_wire(&req.messages),
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "top_p": self.top_p,
            "stream": true,
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_wire).collect();
            body["tools"] = Value::Array(tools);
        }
        if self.include_usage {
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// Serialize history entries to the chat-completions message array.
///
/// Stored entries carry no wire call ids; ids are synthesized here and
/// paired positionally — each tool turn consumes the next id minted for
/// the preceding assistant `tool_calls` entry, which keeps the pairing
/// consistent even for entries rehydrated from the archive.
fn messages_to_wire(messages: &[HistoryEntry]) -> Vec<Value> {
    let mut wire = Vec::with_capacity(messages.len());
    let mut pending_ids: std::collections::VecDeque<String> = Default::default();

    for (i, msg) in messages.iter().enumerate() {
        match msg.role {
            Role::Assistant if msg.has_tool_calls() => {
                let calls = msg.tool_calls.as_deref().unwrap_or_default();
                pending_ids.clear();
                let mut arr = Vec::with_capacity(calls.len());
                for (j, call) in calls.iter().enumerate() {
                    let id = format!("call_{i}_{j}");
                    pending_ids.push_back(id.clone());
                    arr.push(serde_json::json!({
                        "id": id,
                        "type": "function",
                        "function": {
                            "name": call.name,
                            "arguments": call.arguments.to_string(),
                        }
                    }));
                }
                let content = if msg.content.is_empty() {
                    Value::Null
                } else {
                    Value::String(msg.content.clone())
                };
                wire.push(serde_json::json!({
                    "role": "assistant",
                    "content": content,
                    "tool_calls": arr,
                }));
            }
            Role::Tool => {
                let id = pending_ids.pop_front().unwrap_or_default();
                wire.push(serde_json::json!({
                    "role": "tool",
                    "tool_call_id": id,
                    "content": msg.content,
                }));
            }
            _ => {
                wire.push(serde_json::json!({
                    "role": role_to_str(msg.role),
                    "content": msg.content,
                }));
            }
        }
    }

    wire
}

fn tool_to_wire(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.input_schema,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stream parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct PendingToolCall {
    name: String,
    args: String,
    emitted: bool,
}

/// Per-stream assembly state.
///
/// Tool-call fragments are keyed by `index`; a `tool_call` event is
/// emitted exactly once per index, as soon as the accumulated argument
/// text parses as JSON (or at flush time with `{}` for argument-less
/// tools).
#[derive(Default)]
struct StreamState {
    pending: BTreeMap<u64, PendingToolCall>,
    saw_payload: bool,
}

impl StreamState {
    fn parse(&mut self, data: &str) -> Vec<Result<StreamEvent>> {
        if data.trim() == "[DONE]" {
            return Vec::new();
        }

        let v: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => return vec![Err(Error::Json(e))],
        };
        self.saw_payload = true;

        let mut events = Vec::new();

        if let Some(usage) = v.get("usage").and_then(parse_usage) {
            events.push(Ok(StreamEvent::Usage(usage)));
        }

        let Some(choice) = v
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
        else {
            return events;
        };

        // Streaming delta shape.
        if let Some(delta) = choice.get("delta") {
            if let Some(tc_arr) = delta.get("tool_calls").and_then(|v| v.as_array()) {
                for tc in tc_arr {
                    let idx = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
                    let entry = self.pending.entry(idx).or_default();
                    if let Some(name) = tc
                        .get("function")
                        .and_then(|f| f.get("name"))
                        .and_then(|v| v.as_str())
                    {
                        entry.name.push_str(name);
                    }
                    if let Some(args) = tc
                        .get("function")
                        .and_then(|f| f.get("arguments"))
                        .and_then(|v| v.as_str())
                    {
                        entry.args.push_str(args);
                    }
                    if !entry.emitted && !entry.args.is_empty() {
                        if let Ok(arguments) = serde_json::from_str::<Value>(&entry.args) {
                            entry.emitted = true;
                            events.push(Ok(StreamEvent::ToolCall {
                                name: entry.name.clone(),
                                arguments,
                            }));
                        }
                    }
                }
            }

            if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
                if !text.is_empty() {
                    events.push(Ok(StreamEvent::Text { text: text.into() }));
                }
            }
        }

        // Non-streaming fallback shape.
        if let Some(message) = choice.get("message") {
            if let Some(text) = message.get("content").and_then(|v| v.as_str()) {
                if !text.is_empty() {
                    events.push(Ok(StreamEvent::Text { text: text.into() }));
                }
            }
            if let Some(tc_arr) = message.get("tool_calls").and_then(|v| v.as_array()) {
                for tc in tc_arr {
                    let Some(func) = tc.get("function") else { continue };
                    let Some(name) = func.get("name").and_then(|v| v.as_str()) else {
                        continue;
                    };
                    let args_str = func.get("arguments").and_then(|v| v.as_str()).unwrap_or("{}");
                    let arguments: Value = serde_json::from_str(args_str)
                        .unwrap_or(Value::Object(Default::default()));
                    events.push(Ok(StreamEvent::ToolCall {
                        name: name.into(),
                        arguments,
                    }));
                }
            }
        }

        // A finish_reason chunk means no further fragments are coming;
        // flush calls whose arguments never parsed (argument-less tools).
        if choice
            .get("finish_reason")
            .map(|fr| !fr.is_null())
            .unwrap_or(false)
        {
            events.extend(self.flush_pending());
        }

        events
    }

    fn flush_pending(&mut self) -> Vec<Result<StreamEvent>> {
        let mut events = Vec::new();
        for (_, pending) in std::mem::take(&mut self.pending) {
            if pending.emitted {
                continue;
            }
            if pending.name.is_empty() {
                tracing::warn!("discarding tool-call fragment without a name");
                continue;
            }
            let arguments: Value = serde_json::from_str(&pending.args)
                .unwrap_or(Value::Object(Default::default()));
            events.push(Ok(StreamEvent::ToolCall {
                name: pending.name,
                arguments,
            }));
        }
        events
    }

    fn finish(mut self) -> Vec<Result<StreamEvent>> {
        if !self.saw_payload {
            return vec![Err(Error::Provider {
                provider: "openai_compat".into(),
                message: "empty response body".into(),
            })];
        }
        self.flush_pending()
    }
}

fn parse_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(req);

        tracing::debug!(provider = %self.id, model = %self.model, "chat stream request");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), err_text),
            });
        }

        let state = std::sync::Arc::new(std::sync::Mutex::new(StreamState::default()));
        let parse_state = state.clone();
        Ok(sse::sse_response_stream(
            resp,
            move |data| parse_state.lock().expect("stream state lock").parse(data),
            move || {
                let state = std::mem::take(&mut *state.lock().expect("stream state lock"));
                state.finish()
            },
        ))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use vitrine_domain::history::ToolInvocation;

    fn text_of(event: &StreamEvent) -> &str {
        match event {
            StreamEvent::Text { text } => text,
            other => panic!("expected text event, got {other:?}"),
        }
    }

    #[test]
    fn parses_text_delta() {
        let mut state = StreamState::default();
        let events =
            state.parse(r#"{"choices":[{"delta":{"content":"Wit"},"finish_reason":null}]}"#);
        assert_eq!(events.len(), 1);
        assert_eq!(text_of(events[0].as_ref().unwrap()), "Wit");
    }

    #[test]
    fn assembles_tool_call_across_chunks() {
        let mut state = StreamState::default();

        let events = state.parse(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_abc","function":{"name":"search_shop_catalog","arguments":""}}]},"finish_reason":null}]}"#,
        );
        assert!(events.is_empty(), "no event until arguments parse");

        let events = state.parse(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"query\":"}}]},"finish_reason":null}]}"#,
        );
        assert!(events.is_empty(), "partial JSON must not emit");

        let events = state.parse(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"pierścionki\"}"}}]},"finish_reason":null}]}"#,
        );
        assert_eq!(events.len(), 1);
        match events[0].as_ref().unwrap() {
            StreamEvent::ToolCall { name, arguments } => {
                assert_eq!(name, "search_shop_catalog");
                assert_eq!(arguments["query"], "pierścionki");
            }
            other => panic!("expected tool_call, got {other:?}"),
        }

        // The finish chunk must not re-emit the same call.
        let events = state.parse(r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#);
        assert!(events.is_empty());
    }

    #[test]
    fn finish_reason_flushes_argumentless_tool_call() {
        let mut state = StreamState::default();
        state.parse(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"get_most_recent_order_status","arguments":""}}]},"finish_reason":null}]}"#,
        );
        let events = state.parse(r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#);
        assert_eq!(events.len(), 1);
        match events[0].as_ref().unwrap() {
            StreamEvent::ToolCall { name, arguments } => {
                assert_eq!(name, "get_most_recent_order_status");
                assert!(arguments.as_object().unwrap().is_empty());
            }
            other => panic!("expected tool_call, got {other:?}"),
        }
    }

    #[test]
    fn usage_payload_emits_usage_event() {
        let mut state = StreamState::default();
        let events = state.parse(
            r#"{"choices":[],"usage":{"prompt_tokens":12,"completion_tokens":34,"total_tokens":46}}"#,
        );
        assert_eq!(events.len(), 1);
        match events[0].as_ref().unwrap() {
            StreamEvent::Usage(u) => {
                assert_eq!(u.prompt_tokens, 12);
                assert_eq!(u.total_tokens, 46);
            }
            other => panic!("expected usage, got {other:?}"),
        }
    }

    #[test]
    fn non_streaming_message_fallback() {
        let mut state = StreamState::default();
        let events = state.parse(
            r#"{"choices":[{"message":{"content":"gotowe","tool_calls":[{"id":"c1","function":{"name":"get_cart","arguments":"{\"cart_id\":\"gid://shopify/Cart/1\"}"}}]},"finish_reason":"stop"}]}"#,
        );
        assert_eq!(events.len(), 2);
        assert_eq!(text_of(events[0].as_ref().unwrap()), "gotowe");
        assert!(matches!(
            events[1].as_ref().unwrap(),
            StreamEvent::ToolCall { name, .. } if name == "get_cart"
        ));
    }

    #[test]
    fn done_sentinel_is_silent() {
        let mut state = StreamState::default();
        assert!(state.parse("[DONE]").is_empty());
    }

    #[test]
    fn empty_stream_finishes_with_error() {
        let state = StreamState::default();
        let events = state.finish();
        assert_eq!(events.len(), 1);
        assert!(events[0].is_err());
    }

    #[test]
    fn malformed_payload_yields_json_error() {
        let mut state = StreamState::default();
        let events = state.parse("{not json");
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(Error::Json(_))));
    }

    // ── messages_to_wire ───────────────────────────────────────────

    #[test]
    fn wire_pairs_tool_turns_with_assistant_call_ids() {
        let messages = vec![
            HistoryEntry::user("pokaż pierścionki"),
            HistoryEntry::assistant_tool_calls(vec![ToolInvocation {
                name: "search_shop_catalog".into(),
                arguments: serde_json::json!({"query": "pierścionki"}),
            }]),
            HistoryEntry::tool_result("search_shop_catalog", "call_1", r#"{"products":[]}"#),
        ];
        let wire = messages_to_wire(&messages);
        assert_eq!(wire.len(), 3);

        let assistant = &wire[1];
        assert!(assistant["content"].is_null());
        let call_id = assistant["tool_calls"][0]["id"].as_str().unwrap();
        assert_eq!(wire[2]["tool_call_id"].as_str().unwrap(), call_id);
        // Arguments cross the wire as a JSON string.
        let args = assistant["tool_calls"][0]["function"]["arguments"]
            .as_str()
            .unwrap();
        assert!(serde_json::from_str::<Value>(args).unwrap().is_object());
    }

    #[test]
    fn wire_plain_roles_pass_through() {
        let messages = vec![
            HistoryEntry::system("persona"),
            HistoryEntry::user("hej"),
            HistoryEntry::assistant("cześć"),
        ];
        let wire = messages_to_wire(&messages);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[1]["role"], "user");
        assert_eq!(wire[2]["content"], "cześć");
        assert!(wire[2].get("tool_calls").is_none());
    }
}
