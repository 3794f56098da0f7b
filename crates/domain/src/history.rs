//! Conversation history types shared between the session actor, the
//! orchestrator, and the LLM transport.
//!
//! A [`HistoryEntry`] is both the stored form of a conversation turn and
//! the message shape serialized to the LLM wire format (minus `ts`).

use serde::{Deserialize, Serialize};

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// A tool invocation recorded on an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One conversation turn.
///
/// Assistant turns that invoke tools carry `tool_calls` and may have empty
/// `content`; the N turns following such an entry are `tool` turns in
/// matching order. Tool turns carry `tool_call_id`/`name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub content: String,
    /// Millisecond timestamp.
    pub ts: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolInvocation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Current wall-clock time in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl HistoryEntry {
    fn bare(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            ts: now_ms(),
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::bare(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::bare(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::bare(Role::System, content)
    }

    /// An assistant turn that invokes tools. `content` is empty.
    pub fn assistant_tool_calls(calls: Vec<ToolInvocation>) -> Self {
        Self {
            tool_calls: Some(calls),
            ..Self::bare(Role::Assistant, "")
        }
    }

    /// A tool-result turn answering the invocation named `name`.
    pub fn tool_result(
        name: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let name = name.into();
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name),
            ..Self::bare(Role::Tool, content)
        }
    }

    /// True for entries that invoke at least one tool.
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_plain_entry() {
        let entry = HistoryEntry::user("cześć");
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: HistoryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, parsed);
    }

    #[test]
    fn roundtrip_tool_calls_entry() {
        let entry = HistoryEntry::assistant_tool_calls(vec![ToolInvocation {
            name: "search_shop_catalog".into(),
            arguments: serde_json::json!({"query": "pierścionki", "context": "biżuteria"}),
        }]);
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: HistoryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, parsed);
        assert!(parsed.has_tool_calls());
        assert!(parsed.content.is_empty());
    }

    #[test]
    fn roundtrip_tool_result_entry() {
        let entry = HistoryEntry::tool_result("get_cart", "call_3", r#"{"cart":{}}"#);
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: HistoryEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(entry, parsed);
        assert_eq!(parsed.role, Role::Tool);
        assert_eq!(parsed.name.as_deref(), Some("get_cart"));
    }

    #[test]
    fn optional_fields_absent_from_wire() {
        let json = serde_json::to_value(HistoryEntry::user("hi")).unwrap();
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("tool_call_id").is_none());
        assert!(json.get("name").is_none());
    }

    #[test]
    fn deserializes_without_optional_fields() {
        let raw = r#"{"role":"assistant","content":"done","ts":1700000000000}"#;
        let entry: HistoryEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.role, Role::Assistant);
        assert!(!entry.has_tool_calls());
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
    }
}
