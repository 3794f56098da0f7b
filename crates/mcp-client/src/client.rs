//! HTTP dispatch to the merchant tool service.
//!
//! One POST per call, JSON-RPC 2.0 envelope, hard 5 s deadline. Catalog
//! searches degrade to a safe empty result on outages so the model can
//! apologize instead of failing the whole turn.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::normalize::{normalize_args, NormalizeContext};
use crate::protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, EXECUTION_ERROR, METHOD_NOT_FOUND,
};
use crate::registry;
use vitrine_domain::error::{Error, Result};

/// Hard per-call deadline.
const CALL_TIMEOUT: Duration = Duration::from_millis(5_000);

/// The result of one tool call: the `result` value of the JSON-RPC
/// response, or the error object.
pub type ToolOutcome = std::result::Result<Value, JsonRpcError>;

/// Session-scoped inputs threaded into normalization.
#[derive(Debug, Clone, Default)]
pub struct ToolCallContext {
    /// Cart key extracted from the session's canonical cart id.
    pub cart_key: Option<String>,
}

/// Dispatch interface consumed by the orchestrator and the JSON-RPC
/// surface. The orchestrator tests script this with a double.
#[async_trait]
pub trait ToolDispatcher: Send + Sync {
    async fn call(&self, tool: &str, args: Value, ctx: &ToolCallContext) -> ToolOutcome;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// JSON-RPC client for `https://{shop_domain}/api/mcp`.
pub struct HttpToolClient {
    endpoint: String,
    http: reqwest::Client,
    next_id: AtomicU64,
    internal_key: Option<String>,
    default_search_context: String,
}

impl HttpToolClient {
    pub fn new(
        shop_domain: &str,
        default_search_context: impl Into<String>,
        internal_key: Option<String>,
    ) -> Result<Self> {
        // The deadline is enforced with tokio::time::timeout around the
        // whole call; no client-level timeout so the two cannot disagree.
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            endpoint: format!("https://{}/api/mcp", shop_domain.trim_end_matches('/')),
            http,
            next_id: AtomicU64::new(1),
            internal_key,
            default_search_context: default_search_context.into(),
        })
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn post_rpc(&self, request: &JsonRpcRequest) -> std::result::Result<Value, TransportFailure> {
        let mut builder = self
            .http
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(request);
        if let Some(ref key) = self.internal_key {
            builder = builder.header("X-Internal-Key", key);
        }

        let response = match tokio::time::timeout(CALL_TIMEOUT, builder.send()).await {
            Err(_) => return Err(TransportFailure::Timeout),
            Ok(Err(e)) => return Err(TransportFailure::Network(e.to_string())),
            Ok(Ok(resp)) => resp,
        };

        let status = response.status();
        if status.is_server_error() {
            return Err(TransportFailure::ServerError(status.as_u16()));
        }

        let body = match tokio::time::timeout(CALL_TIMEOUT, response.text()).await {
            Err(_) => return Err(TransportFailure::Timeout),
            Ok(Err(e)) => return Err(TransportFailure::Network(e.to_string())),
            Ok(Ok(text)) => text,
        };

        match serde_json::from_str::<JsonRpcResponse>(&body) {
            Ok(rpc) => rpc.into_result().map_err(TransportFailure::Rpc),
            Err(_) => Err(TransportFailure::Network(format!(
                "HTTP {} with non-RPC body",
                status.as_u16()
            ))),
        }
    }
}

#[async_trait]
impl ToolDispatcher for HttpToolClient {
    async fn call(&self, tool: &str, args: Value, ctx: &ToolCallContext) -> ToolOutcome {
        if !registry::is_known(tool) {
            return Err(JsonRpcError::new(
                METHOD_NOT_FOUND,
                format!("unknown tool: {tool}"),
            ));
        }

        let norm_ctx = NormalizeContext {
            default_search_context: &self.default_search_context,
            session_cart_key: ctx.cart_key.as_deref(),
        };
        let arguments = match normalize_args(tool, args, &norm_ctx) {
            Ok(a) => a,
            Err(e) => {
                log_call(tool, "invalid_params", &Value::Null);
                return Err(e);
            }
        };
        let summary = args_summary(&arguments);

        let request = JsonRpcRequest::tools_call(self.next_request_id(), tool, arguments);

        match self.post_rpc(&request).await {
            Ok(result) => {
                log_call(tool, "ok", &summary);
                Ok(result)
            }
            Err(TransportFailure::Rpc(err)) => {
                log_call(tool, "rpc_error", &summary);
                Err(err)
            }
            Err(failure) => {
                log_call(tool, failure.label(), &summary);
                degraded_outcome(tool, failure)
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Degradation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How a transport attempt failed (before any JSON-RPC semantics).
#[derive(Debug)]
enum TransportFailure {
    Timeout,
    Network(String),
    ServerError(u16),
    /// The service answered with a JSON-RPC error object.
    Rpc(JsonRpcError),
}

impl TransportFailure {
    fn label(&self) -> &'static str {
        match self {
            TransportFailure::Timeout => "timeout",
            TransportFailure::Network(_) => "network_error",
            TransportFailure::ServerError(_) => "server_error",
            TransportFailure::Rpc(_) => "rpc_error",
        }
    }
}

/// The safe fallback substituted for a failed catalog search.
fn catalog_fallback() -> Value {
    serde_json::json!({
        "products": [],
        "system_note": "Store temporarily unavailable. Product search could not \
                        be completed; apologize and suggest trying again shortly."
    })
}

/// Map a transport failure to the per-tool policy: catalog searches
/// degrade to [`catalog_fallback`] as a *successful* result, every other
/// tool surfaces a JSON-RPC error for the model to explain.
fn degraded_outcome(tool: &str, failure: TransportFailure) -> ToolOutcome {
    if tool == registry::SEARCH_SHOP_CATALOG {
        return Ok(catalog_fallback());
    }
    let message = match failure {
        TransportFailure::Timeout => "tool service timed out".to_string(),
        TransportFailure::Network(e) => format!("tool service unreachable: {e}"),
        TransportFailure::ServerError(code) => format!("tool service returned HTTP {code}"),
        TransportFailure::Rpc(err) => return Err(err),
    };
    Err(JsonRpcError::new(EXECUTION_ERROR, message))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Logging
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Shallow redaction of argument values for logs: strings become
/// `[len:N]`, arrays `array(len=N)`, nested objects `"object"`.
/// Raw values never reach the log stream.
fn args_summary(args: &Value) -> Value {
    let Value::Object(map) = args else {
        return Value::String("object".into());
    };
    let summarized: serde_json::Map<String, Value> = map
        .iter()
        .map(|(k, v)| {
            let s = match v {
                Value::String(s) => Value::String(format!("[len:{}]", s.chars().count())),
                Value::Array(a) => Value::String(format!("array(len={})", a.len())),
                Value::Object(_) => Value::String("object".into()),
                other => other.clone(),
            };
            (k.clone(), s)
        })
        .collect();
    Value::Object(summarized)
}

fn log_call(tool: &str, status: &str, args_summary: &Value) {
    tracing::info!(
        tool = tool,
        status = status,
        args = %args_summary,
        "tool call"
    );
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
