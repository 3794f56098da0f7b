//! JSON-RPC 2.0 tool surface.
//!
//! `POST /mcp/tools/call` and `POST /apps/assistant/mcp` accept
//! `tools/list` and `tools/call` and answer with JSON-RPC envelopes.
//! The request `id` is echoed verbatim, whatever its JSON shape.

use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Json, Response};
use serde_json::Value;

use vitrine_mcp_client::protocol::{
    INVALID_PARAMS, INVALID_REQUEST, METHOD_NOT_FOUND, PARSE_ERROR,
};
use vitrine_mcp_client::{registry, ToolCallContext};

use crate::state::AppState;

pub async fn rpc(State(state): State<AppState>, body: Bytes) -> Response {
    let parsed: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(_) => return rpc_error(Value::Null, PARSE_ERROR, "parse error"),
    };

    let id = parsed.get("id").cloned().unwrap_or(Value::Null);

    if parsed.get("jsonrpc").and_then(|v| v.as_str()) != Some("2.0") {
        return rpc_error(id, INVALID_REQUEST, "invalid request");
    }
    let Some(method) = parsed.get("method").and_then(|v| v.as_str()) else {
        return rpc_error(id, INVALID_REQUEST, "invalid request");
    };

    match method {
        "tools/list" => rpc_success(
            id,
            serde_json::json!({ "tools": registry::definitions() }),
        ),
        "tools/call" => {
            let params = parsed.get("params");
            let Some(name) = params
                .and_then(|p| p.get("name"))
                .and_then(|v| v.as_str())
            else {
                return rpc_error(id, INVALID_PARAMS, "params.name is required");
            };
            let arguments = params
                .and_then(|p| p.get("arguments"))
                .cloned()
                .unwrap_or_else(|| serde_json::json!({}));

            match state
                .tools
                .call(name, arguments, &ToolCallContext::default())
                .await
            {
                Ok(result) => rpc_success(id, result),
                Err(e) => Json(serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": e,
                }))
                .into_response(),
            }
        }
        _ => rpc_error(id, METHOD_NOT_FOUND, format!("unknown method: {method}")),
    }
}

fn rpc_success(id: Value, result: Value) -> Response {
    Json(serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    }))
    .into_response()
}

fn rpc_error(id: Value, code: i64, message: impl Into<String>) -> Response {
    Json(serde_json::json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into() },
    }))
    .into_response()
}
