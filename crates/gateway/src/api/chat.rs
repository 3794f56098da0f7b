//! Chat endpoints — the storefront's interface to the assistant.
//!
//! - `POST /apps/assistant/chat` — HMAC-verified: signature, admission,
//!   per-session rate limit, replay check, then the streaming turn.
//! - `POST /chat`                — the same pipeline without HMAC; only
//!   mounted in spirit: it answers 404 unless `DEV_BYPASS` is set.
//!
//! The response is an SSE stream: an initial `session` event, `delta`
//! frames, optional `status` frames, and a terminating `data: [DONE]`
//! (or an `error` event).

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use tokio::sync::mpsc;

use vitrine_sessions::{SessionHandle, SessionRegistry};

use crate::runtime::{run_chat_turn, ChatEvent, ChatTurnInput};
use crate::security::verify;
use crate::state::AppState;

pub(crate) const SIGNATURE_HEADER: &str = "x-shopify-hmac-sha256";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request shape
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    /// The user's message. Required and non-empty.
    pub message: String,
    /// Visitor session id; minted when absent.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Cart handle known to the widget.
    #[serde(default)]
    pub cart_id: Option<String>,
    /// Accepted for compatibility; responses always stream.
    #[serde(default)]
    #[allow(dead_code)]
    pub stream: Option<bool>,
    /// Token of a logged-in customer.
    #[serde(default)]
    pub customer_token: Option<String>,
}

/// Build a standardized JSON error response: `{ "error": "<message>" }`.
pub(crate) fn api_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Auth failures carry no detail about which check failed.
fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /apps/assistant/chat
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat_proxied(
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // ── C1: signature ────────────────────────────────────────────
    let signature = match verify_request(&state, raw_query.as_deref(), &headers, &body) {
        Ok(sig) => sig,
        Err(resp) => return resp,
    };

    // ── C2: per-shop admission ───────────────────────────────────
    let query = parse_query(raw_query.as_deref());
    let shop_key = query
        .iter()
        .find(|(k, _)| k == "shop")
        .map(|(_, v)| v.clone())
        .unwrap_or_else(|| state.config.shop.domain.clone());
    let decision = state.admission.admit(&shop_key);
    if !decision.allowed {
        return too_many_requests(decision.retry_after_ms.unwrap_or(1_000));
    }

    // ── Body + session resolution ────────────────────────────────
    let parsed = match parse_chat_body(&body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let (session, replay_used) =
        match resolve_session(&state.sessions, &parsed, Some(signature)).await {
            Ok(s) => s,
            Err(resp) => return resp,
        };
    if replay_used {
        return (
            StatusCode::UNAUTHORIZED,
            "Unauthorized: Signature already used",
        )
            .into_response();
    }

    run_turn_sse(state, session, parsed)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /chat (dev only)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn chat_dev(State(state): State<AppState>, body: Bytes) -> Response {
    if !state.config.server.dev_bypass {
        return StatusCode::NOT_FOUND.into_response();
    }

    let parsed = match parse_chat_body(&body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let (session, _) = match resolve_session(&state.sessions, &parsed, None).await {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    run_turn_sse(state, session, parsed)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pipeline pieces
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub(crate) fn parse_query(raw_query: Option<&str>) -> Vec<(String, String)> {
    match raw_query {
        Some(raw) => url::form_urlencoded::parse(raw.as_bytes())
            .into_owned()
            .collect(),
        None => Vec::new(),
    }
}

/// Run C1 against the request; returns the accepted signature.
pub(crate) fn verify_request(
    state: &AppState,
    raw_query: Option<&str>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<String, Response> {
    let Some(ref secret) = state.app_secret else {
        tracing::error!("proxied request but no app secret configured");
        return Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
        ));
    };

    let query = parse_query(raw_query);
    let header_signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let now_secs = vitrine_domain::history::now_ms() / 1_000;

    match verify::verify(secret, &query, header_signature, body, now_secs) {
        Ok(verified) => Ok(verified.signature),
        Err(e) => {
            tracing::warn!(reason = e.reason_code(), "signature verification failed");
            Err(if e.http_status() == 500 {
                api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            } else {
                unauthorized()
            })
        }
    }
}

fn parse_chat_body(body: &Bytes) -> Result<ChatBody, Response> {
    let parsed: ChatBody = serde_json::from_slice(body)
        .map_err(|_| api_error(StatusCode::BAD_REQUEST, "invalid request body"))?;
    if parsed.message.trim().is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "message is required"));
    }
    Ok(parsed)
}

fn too_many_requests(retry_after_ms: i64) -> Response {
    let secs = (retry_after_ms + 999) / 1_000;
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("Retry-After", secs.max(1).to_string())],
        Json(serde_json::json!({ "error": "rate_limited" })),
    )
        .into_response()
}

/// Resolve (or mint) the session, count the request against the session
/// window, and run the replay check when a signature is present.
///
/// Returns `(handle, replay_used)`.
async fn resolve_session(
    sessions: &SessionRegistry,
    body: &ChatBody,
    signature: Option<String>,
) -> Result<(SessionHandle, bool), Response> {
    let session_id = body
        .session_id
        .clone()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(SessionRegistry::mint_session_id);

    let session = sessions.get_or_create(&session_id).await;
    let _ = session.set_session_id(session_id).await;

    let (admitted, retry_after_ms) = session
        .rate_ok()
        .await
        .map_err(|e| server_error(&e))?;
    if !admitted {
        return Err(too_many_requests(retry_after_ms));
    }

    let replay_used = match signature {
        Some(sig) => session
            .replay_check(sig)
            .await
            .map_err(|e| server_error(&e))?,
        None => false,
    };

    Ok((session, replay_used))
}

fn server_error(e: &vitrine_domain::error::Error) -> Response {
    tracing::error!(error = %e, "session actor failure");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE rendering
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn run_turn_sse(state: AppState, session: SessionHandle, body: ChatBody) -> Response {
    let input = ChatTurnInput {
        session,
        user_message: body.message,
        cart_id: body.cart_id,
        customer_token: body.customer_token,
    };
    let rx = run_chat_turn(state, input);
    sse_response(rx)
}

fn sse_response(mut rx: mpsc::Receiver<ChatEvent>) -> Response {
    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let terminal = matches!(event, ChatEvent::Done | ChatEvent::Error { .. });
            yield Ok::<_, Infallible>(to_sse_frame(event));
            if terminal {
                break;
            }
        }
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response()
}

fn to_sse_frame(event: ChatEvent) -> Event {
    match event {
        ChatEvent::Session { session_id } => Event::default()
            .event("session")
            .data(serde_json::json!({ "session_id": session_id }).to_string()),
        ChatEvent::Delta { text } => {
            Event::default().data(serde_json::json!({ "delta": text }).to_string())
        }
        ChatEvent::Status { message } => Event::default()
            .event("status")
            .data(serde_json::json!({ "message": message }).to_string()),
        ChatEvent::Error { message } => Event::default()
            .event("error")
            .data(serde_json::json!({ "error": message }).to_string()),
        ChatEvent::Done => Event::default().data("[DONE]"),
    }
}
