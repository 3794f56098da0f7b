//! Product-view telemetry from the storefront widget.
//!
//! `POST /apps/assistant/track` is HMAC-verified like the chat route and
//! records the view in the visitor's session actor; the orchestrator
//! later grounds "recently viewed" context on it.

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use vitrine_domain::history::now_ms;
use vitrine_sessions::ProductView;

use crate::api::chat::{api_error, verify_request};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TrackBody {
    pub session_id: String,
    pub product_id: String,
    #[serde(default)]
    pub product_type: Option<String>,
    #[serde(default)]
    pub product_title: Option<String>,
    /// View duration in milliseconds.
    #[serde(default)]
    pub duration: u64,
}

pub async fn track(
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(resp) = verify_request(&state, raw_query.as_deref(), &headers, &body) {
        return resp;
    }

    let parsed: TrackBody = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(_) => return api_error(StatusCode::BAD_REQUEST, "invalid request body"),
    };
    if parsed.session_id.trim().is_empty() || parsed.product_id.trim().is_empty() {
        return api_error(
            StatusCode::BAD_REQUEST,
            "session_id and product_id are required",
        );
    }

    let session = state.sessions.get_or_create(&parsed.session_id).await;
    let view = ProductView {
        product_id: parsed.product_id,
        product_type: parsed.product_type,
        product_title: parsed.product_title,
        duration: parsed.duration,
        ts: now_ms(),
    };
    if let Err(e) = session.track_product_view(view).await {
        tracing::error!(error = %e, "failed to record product view");
        return api_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error");
    }

    Json(serde_json::json!({ "ok": true })).into_response()
}
