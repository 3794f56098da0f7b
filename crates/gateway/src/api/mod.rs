pub mod chat;
pub mod mcp;
pub mod track;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the API router.
///
/// `OPTIONS *` preflights are answered by the CORS layer applied in
/// `main`; everything else routes here.
pub fn router() -> Router<AppState> {
    Router::new()
        // Liveness probes
        .route("/", get(health))
        .route("/ping", get(health))
        .route("/health", get(health))
        // Chat (storefront proxy, HMAC-protected)
        .route("/apps/assistant/chat", post(chat::chat_proxied))
        // Chat (dev only, DEV_BYPASS-guarded)
        .route("/chat", post(chat::chat_dev))
        // Product-view telemetry from the widget
        .route("/apps/assistant/track", post(track::track))
        // JSON-RPC tool surface
        .route("/apps/assistant/mcp", post(mcp::rpc))
        .route("/mcp/tools/call", post(mcp::rpc))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}
