//! Conversation relay WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::relay::relay_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the conversation relay WebSocket router
///
/// # Endpoint
///
/// `GET /conversation-relay` - WebSocket upgrade for a voice gateway
///
/// # Protocol
///
/// The gateway sends `setup` first, naming the assistant in
/// `customParameters.assistant`. The server greets the caller with a
/// `text` frame and then streams model tokens back for each `prompt`.
///
/// ```json
/// // Gateway sends
/// {"type": "setup", "callSid": "CA123", "from": "+15550100", "customParameters": {"assistant": "banking"}}
///
/// // Server responds
/// {"type": "text", "token": "Welcome to the bank", "last": true}
/// ```
///
/// # Connection Limits
///
/// The handler expects the connection limit middleware to have run, which
/// supplies the client IP extension.
pub fn create_relay_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/conversation-relay", get(relay_handler))
        .layer(TraceLayer::new_for_http())
}
