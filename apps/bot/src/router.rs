use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use chat_cell::{InboundMessage, SessionRouter};

pub fn create_router(sessions: Arc<SessionRouter>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "citaflow-bot is running" }))
        .route("/channel/update", post(handle_update))
        .with_state(sessions)
}

/// Inbound webhook from the messaging channel. Processing runs to
/// completion before the response so a channel that serializes deliveries
/// per chat gets strict per-session ordering.
async fn handle_update(
    State(sessions): State<Arc<SessionRouter>>,
    Json(inbound): Json<InboundMessage>,
) -> StatusCode {
    sessions.dispatch(inbound).await;
    StatusCode::OK
}
