//! Ingress router assembly.

use axum::routing::post;
use axum::Router;

use crate::handlers::receive_webhook;
use crate::state::IngestState;

/// Build the webhook ingress router over the given state.
pub fn ingest_router(state: IngestState) -> Router {
    Router::new()
        .route("/webhook", post(receive_webhook))
        .with_state(state)
}
