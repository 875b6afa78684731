//! Webhook ingress handler.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use orderflow_events::{InboundEvent, RecordOutcome};
use orderflow_pipeline::PublishOutcome;

use crate::error::{ApiResult, IngestError};
use crate::signature;
use crate::state::IngestState;

/// Header carrying the payload signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Accepted-webhook response body.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub duplicate: bool,
    pub event_id: String,
}

/// `POST /webhook`
///
/// Verification happens on the raw body bytes before any JSON parsing;
/// the parsed form only matters once the payload is authenticated. A
/// replayed event id returns 200 without fanning out again, because the
/// provider treats anything else as a delivery failure and retries.
pub async fn receive_webhook(
    State(state): State<IngestState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookResponse>> {
    let header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(IngestError::MissingSignature)?;

    let now = Utc::now();
    signature::verify(&body, header, &state.signing_secret, state.tolerance, now).map_err(
        |rejection| {
            warn!(
                target: "webhook_ingest",
                reason = %rejection,
                "Webhook signature rejected"
            );
            IngestError::from(rejection)
        },
    )?;

    let event = InboundEvent::from_body(&body, now)?;

    match state.store.record_if_new(&event.event_id, now).await? {
        RecordOutcome::Duplicate => {
            info!(
                target: "webhook_ingest",
                event_id = %event.event_id,
                event_type = event.event_type.as_str(),
                "Duplicate webhook delivery, skipping fan-out"
            );
            return Ok(Json(WebhookResponse {
                received: true,
                duplicate: true,
                event_id: event.event_id,
            }));
        }
        RecordOutcome::Accepted => {}
    }

    match state.bus.publish(&event).await? {
        PublishOutcome::Published { topics } => {
            info!(
                target: "webhook_ingest",
                event_id = %event.event_id,
                event_type = event.event_type.as_str(),
                topics = topics.len(),
                "Webhook accepted"
            );
        }
        // The event is already recorded, so the provider must not
        // redeliver it; the failed topics are retryable out of band.
        PublishOutcome::PartialFailure { failed } => {
            error!(
                target: "webhook_ingest",
                event_id = %event.event_id,
                failed_topics = ?failed,
                "Webhook recorded but fan-out partially failed"
            );
        }
    }

    Ok(Json(WebhookResponse {
        received: true,
        duplicate: false,
        event_id: event.event_id,
    }))
}
