//! Ingress error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use orderflow_events::EventError;

use crate::signature::SignatureRejection;

/// Errors surfaced by the webhook ingress.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Missing Stripe-Signature header")]
    MissingSignature,

    #[error("Malformed signature header: {0}")]
    MalformedSignature(String),

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),

    #[error("Event store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<SignatureRejection> for IngestError {
    fn from(rejection: SignatureRejection) -> Self {
        match rejection {
            SignatureRejection::MalformedHeader(detail) => Self::MalformedSignature(detail),
            // Stale and mismatched signatures both map to 401; the
            // distinction stays in the logs, not the response.
            SignatureRejection::StaleTimestamp | SignatureRejection::BadSignature => {
                Self::SignatureInvalid
            }
        }
    }
}

impl From<EventError> for IngestError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::InvalidPayload { reason } => Self::InvalidPayload(reason),
            EventError::StoreUnavailable { detail } => Self::StoreUnavailable(detail),
        }
    }
}

/// JSON error response returned by the ingress.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub status: u16,
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            IngestError::MissingSignature => (StatusCode::UNAUTHORIZED, "missing_signature"),
            IngestError::MalformedSignature(_) => (StatusCode::BAD_REQUEST, "malformed_signature"),
            IngestError::SignatureInvalid => (StatusCode::UNAUTHORIZED, "invalid_signature"),
            IngestError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "invalid_payload"),
            IngestError::StoreUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
            }
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.to_string(),
            status: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, IngestError>;
