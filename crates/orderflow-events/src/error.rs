//! Error types for the orderflow-events crate.

use thiserror::Error;

/// Errors that can occur while parsing or recording events.
#[derive(Debug, Error)]
pub enum EventError {
    /// Webhook body is not a well-formed provider event.
    #[error("Invalid event payload: {reason}")]
    InvalidPayload { reason: String },

    /// The event store cannot be reached. Callers must fail closed and
    /// not fan out an unrecorded event.
    #[error("Event store unavailable: {detail}")]
    StoreUnavailable { detail: String },
}
