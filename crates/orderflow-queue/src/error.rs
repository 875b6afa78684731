//! Error types for the topic queue.

use thiserror::Error;
use uuid::Uuid;

/// Errors returned by queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue reached its configured depth bound.
    #[error("Queue '{topic}' is full (depth {depth})")]
    Full { topic: String, depth: usize },

    /// The queue was closed and accepts no new messages.
    #[error("Queue '{topic}' is closed")]
    Closed { topic: String },

    /// The referenced message does not exist (redrive only; acknowledging
    /// an unknown message is an idempotent no-op, not an error).
    #[error("Unknown message {message_id}")]
    UnknownMessage { message_id: Uuid },
}
