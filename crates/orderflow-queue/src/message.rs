//! Queue message and dead letter records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A message flowing through a topic queue.
///
/// `message_id` is generated per enqueue and is independent of the
/// originating event id: one inbound event fans out to one message per
/// topic. `attempt` counts completed delivery attempts and only ever
/// increases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: Uuid,
    /// Id of the inbound event this message was projected from.
    pub event_id: String,
    /// Consumer-specific body.
    pub body: Value,
    /// Completed delivery attempts, starting at 0.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
    /// The message must not be delivered before this instant.
    pub visible_after: DateTime<Utc>,
}

/// A message that exhausted its retries, held for operator inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub message: QueueMessage,
    /// Reason recorded with the final failed attempt.
    pub failure_reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}
