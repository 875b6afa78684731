//! Provider event parsing and type mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EventError;

/// Provider event types the pipeline understands.
///
/// Each known type maps to one internal pipeline event
/// (`order_created`, `payment_confirmed`, `order_updated`); everything
/// else is retained as `Other` and fans out to zero topics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventType {
    /// `checkout.session.completed` — a new order was placed.
    CheckoutCompleted,
    /// `payment_intent.succeeded` — payment for an order cleared.
    PaymentSucceeded,
    /// `invoice.payment_succeeded` — a subscription invoice was paid.
    InvoicePaymentSucceeded,
    /// Any provider type the pipeline does not consume.
    Other(String),
}

impl EventType {
    /// Parse a provider type string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "checkout.session.completed" => Self::CheckoutCompleted,
            "payment_intent.succeeded" => Self::PaymentSucceeded,
            "invoice.payment_succeeded" => Self::InvoicePaymentSucceeded,
            other => Self::Other(other.to_string()),
        }
    }

    /// The provider-side type string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::CheckoutCompleted => "checkout.session.completed",
            Self::PaymentSucceeded => "payment_intent.succeeded",
            Self::InvoicePaymentSucceeded => "invoice.payment_succeeded",
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw provider event shape used for deserialization.
#[derive(Debug, Deserialize, Serialize)]
struct RawProviderEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: RawEventData,
}

#[derive(Debug, Deserialize, Serialize)]
struct RawEventData {
    #[serde(default)]
    object: Value,
}

/// A verified, accepted webhook event.
///
/// Immutable after creation; retained in the event store for the dedupe
/// window, then evicted.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Provider-assigned globally unique identifier.
    pub event_id: String,
    /// Parsed provider event type.
    pub event_type: EventType,
    /// Timestamp the provider created the event (unix seconds).
    pub created: i64,
    /// Timestamp of verified receipt.
    pub received_at: DateTime<Utc>,
    /// The event's `data.object` payload, kept opaque until projection.
    pub object: Value,
}

impl InboundEvent {
    /// Parse a provider webhook body.
    ///
    /// Requires `id`, `type`, `created` and `data` fields; anything else
    /// is rejected as invalid.
    pub fn from_body(body: &[u8], received_at: DateTime<Utc>) -> Result<Self, EventError> {
        let raw: RawProviderEvent =
            serde_json::from_slice(body).map_err(|e| EventError::InvalidPayload {
                reason: e.to_string(),
            })?;

        if raw.id.is_empty() {
            return Err(EventError::InvalidPayload {
                reason: "event id is empty".to_string(),
            });
        }
        if raw.event_type.is_empty() {
            return Err(EventError::InvalidPayload {
                reason: "event type is empty".to_string(),
            });
        }

        Ok(Self {
            event_id: raw.id,
            event_type: EventType::parse(&raw.event_type),
            created: raw.created,
            received_at,
            object: raw.data.object,
        })
    }
}
