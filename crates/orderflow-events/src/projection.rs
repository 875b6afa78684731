//! Per-topic message projections.
//!
//! One accepted event fans out to up to three consumer-specific message
//! bodies, one per topic. Projection is a pure function of the event: no
//! I/O, no clock. Unknown event types project to an empty set — the event
//! is recorded but fanned out to zero topics.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::EventError;
use crate::event::{EventType, InboundEvent};

/// The fixed set of fan-out topics. Each has exactly one consumer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    Order,
    Email,
    Inventory,
}

impl Topic {
    /// All topics, in fan-out order.
    pub const ALL: [Topic; 3] = [Topic::Order, Topic::Email, Topic::Inventory];

    /// Topic name for logging and configuration.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Email => "email",
            Self::Inventory => "inventory",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A product line item attached to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub sku: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default = "default_item_name")]
    pub name: String,
}

fn default_quantity() -> u32 {
    1
}

fn default_item_name() -> String {
    "Unknown".to_string()
}

/// Message body delivered on the order topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum OrderMessage {
    OrderCreated {
        order_id: String,
        session_id: Option<String>,
        payment_intent_id: Option<String>,
        customer_id: Option<String>,
        customer_email: Option<String>,
        amount_total: i64,
        currency: String,
        line_items: Vec<LineItem>,
        timestamp: i64,
    },
    PaymentConfirmed {
        payment_intent_id: String,
        amount: i64,
        currency: String,
        customer_id: Option<String>,
        timestamp: i64,
    },
    OrderUpdated {
        invoice_id: String,
        customer_id: Option<String>,
        subscription_id: Option<String>,
        amount_paid: Option<i64>,
        currency: String,
        timestamp: i64,
    },
}

/// Message body delivered on the email topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EmailMessage {
    OrderCreated {
        order_id: String,
        customer_email: Option<String>,
        amount_total: i64,
        currency: String,
    },
    PaymentConfirmed {
        payment_intent_id: String,
        customer_email: Option<String>,
        amount: i64,
        currency: String,
    },
}

/// Message body delivered on the inventory topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryMessage {
    pub order_id: String,
    pub line_items: Vec<LineItem>,
}

/// Derive the per-topic message bodies for an event.
///
/// Returns an empty set when the event type is unknown or the payload
/// carries no order identifier the consumers could key on.
pub fn project(event: &InboundEvent) -> Result<Vec<(Topic, Value)>, EventError> {
    let object = &event.object;

    let messages = match event.event_type {
        EventType::CheckoutCompleted => {
            let session_id = opt_str(object, "id");
            let payment_intent_id = opt_str(object, "payment_intent");
            let Some(order_id) = session_id.clone().or_else(|| payment_intent_id.clone()) else {
                return Ok(Vec::new());
            };

            let customer_id = opt_str(object, "customer");
            let customer_email = object
                .get("customer_details")
                .and_then(|d| d.get("email"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let amount_total = opt_i64(object, "amount_total").unwrap_or(0);
            let currency = opt_str(object, "currency").unwrap_or_else(|| "usd".to_string());
            let line_items = parse_line_items(object.get("metadata"));

            vec![
                (
                    Topic::Order,
                    to_value(OrderMessage::OrderCreated {
                        order_id: order_id.clone(),
                        session_id,
                        payment_intent_id,
                        customer_id,
                        customer_email: customer_email.clone(),
                        amount_total,
                        currency: currency.clone(),
                        line_items: line_items.clone(),
                        timestamp: event.created,
                    })?,
                ),
                (
                    Topic::Email,
                    to_value(EmailMessage::OrderCreated {
                        order_id: order_id.clone(),
                        customer_email,
                        amount_total,
                        currency,
                    })?,
                ),
                (
                    Topic::Inventory,
                    to_value(InventoryMessage {
                        order_id,
                        line_items,
                    })?,
                ),
            ]
        }
        EventType::PaymentSucceeded => {
            let Some(payment_intent_id) = opt_str(object, "id") else {
                return Ok(Vec::new());
            };

            let amount = opt_i64(object, "amount").unwrap_or(0);
            let currency = opt_str(object, "currency").unwrap_or_else(|| "usd".to_string());
            let customer_id = opt_str(object, "customer");
            let customer_email = opt_str(object, "receipt_email");

            vec![
                (
                    Topic::Order,
                    to_value(OrderMessage::PaymentConfirmed {
                        payment_intent_id: payment_intent_id.clone(),
                        amount,
                        currency: currency.clone(),
                        customer_id,
                        timestamp: event.created,
                    })?,
                ),
                (
                    Topic::Email,
                    to_value(EmailMessage::PaymentConfirmed {
                        payment_intent_id,
                        customer_email,
                        amount,
                        currency,
                    })?,
                ),
            ]
        }
        EventType::InvoicePaymentSucceeded => {
            let Some(invoice_id) = opt_str(object, "id") else {
                return Ok(Vec::new());
            };

            vec![(
                Topic::Order,
                to_value(OrderMessage::OrderUpdated {
                    invoice_id,
                    customer_id: opt_str(object, "customer"),
                    subscription_id: opt_str(object, "subscription"),
                    amount_paid: opt_i64(object, "amount_paid"),
                    currency: opt_str(object, "currency").unwrap_or_else(|| "usd".to_string()),
                    timestamp: event.created,
                })?,
            )]
        }
        EventType::Other(_) => Vec::new(),
    };

    Ok(messages)
}

/// Parse line items from the provider `metadata.products` field, which
/// arrives either as a JSON array or as a JSON-encoded string.
fn parse_line_items(metadata: Option<&Value>) -> Vec<LineItem> {
    let Some(products) = metadata.and_then(|m| m.get("products")) else {
        return Vec::new();
    };

    let parsed: Result<Vec<LineItem>, _> = match products {
        Value::String(s) => serde_json::from_str(s),
        other => serde_json::from_value(other.clone()),
    };

    parsed.unwrap_or_default()
}

fn opt_str(object: &Value, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn opt_i64(object: &Value, key: &str) -> Option<i64> {
    object.get(key).and_then(Value::as_i64)
}

fn to_value<T: Serialize>(message: T) -> Result<Value, EventError> {
    serde_json::to_value(message).map_err(|e| EventError::InvalidPayload {
        reason: e.to_string(),
    })
}
