//! Idempotent order persistence.
//!
//! Orders are keyed by the business order id and mutated only by the
//! order worker. All writes are terminal-status protected: once an order
//! reaches Fulfilled or Failed, further writes are ignored rather than
//! applied, which is what makes duplicate queue deliveries harmless.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use orderflow_events::LineItem;

/// Order lifecycle states. Fulfilled and Failed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Received,
    Processing,
    Fulfilled,
    Failed,
}

impl OrderStatus {
    /// Whether this status admits no further writes.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Fulfilled | Self::Failed)
    }
}

/// A persisted order record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: String,
    pub status: OrderStatus,
    pub amount_total: i64,
    pub currency: String,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub payment_intent_id: Option<String>,
    pub subscription_id: Option<String>,
    pub line_items: Vec<LineItem>,
    pub amount_paid: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub payment_confirmed_at: Option<DateTime<Utc>>,
}

/// Content fields for an order upsert.
#[derive(Debug, Clone, Default)]
pub struct OrderFields {
    pub amount_total: i64,
    pub currency: String,
    pub customer_id: Option<String>,
    pub customer_email: Option<String>,
    pub payment_intent_id: Option<String>,
    pub line_items: Vec<LineItem>,
}

/// Outcome of a terminal-protected write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new record was created.
    Created,
    /// An existing non-terminal record was updated.
    Updated,
    /// The record is terminal; nothing was written.
    Ignored { current: OrderStatus },
}

/// Errors from order store operations.
#[derive(Debug, Error)]
pub enum OrderStoreError {
    /// Backing store cannot be reached; the write should be retried.
    #[error("Order store unavailable: {detail}")]
    Unavailable { detail: String },

    /// The referenced order does not exist.
    #[error("Order not found: {order_id}")]
    NotFound { order_id: String },
}

/// Persistent, idempotent order record store.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Create the order or replace its content fields, unless it already
    /// reached a terminal status. Replaying the same write is idempotent:
    /// fields are replaced wholesale, never appended.
    async fn upsert_if_not_terminal(
        &self,
        order_id: &str,
        fields: OrderFields,
    ) -> Result<UpsertOutcome, OrderStoreError>;

    /// Move an existing order to a new status, unless terminal.
    async fn transition(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<UpsertOutcome, OrderStoreError>;

    /// Record a payment confirmation. Creates a skeleton record when the
    /// order has not been seen yet (payment events can arrive first).
    async fn confirm_payment(
        &self,
        order_id: &str,
        at: DateTime<Utc>,
        amount: i64,
        currency: &str,
    ) -> Result<UpsertOutcome, OrderStoreError>;

    /// Apply invoice/subscription fields from an order-updated event.
    /// Creates the record when absent, mirroring an upsert-style update.
    async fn apply_invoice(
        &self,
        order_id: &str,
        subscription_id: Option<String>,
        amount_paid: Option<i64>,
        currency: &str,
    ) -> Result<UpsertOutcome, OrderStoreError>;

    /// Fetch an order by id.
    async fn get(&self, order_id: &str) -> Result<Option<Order>, OrderStoreError>;
}

/// In-memory order store. All writes are CAS-style under one mutex.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    orders: Mutex<HashMap<String, Order>>,
}

impl InMemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn upsert_if_not_terminal(
        &self,
        order_id: &str,
        fields: OrderFields,
    ) -> Result<UpsertOutcome, OrderStoreError> {
        let mut orders = self.orders.lock().await;
        let now = Utc::now();

        let outcome = match orders.get_mut(order_id) {
            Some(order) if order.status.is_terminal() => UpsertOutcome::Ignored {
                current: order.status,
            },
            Some(order) => {
                order.amount_total = fields.amount_total;
                order.currency = fields.currency;
                order.customer_id = fields.customer_id;
                order.customer_email = fields.customer_email;
                order.payment_intent_id = fields.payment_intent_id;
                order.line_items = fields.line_items;
                order.updated_at = now;
                UpsertOutcome::Updated
            }
            None => {
                orders.insert(
                    order_id.to_string(),
                    Order {
                        order_id: order_id.to_string(),
                        status: OrderStatus::Received,
                        amount_total: fields.amount_total,
                        currency: fields.currency,
                        customer_id: fields.customer_id,
                        customer_email: fields.customer_email,
                        payment_intent_id: fields.payment_intent_id,
                        subscription_id: None,
                        line_items: fields.line_items,
                        amount_paid: None,
                        created_at: now,
                        updated_at: now,
                        payment_confirmed_at: None,
                    },
                );
                UpsertOutcome::Created
            }
        };

        debug!(
            target: "order_store",
            order_id = %order_id,
            outcome = ?outcome,
            "Order upsert"
        );

        Ok(outcome)
    }

    async fn transition(
        &self,
        order_id: &str,
        status: OrderStatus,
    ) -> Result<UpsertOutcome, OrderStoreError> {
        let mut orders = self.orders.lock().await;

        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| OrderStoreError::NotFound {
                order_id: order_id.to_string(),
            })?;

        if order.status.is_terminal() {
            return Ok(UpsertOutcome::Ignored {
                current: order.status,
            });
        }

        order.status = status;
        order.updated_at = Utc::now();

        debug!(
            target: "order_store",
            order_id = %order_id,
            status = ?status,
            "Order status transition"
        );

        Ok(UpsertOutcome::Updated)
    }

    async fn confirm_payment(
        &self,
        order_id: &str,
        at: DateTime<Utc>,
        amount: i64,
        currency: &str,
    ) -> Result<UpsertOutcome, OrderStoreError> {
        let mut orders = self.orders.lock().await;
        let now = Utc::now();

        match orders.get_mut(order_id) {
            Some(order) if order.status.is_terminal() => Ok(UpsertOutcome::Ignored {
                current: order.status,
            }),
            Some(order) => {
                order.payment_confirmed_at = Some(at);
                order.amount_paid = Some(amount);
                order.updated_at = now;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                orders.insert(
                    order_id.to_string(),
                    Order {
                        order_id: order_id.to_string(),
                        status: OrderStatus::Received,
                        amount_total: amount,
                        currency: currency.to_string(),
                        customer_id: None,
                        customer_email: None,
                        payment_intent_id: Some(order_id.to_string()),
                        subscription_id: None,
                        line_items: Vec::new(),
                        amount_paid: Some(amount),
                        created_at: now,
                        updated_at: now,
                        payment_confirmed_at: Some(at),
                    },
                );
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn apply_invoice(
        &self,
        order_id: &str,
        subscription_id: Option<String>,
        amount_paid: Option<i64>,
        currency: &str,
    ) -> Result<UpsertOutcome, OrderStoreError> {
        let mut orders = self.orders.lock().await;
        let now = Utc::now();

        match orders.get_mut(order_id) {
            Some(order) if order.status.is_terminal() => Ok(UpsertOutcome::Ignored {
                current: order.status,
            }),
            Some(order) => {
                if subscription_id.is_some() {
                    order.subscription_id = subscription_id;
                }
                if amount_paid.is_some() {
                    order.amount_paid = amount_paid;
                }
                order.updated_at = now;
                Ok(UpsertOutcome::Updated)
            }
            None => {
                orders.insert(
                    order_id.to_string(),
                    Order {
                        order_id: order_id.to_string(),
                        status: OrderStatus::Received,
                        amount_total: amount_paid.unwrap_or(0),
                        currency: currency.to_string(),
                        customer_id: None,
                        customer_email: None,
                        payment_intent_id: None,
                        subscription_id,
                        line_items: Vec::new(),
                        amount_paid,
                        created_at: now,
                        updated_at: now,
                        payment_confirmed_at: None,
                    },
                );
                Ok(UpsertOutcome::Created)
            }
        }
    }

    async fn get(&self, order_id: &str) -> Result<Option<Order>, OrderStoreError> {
        Ok(self.orders.lock().await.get(order_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(amount: i64) -> OrderFields {
        OrderFields {
            amount_total: amount,
            currency: "usd".to_string(),
            customer_email: Some("buyer@example.com".to_string()),
            ..OrderFields::default()
        }
    }

    #[tokio::test]
    async fn test_first_upsert_creates_received() {
        let store = InMemoryOrderStore::new();
        let outcome = store.upsert_if_not_terminal("cs_1", fields(2000)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);

        let order = store.get("cs_1").await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::Received);
        assert_eq!(order.amount_total, 2000);
    }

    #[tokio::test]
    async fn test_repeat_upsert_does_not_duplicate() {
        let store = InMemoryOrderStore::new();
        store.upsert_if_not_terminal("cs_1", fields(2000)).await.unwrap();
        let outcome = store.upsert_if_not_terminal("cs_1", fields(2000)).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        let order = store.get("cs_1").await.unwrap().unwrap();
        assert_eq!(order.amount_total, 2000);
        assert!(order.line_items.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_order_ignores_writes() {
        let store = InMemoryOrderStore::new();
        store.upsert_if_not_terminal("cs_1", fields(2000)).await.unwrap();
        store.transition("cs_1", OrderStatus::Fulfilled).await.unwrap();

        // Twice, per the idempotency property: Ignored both times, no
        // field changes after the terminal write.
        for _ in 0..2 {
            let outcome = store.upsert_if_not_terminal("cs_1", fields(9999)).await.unwrap();
            assert_eq!(
                outcome,
                UpsertOutcome::Ignored {
                    current: OrderStatus::Fulfilled
                }
            );
        }

        let order = store.get("cs_1").await.unwrap().unwrap();
        assert_eq!(order.amount_total, 2000);
        assert_eq!(order.status, OrderStatus::Fulfilled);
    }

    #[tokio::test]
    async fn test_transition_terminal_is_ignored() {
        let store = InMemoryOrderStore::new();
        store.upsert_if_not_terminal("cs_1", fields(2000)).await.unwrap();
        store.transition("cs_1", OrderStatus::Failed).await.unwrap();

        let outcome = store.transition("cs_1", OrderStatus::Fulfilled).await.unwrap();
        assert_eq!(
            outcome,
            UpsertOutcome::Ignored {
                current: OrderStatus::Failed
            }
        );
    }

    #[tokio::test]
    async fn test_transition_unknown_order_is_not_found() {
        let store = InMemoryOrderStore::new();
        let result = store.transition("cs_missing", OrderStatus::Fulfilled).await;
        assert!(matches!(result, Err(OrderStoreError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_confirm_payment_creates_skeleton_when_first() {
        let store = InMemoryOrderStore::new();
        let outcome = store
            .confirm_payment("pi_1", Utc::now(), 2000, "usd")
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Created);

        let order = store.get("pi_1").await.unwrap().unwrap();
        assert!(order.payment_confirmed_at.is_some());
        assert_eq!(order.amount_paid, Some(2000));
    }

    #[tokio::test]
    async fn test_apply_invoice_updates_subscription() {
        let store = InMemoryOrderStore::new();
        store.upsert_if_not_terminal("in_1", fields(999)).await.unwrap();

        let outcome = store
            .apply_invoice("in_1", Some("sub_1".to_string()), Some(999), "usd")
            .await
            .unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);

        let order = store.get("in_1").await.unwrap().unwrap();
        assert_eq!(order.subscription_id.as_deref(), Some("sub_1"));
    }
}
