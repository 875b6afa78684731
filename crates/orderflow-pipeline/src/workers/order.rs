//! Order topic consumer.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use orderflow_events::OrderMessage;
use orderflow_queue::QueueMessage;

use crate::order_store::{OrderFields, OrderStatus, OrderStore, OrderStoreError, UpsertOutcome};

use super::{HandleError, MessageHandler};

/// Persists order lifecycle changes into the order store.
pub struct OrderProcessor {
    store: Arc<dyn OrderStore>,
}

impl OrderProcessor {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }
}

fn map_store_error(err: OrderStoreError) -> HandleError {
    match err {
        OrderStoreError::Unavailable { detail } => HandleError::Retryable(detail),
        OrderStoreError::NotFound { order_id } => {
            HandleError::Fatal(format!("order not found: {order_id}"))
        }
    }
}

#[async_trait]
impl MessageHandler for OrderProcessor {
    fn name(&self) -> &'static str {
        "order_worker"
    }

    async fn handle(&self, message: &QueueMessage) -> Result<(), HandleError> {
        let parsed: OrderMessage = serde_json::from_value(message.body.clone())
            .map_err(|err| HandleError::Fatal(format!("malformed order message: {err}")))?;

        match parsed {
            OrderMessage::OrderCreated {
                order_id,
                payment_intent_id,
                customer_id,
                customer_email,
                amount_total,
                currency,
                line_items,
                ..
            } => {
                let outcome = self
                    .store
                    .upsert_if_not_terminal(
                        &order_id,
                        OrderFields {
                            amount_total,
                            currency,
                            customer_id,
                            customer_email,
                            payment_intent_id,
                            line_items,
                        },
                    )
                    .await
                    .map_err(map_store_error)?;

                if let UpsertOutcome::Ignored { current } = outcome {
                    info!(
                        target: "order_worker",
                        order_id = %order_id,
                        status = ?current,
                        "Order already terminal, skipping"
                    );
                    return Ok(());
                }

                self.store
                    .transition(&order_id, OrderStatus::Fulfilled)
                    .await
                    .map_err(map_store_error)?;

                info!(
                    target: "order_worker",
                    order_id = %order_id,
                    "Order fulfilled"
                );
                Ok(())
            }
            OrderMessage::PaymentConfirmed {
                payment_intent_id,
                amount,
                currency,
                timestamp,
                ..
            } => {
                let at = DateTime::from_timestamp(timestamp, 0).unwrap_or_else(Utc::now);
                self.store
                    .confirm_payment(&payment_intent_id, at, amount, &currency)
                    .await
                    .map_err(map_store_error)?;

                info!(
                    target: "order_worker",
                    order_id = %payment_intent_id,
                    "Payment confirmed"
                );
                Ok(())
            }
            OrderMessage::OrderUpdated {
                invoice_id,
                subscription_id,
                amount_paid,
                currency,
                ..
            } => {
                self.store
                    .apply_invoice(&invoice_id, subscription_id, amount_paid, &currency)
                    .await
                    .map_err(map_store_error)?;

                info!(
                    target: "order_worker",
                    order_id = %invoice_id,
                    "Order updated from invoice"
                );
                Ok(())
            }
        }
    }
}
