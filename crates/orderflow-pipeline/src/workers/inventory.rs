//! Inventory topic consumer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::info;

use orderflow_events::{InventoryMessage, LineItem};
use orderflow_queue::QueueMessage;

use crate::collaborators::{CollaboratorError, Warehouse};

use super::{guard_cutoff, HandleError, MessageHandler, DEFAULT_GUARD_WINDOW};

/// Placeholder SKU for orders that carried no item metadata. The
/// warehouse treats it as a manual-review reservation.
const GENERIC_SKU: &str = "GENERIC";

/// Reserves warehouse stock for each line item on an order.
///
/// Reservations are guarded by `(order_id, sku)` so a redelivery never
/// double-reserves; guard entries expire after a bounded window, the
/// same reasoning as the event store's dedupe sweep. An order with no
/// line items gets one generic reservation instead of being dropped
/// silently.
pub struct InventoryReserver {
    warehouse: Arc<dyn Warehouse>,
    guard_window: Duration,
    reserved: Mutex<HashMap<(String, String), DateTime<Utc>>>,
}

impl InventoryReserver {
    pub fn new(warehouse: Arc<dyn Warehouse>) -> Self {
        Self {
            warehouse,
            guard_window: DEFAULT_GUARD_WINDOW,
            reserved: Mutex::new(HashMap::new()),
        }
    }

    /// Override how long a reservation-guard entry is retained. Must
    /// cover the queue's full retry horizon.
    #[must_use]
    pub fn with_guard_window(mut self, window: Duration) -> Self {
        self.guard_window = window;
        self
    }
}

#[async_trait]
impl MessageHandler for InventoryReserver {
    fn name(&self) -> &'static str {
        "inventory_worker"
    }

    async fn handle(&self, message: &QueueMessage) -> Result<(), HandleError> {
        let parsed: InventoryMessage = serde_json::from_value(message.body.clone())
            .map_err(|err| HandleError::Fatal(format!("malformed inventory message: {err}")))?;

        let mut items = parsed.line_items;
        if items.is_empty() {
            items.push(LineItem {
                sku: GENERIC_SKU.to_string(),
                quantity: 1,
                name: "Unknown".to_string(),
            });
        }

        {
            let mut reserved = self.reserved.lock().await;
            let cutoff = guard_cutoff(self.guard_window);
            reserved.retain(|_, reserved_at| *reserved_at >= cutoff);
        }

        for item in items {
            let guard_key = (parsed.order_id.clone(), item.sku.clone());
            {
                let reserved = self.reserved.lock().await;
                if reserved.contains_key(&guard_key) {
                    continue;
                }
            }

            match self
                .warehouse
                .reserve(&item.sku, item.quantity, &parsed.order_id)
                .await
            {
                Ok(()) => {
                    self.reserved.lock().await.insert(guard_key, Utc::now());
                    info!(
                        target: "inventory_worker",
                        order_id = %parsed.order_id,
                        sku = %item.sku,
                        quantity = item.quantity,
                        "Stock reserved"
                    );
                }
                // A partial reservation set is fine to retry: already
                // reserved SKUs are skipped by the guard on redelivery.
                Err(CollaboratorError::Transient(reason)) => {
                    return Err(HandleError::Retryable(reason));
                }
                Err(CollaboratorError::Permanent(reason)) => {
                    return Err(HandleError::Fatal(format!(
                        "reservation rejected for sku {}: {reason}",
                        item.sku
                    )));
                }
            }
        }

        Ok(())
    }
}
