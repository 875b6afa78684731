//! Idempotent event store.
//!
//! Deduplicates at-least-once delivery from the webhook provider: the
//! first caller to record an event id wins, every other caller observes a
//! duplicate. Entries live for a bounded dedupe window and are evicted by
//! a periodic sweep.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::EventError;

/// Outcome of a `record_if_new` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// First sighting of this event id; the caller owns fan-out.
    Accepted,
    /// The id is already recorded; acknowledge without reprocessing.
    Duplicate,
}

/// Durable, idempotent record of accepted event ids.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Atomically check-and-insert an event id.
    ///
    /// Under concurrent calls with the same id exactly one caller gets
    /// `Accepted`; all others get `Duplicate`. On `StoreUnavailable` the
    /// caller must fail closed and not fan out.
    async fn record_if_new(
        &self,
        event_id: &str,
        arrival: DateTime<Utc>,
    ) -> Result<RecordOutcome, EventError>;

    /// Remove entries recorded before the cutoff. Returns the count evicted.
    async fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, EventError>;

    /// Number of live entries.
    async fn len(&self) -> usize;

    /// Whether the store holds no entries.
    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// In-memory event store. Check-and-insert runs under a single mutex, so
/// eviction can never race a concurrent `record_if_new` into observing a
/// half-removed entry.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryEventStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn record_if_new(
        &self,
        event_id: &str,
        arrival: DateTime<Utc>,
    ) -> Result<RecordOutcome, EventError> {
        let mut entries = self.entries.lock().await;

        let outcome = match entries.entry(event_id.to_string()) {
            std::collections::hash_map::Entry::Occupied(_) => RecordOutcome::Duplicate,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(arrival);
                RecordOutcome::Accepted
            }
        };

        debug!(
            target: "event_store",
            event_id = %event_id,
            outcome = ?outcome,
            "Event id recorded"
        );

        Ok(outcome)
    }

    async fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, EventError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, recorded_at| *recorded_at >= cutoff);
        let evicted = before - entries.len();

        if evicted > 0 {
            debug!(
                target: "event_store",
                evicted,
                remaining = entries.len(),
                "Evicted expired event ids"
            );
        }

        Ok(evicted)
    }

    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
