//! Inbound payment event model for the orderflow pipeline.
//!
//! Parses provider webhook bodies into [`InboundEvent`]s, maps provider
//! event types onto the pipeline's internal events, derives the per-topic
//! message projections consumed by the workers, and provides the
//! idempotent [`EventStore`] that deduplicates at-least-once delivery from
//! the provider.

pub mod error;
pub mod event;
pub mod projection;
pub mod store;

pub use error::EventError;
pub use event::{EventType, InboundEvent};
pub use projection::{
    project, EmailMessage, InventoryMessage, LineItem, OrderMessage, Topic,
};
pub use store::{EventStore, InMemoryEventStore, RecordOutcome};
