//! Order processing pipeline: fan-out, consumer workers, order persistence.
//!
//! The [`FanoutBus`] takes a recorded inbound event and hands its per-topic
//! projections to the three topic queues. Each topic is drained by a pool
//! of pull-loop workers: [`workers::OrderProcessor`] persists orders into
//! the [`OrderStore`], [`workers::EmailDispatcher`] triggers confirmation
//! mail through the [`MailSender`] collaborator, and
//! [`workers::InventoryReserver`] reserves stock through the [`Warehouse`]
//! collaborator. Every consumer is idempotent-first: the queues guarantee
//! at-least-once delivery and nothing more.

pub mod collaborators;
pub mod fanout;
pub mod order_store;
pub mod workers;

pub use collaborators::{
    CollaboratorError, LoggingMailSender, LoggingWarehouse, MailSender, Warehouse,
};
pub use fanout::{FanoutBus, PublishOutcome};
pub use order_store::{
    InMemoryOrderStore, Order, OrderFields, OrderStatus, OrderStore, OrderStoreError,
    UpsertOutcome,
};
pub use workers::{
    EmailDispatcher, HandleError, InventoryReserver, MessageHandler, OrderProcessor, WorkerPool,
};
