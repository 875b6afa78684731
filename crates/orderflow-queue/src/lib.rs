//! In-process at-least-once topic queue.
//!
//! Each topic owns one [`TopicQueue`]: a producer enqueues consumer-specific
//! message bodies, a pool of competing consumers receives them under a
//! visibility timeout, and failed deliveries retry with capped exponential
//! backoff until the retry ceiling moves them to the queue's dead letter
//! store. Delivery is at-least-once; consumers must be idempotent.

pub mod error;
pub mod message;
pub mod queue;

pub use error::QueueError;
pub use message::{DeadLetter, QueueMessage};
pub use queue::{QueueConfig, QueueStats, TopicQueue};
