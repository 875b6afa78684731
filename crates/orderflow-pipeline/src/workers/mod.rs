//! Pull-loop consumer workers.
//!
//! Each worker repeatedly receives one message from its topic queue,
//! runs the topic's [`MessageHandler`], then acknowledges or negatively
//! acknowledges based on the outcome. Retry scheduling, backoff, and
//! dead-lettering all live in the queue; the handler only decides
//! whether a failure is worth retrying.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use orderflow_queue::{QueueMessage, TopicQueue};

mod email;
mod inventory;
mod order;

pub use email::EmailDispatcher;
pub use inventory::InventoryReserver;
pub use order::OrderProcessor;

/// Why a handler could not process a message.
#[derive(Debug, Error)]
pub enum HandleError {
    /// Transient condition; the message should be redelivered.
    #[error("Retryable failure: {0}")]
    Retryable(String),

    /// The message can never succeed; retrying would only burn attempts.
    #[error("Fatal failure: {0}")]
    Fatal(String),
}

/// Processes one queue message for a topic.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handler name, used as the logging target.
    fn name(&self) -> &'static str;

    async fn handle(&self, message: &QueueMessage) -> Result<(), HandleError>;
}

/// A set of worker tasks draining one topic queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `concurrency` workers over the queue. Workers stop when the
    /// cancellation token fires or the queue is closed and drained; a
    /// message already being processed is always finished first.
    pub fn spawn(
        queue: Arc<TopicQueue>,
        handler: Arc<dyn MessageHandler>,
        concurrency: usize,
        cancel: CancellationToken,
        poll_timeout: Duration,
    ) -> Self {
        let handles = (0..concurrency.max(1))
            .map(|worker_index| {
                let queue = Arc::clone(&queue);
                let handler = Arc::clone(&handler);
                let cancel = cancel.clone();
                tokio::spawn(run_worker(queue, handler, worker_index, cancel, poll_timeout))
            })
            .collect();

        Self { handles }
    }

    /// Wait for every worker in the pool to exit.
    pub async fn join(self) {
        for handle in self.handles {
            // A worker task only ends by returning or by pool shutdown.
            let _ = handle.await;
        }
    }
}

async fn run_worker(
    queue: Arc<TopicQueue>,
    handler: Arc<dyn MessageHandler>,
    worker_index: usize,
    cancel: CancellationToken,
    poll_timeout: Duration,
) {
    info!(
        target: "worker",
        handler = handler.name(),
        topic = queue.topic(),
        worker_index,
        "Worker started"
    );

    loop {
        let message = tokio::select! {
            _ = cancel.cancelled() => break,
            received = queue.receive(poll_timeout) => match received {
                Some(message) => message,
                None if queue.is_closed().await => break,
                None => continue,
            },
        };

        // Once a message is in flight we finish it even if shutdown is
        // requested mid-handle; the ack or nack below keeps the queue's
        // bookkeeping consistent.
        match handler.handle(&message).await {
            Ok(()) => {
                debug!(
                    target: "worker",
                    handler = handler.name(),
                    event_id = %message.event_id,
                    message_id = %message.message_id,
                    attempt = message.attempt,
                    "Message processed"
                );
                queue.acknowledge(message.message_id).await;
            }
            Err(HandleError::Retryable(reason)) => {
                debug!(
                    target: "worker",
                    handler = handler.name(),
                    event_id = %message.event_id,
                    message_id = %message.message_id,
                    attempt = message.attempt,
                    reason = %reason,
                    "Message failed, scheduling retry"
                );
                queue.nack(message.message_id, &reason).await;
            }
            Err(HandleError::Fatal(reason)) => {
                error!(
                    target: "worker",
                    handler = handler.name(),
                    event_id = %message.event_id,
                    message_id = %message.message_id,
                    reason = %reason,
                    "Message dropped after fatal failure"
                );
                queue.acknowledge(message.message_id).await;
            }
        }
    }

    info!(
        target: "worker",
        handler = handler.name(),
        topic = queue.topic(),
        worker_index,
        "Worker stopped"
    );
}

/// How long consumer idempotency guards remember a processed key.
/// Duplicates only arrive within the queue's retry horizon (visibility
/// timeout plus the capped backoff schedule), which this comfortably
/// covers; expiring entries keeps the guards bounded.
pub(crate) const DEFAULT_GUARD_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Oldest timestamp a guard entry may carry and still be retained.
pub(crate) fn guard_cutoff(window: Duration) -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
        - chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::hours(1))
}

/// Zero-decimal currencies whose amounts are not in minor units.
const ZERO_DECIMAL_CURRENCIES: [&str; 9] =
    ["jpy", "krw", "vnd", "clp", "pyg", "rwf", "ugx", "xaf", "xof"];

/// Render a provider amount as a human-readable string, honoring
/// zero-decimal currencies. Negative amounts (refunds, adjustments)
/// keep their sign; whole units are grouped by thousands.
pub(crate) fn format_amount(amount: i64, currency: &str) -> String {
    let currency_lower = currency.to_ascii_lowercase();
    let upper = currency.to_ascii_uppercase();
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();

    if ZERO_DECIMAL_CURRENCIES.contains(&currency_lower.as_str()) {
        format!("{sign}{} {upper}", group_thousands(abs))
    } else {
        format!("{sign}{}.{:02} {upper}", group_thousands(abs / 100), abs % 100)
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}
