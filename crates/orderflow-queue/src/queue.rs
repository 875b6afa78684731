//! Topic queue implementation.
//!
//! Per-message state machine:
//! `Enqueued -> InFlight -> { Acknowledged | Enqueued(attempt+1) | DeadLettered }`.
//! A received message is invisible to other receivers until its visibility
//! timeout elapses or it is acknowledged; a nack (or timeout without ack)
//! increments the attempt count and either reschedules the message after a
//! capped exponential backoff or, past the retry ceiling, moves it to the
//! dead letter store.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use crate::error::QueueError;
use crate::message::{DeadLetter, QueueMessage};

/// Tuning for a single topic queue.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Retries allowed after the first failed attempt; once `attempt`
    /// exceeds this, the message is dead-lettered.
    pub retry_ceiling: u32,
    /// Base delay for the `base * 2^attempt` backoff.
    pub backoff_base: Duration,
    /// Upper bound on any single backoff delay.
    pub backoff_cap: Duration,
    /// How long a received message stays invisible without an ack.
    pub visibility_timeout: Duration,
    /// Bound on ready + delayed + in-flight messages.
    pub max_depth: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            retry_ceiling: 3,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(60),
            visibility_timeout: Duration::from_secs(30),
            max_depth: 10_000,
        }
    }
}

impl QueueConfig {
    /// Set the retry ceiling.
    #[must_use]
    pub fn with_retry_ceiling(mut self, ceiling: u32) -> Self {
        self.retry_ceiling = ceiling;
        self
    }

    /// Set the backoff base delay.
    #[must_use]
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Set the backoff cap.
    #[must_use]
    pub fn with_backoff_cap(mut self, cap: Duration) -> Self {
        self.backoff_cap = cap;
        self
    }

    /// Set the visibility timeout.
    #[must_use]
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    /// Set the depth bound.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

/// Snapshot of queue occupancy for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub topic: String,
    pub ready: usize,
    pub delayed: usize,
    pub in_flight: usize,
    pub dead_lettered: usize,
}

#[derive(Debug)]
struct InFlight {
    message: QueueMessage,
    deadline: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    ready: VecDeque<QueueMessage>,
    delayed: Vec<QueueMessage>,
    in_flight: HashMap<Uuid, InFlight>,
    dead_letters: Vec<DeadLetter>,
    /// Event id -> message id, for idempotent re-publish of the same event.
    seen: HashMap<String, Uuid>,
    closed: bool,
}

/// An at-least-once queue for one topic.
#[derive(Debug)]
pub struct TopicQueue {
    topic: String,
    config: QueueConfig,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl TopicQueue {
    /// Create a queue for the named topic.
    #[must_use]
    pub fn new(topic: impl Into<String>, config: QueueConfig) -> Self {
        Self {
            topic: topic.into(),
            config,
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
        }
    }

    /// The topic this queue serves.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Enqueue a message body for an event.
    ///
    /// Idempotent per event id: re-publishing an event this queue already
    /// holds (or has dead-lettered) returns the original message id
    /// without enqueuing a second copy, so fan-out retries are safe.
    pub async fn enqueue(&self, event_id: &str, body: Value) -> Result<Uuid, QueueError> {
        let mut inner = self.inner.lock().await;

        if inner.closed {
            return Err(QueueError::Closed {
                topic: self.topic.clone(),
            });
        }

        if let Some(existing) = inner.seen.get(event_id) {
            tracing::debug!(
                target: "topic_queue",
                topic = %self.topic,
                event_id = %event_id,
                message_id = %existing,
                "Duplicate enqueue ignored"
            );
            return Ok(*existing);
        }

        let depth = inner.ready.len() + inner.delayed.len() + inner.in_flight.len();
        if depth >= self.config.max_depth {
            return Err(QueueError::Full {
                topic: self.topic.clone(),
                depth,
            });
        }

        let now = Utc::now();
        let message = QueueMessage {
            message_id: Uuid::new_v4(),
            event_id: event_id.to_string(),
            body,
            attempt: 0,
            enqueued_at: now,
            visible_after: now,
        };

        tracing::debug!(
            target: "topic_queue",
            topic = %self.topic,
            event_id = %event_id,
            message_id = %message.message_id,
            "Message enqueued"
        );

        inner.seen.insert(event_id.to_string(), message.message_id);
        inner.ready.push_back(message.clone());
        drop(inner);

        self.notify.notify_one();
        Ok(message.message_id)
    }

    /// Receive the oldest available message, waiting up to `poll_timeout`
    /// when the queue is empty.
    ///
    /// The returned message is marked in-flight and stays invisible to
    /// other receivers until it is acknowledged, nacked, or its visibility
    /// timeout expires. Returns `None` on poll timeout (or immediately when
    /// the queue is closed and drained) so caller loops can observe
    /// cancellation promptly.
    pub async fn receive(&self, poll_timeout: Duration) -> Option<QueueMessage> {
        let deadline = tokio::time::Instant::now() + poll_timeout;

        loop {
            // Register for wakeups before inspecting state, so an enqueue
            // between the inspection and the await is not lost.
            let notified = self.notify.notified();

            let (message, next_wake, drained_closed) = {
                let mut inner = self.inner.lock().await;
                self.reap_expired(&mut inner);
                self.promote_delayed(&mut inner);

                if let Some(message) = inner.ready.pop_front() {
                    let deadline = Utc::now()
                        + chrono::Duration::from_std(self.config.visibility_timeout)
                            .unwrap_or_else(|_| chrono::Duration::seconds(30));
                    inner.in_flight.insert(
                        message.message_id,
                        InFlight {
                            message: message.clone(),
                            deadline,
                        },
                    );
                    (Some(message), None, false)
                } else {
                    let drained = inner.closed
                        && inner.delayed.is_empty()
                        && inner.in_flight.is_empty();
                    (None, next_wake_at(&inner), drained)
                }
            };

            if let Some(message) = message {
                tracing::trace!(
                    target: "topic_queue",
                    topic = %self.topic,
                    message_id = %message.message_id,
                    attempt = message.attempt,
                    "Message delivered"
                );
                return Some(message);
            }

            if drained_closed {
                return None;
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return None;
            }

            let wake = match next_wake {
                Some(at) => {
                    let until = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    deadline.min(now + until)
                }
                None => deadline,
            };

            tokio::select! {
                () = notified => {}
                () = tokio::time::sleep_until(wake) => {}
            }
        }
    }

    /// Acknowledge a delivered message, removing it permanently.
    ///
    /// Acknowledging an unknown or already-acknowledged message id is an
    /// idempotent no-op.
    pub async fn acknowledge(&self, message_id: Uuid) {
        let mut inner = self.inner.lock().await;

        if let Some(in_flight) = inner.in_flight.remove(&message_id) {
            inner.seen.remove(&in_flight.message.event_id);
            tracing::debug!(
                target: "topic_queue",
                topic = %self.topic,
                message_id = %message_id,
                event_id = %in_flight.message.event_id,
                "Message acknowledged"
            );
        }
    }

    /// Negatively acknowledge a delivered message.
    ///
    /// Increments the attempt count and either reschedules the message
    /// after backoff or dead-letters it past the retry ceiling. Unknown
    /// message ids are ignored (the visibility timeout may already have
    /// reaped the message).
    pub async fn nack(&self, message_id: Uuid, reason: &str) {
        let mut inner = self.inner.lock().await;

        if let Some(in_flight) = inner.in_flight.remove(&message_id) {
            self.fail_locked(&mut inner, in_flight.message, reason);
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Dead letters held by this queue.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.lock().await.dead_letters.clone()
    }

    /// Move a dead letter back onto the queue with a reset attempt count.
    pub async fn redrive(&self, message_id: Uuid) -> Result<Uuid, QueueError> {
        let mut inner = self.inner.lock().await;

        let position = inner
            .dead_letters
            .iter()
            .position(|entry| entry.message.message_id == message_id)
            .ok_or(QueueError::UnknownMessage { message_id })?;

        let mut message = inner.dead_letters.remove(position).message;
        message.attempt = 0;
        message.visible_after = Utc::now();

        tracing::info!(
            target: "dlq",
            topic = %self.topic,
            message_id = %message.message_id,
            event_id = %message.event_id,
            "Dead letter redriven"
        );

        inner.ready.push_back(message);
        drop(inner);

        self.notify.notify_one();
        Ok(message_id)
    }

    /// Close the queue: enqueues fail, receivers drain what remains.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.closed = true;
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Whether the queue has been closed to new work.
    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.closed
    }

    /// Occupancy snapshot.
    pub async fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().await;
        QueueStats {
            topic: self.topic.clone(),
            ready: inner.ready.len(),
            delayed: inner.delayed.len(),
            in_flight: inner.in_flight.len(),
            dead_lettered: inner.dead_letters.len(),
        }
    }

    /// Messages awaiting delivery (ready + delayed).
    pub async fn depth(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.ready.len() + inner.delayed.len()
    }

    /// Messages currently in flight.
    pub async fn in_flight_count(&self) -> usize {
        self.inner.lock().await.in_flight.len()
    }

    /// Reap in-flight messages whose visibility timeout expired; an expiry
    /// counts as a failed attempt so a crashing consumer cannot hold a
    /// message below the ceiling forever.
    fn reap_expired(&self, inner: &mut Inner) {
        let now = Utc::now();
        let expired: Vec<Uuid> = inner
            .in_flight
            .iter()
            .filter(|(_, f)| f.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for message_id in expired {
            if let Some(in_flight) = inner.in_flight.remove(&message_id) {
                tracing::warn!(
                    target: "topic_queue",
                    topic = %self.topic,
                    message_id = %message_id,
                    "Visibility timeout expired without ack"
                );
                self.fail_locked(inner, in_flight.message, "visibility timeout expired");
            }
        }
    }

    /// Move delayed messages whose backoff elapsed into the ready set.
    fn promote_delayed(&self, inner: &mut Inner) {
        let now = Utc::now();
        let mut promoted: Vec<QueueMessage> = Vec::new();
        inner.delayed.retain(|message| {
            if message.visible_after <= now {
                promoted.push(message.clone());
                false
            } else {
                true
            }
        });

        promoted.sort_by_key(|message| message.visible_after);
        inner.ready.extend(promoted);
    }

    /// Record a failed attempt: reschedule with backoff or dead-letter.
    fn fail_locked(&self, inner: &mut Inner, mut message: QueueMessage, reason: &str) {
        message.attempt += 1;

        if message.attempt > self.config.retry_ceiling {
            tracing::warn!(
                target: "dlq",
                topic = %self.topic,
                message_id = %message.message_id,
                event_id = %message.event_id,
                attempt = message.attempt,
                reason = %reason,
                "Retry ceiling exceeded, message dead-lettered"
            );
            inner.dead_letters.push(DeadLetter {
                message,
                failure_reason: reason.to_string(),
                dead_lettered_at: Utc::now(),
            });
            return;
        }

        let delay = backoff_delay(&self.config, message.attempt);
        message.visible_after =
            Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| {
                chrono::Duration::seconds(60)
            });

        tracing::info!(
            target: "topic_queue",
            topic = %self.topic,
            message_id = %message.message_id,
            event_id = %message.event_id,
            attempt = message.attempt,
            delay_ms = delay.as_millis() as u64,
            reason = %reason,
            "Message scheduled for retry"
        );

        inner.delayed.push(message);
    }
}

/// Earliest instant at which queue state can change without an enqueue.
fn next_wake_at(inner: &Inner) -> Option<DateTime<Utc>> {
    let delayed = inner.delayed.iter().map(|m| m.visible_after).min();
    let in_flight = inner.in_flight.values().map(|f| f.deadline).min();
    match (delayed, in_flight) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    }
}

/// Backoff for the given attempt: `base * 2^attempt`, capped.
fn backoff_delay(config: &QueueConfig, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(16));
    config
        .backoff_base
        .checked_mul(factor)
        .unwrap_or(config.backoff_cap)
        .min(config.backoff_cap)
}
