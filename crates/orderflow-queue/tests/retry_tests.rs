//! Integration tests for retry, visibility, and dead-letter behavior.

use std::time::Duration;

use serde_json::json;
use orderflow_queue::{QueueConfig, QueueError, TopicQueue};

fn fast_config() -> QueueConfig {
    QueueConfig::default()
        .with_retry_ceiling(3)
        .with_backoff_base(Duration::from_millis(5))
        .with_backoff_cap(Duration::from_millis(20))
        .with_visibility_timeout(Duration::from_secs(5))
}

/// A consumer that always nacks sees the message `retry_ceiling + 1`
/// times in total, after which it is dead-lettered and never redelivered.
#[tokio::test]
async fn test_always_nack_dead_letters_after_ceiling() {
    let queue = TopicQueue::new("email", fast_config());
    queue.enqueue("evt_1", json!({"n": 1})).await.unwrap();

    let mut deliveries = 0;
    while let Some(message) = queue.receive(Duration::from_millis(200)).await {
        deliveries += 1;
        assert_eq!(message.attempt as usize, deliveries - 1);
        queue.nack(message.message_id, "handler failed").await;
    }

    assert_eq!(deliveries, 4, "initial attempt plus three retries");

    let dead = queue.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].message.attempt, 4);
    assert_eq!(dead[0].failure_reason, "handler failed");

    // Never again in the primary queue
    assert_eq!(queue.depth().await, 0);
    assert!(queue.receive(Duration::from_millis(50)).await.is_none());
}

/// An unacked message whose visibility timeout expires is redelivered
/// with an incremented attempt count.
#[tokio::test]
async fn test_visibility_expiry_redelivers() {
    let config = fast_config().with_visibility_timeout(Duration::from_millis(20));
    let queue = TopicQueue::new("order", config);
    queue.enqueue("evt_1", json!({})).await.unwrap();

    let first = queue.receive(Duration::from_millis(100)).await.unwrap();
    assert_eq!(first.attempt, 0);
    // No ack: let visibility lapse

    let second = queue.receive(Duration::from_millis(500)).await.unwrap();
    assert_eq!(second.message_id, first.message_id);
    assert_eq!(second.attempt, 1);
}

/// Acknowledged messages are gone for good; double-ack is a no-op.
#[tokio::test]
async fn test_acknowledge_is_idempotent() {
    let queue = TopicQueue::new("order", fast_config());
    queue.enqueue("evt_1", json!({})).await.unwrap();

    let message = queue.receive(Duration::from_millis(100)).await.unwrap();
    queue.acknowledge(message.message_id).await;
    queue.acknowledge(message.message_id).await;

    assert_eq!(queue.depth().await, 0);
    assert_eq!(queue.in_flight_count().await, 0);
    assert!(queue.receive(Duration::from_millis(50)).await.is_none());
}

/// An empty queue returns within the poll timeout instead of hanging.
#[tokio::test]
async fn test_receive_respects_poll_timeout() {
    let queue = TopicQueue::new("inventory", fast_config());

    let started = tokio::time::Instant::now();
    let result = queue.receive(Duration::from_millis(50)).await;
    assert!(result.is_none());
    assert!(started.elapsed() >= Duration::from_millis(45));
    assert!(started.elapsed() < Duration::from_secs(2));
}

/// A waiting receiver is woken by a concurrent enqueue.
#[tokio::test]
async fn test_receive_wakes_on_enqueue() {
    let queue = std::sync::Arc::new(TopicQueue::new("order", fast_config()));

    let receiver = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.receive(Duration::from_secs(5)).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    queue.enqueue("evt_1", json!({})).await.unwrap();

    let message = receiver.await.unwrap().expect("receiver should get the message");
    assert_eq!(message.event_id, "evt_1");
}

/// Competing receivers: each message is delivered to exactly one.
#[tokio::test]
async fn test_competing_receivers_split_messages() {
    let queue = std::sync::Arc::new(TopicQueue::new("order", fast_config()));
    for i in 0..20 {
        queue.enqueue(&format!("evt_{i}"), json!({"i": i})).await.unwrap();
    }

    let mut handles = Vec::new();
    for _ in 0..4 {
        let queue = queue.clone();
        handles.push(tokio::spawn(async move {
            let mut got = Vec::new();
            while let Some(message) = queue.receive(Duration::from_millis(50)).await {
                got.push(message.event_id.clone());
                queue.acknowledge(message.message_id).await;
            }
            got
        }));
    }

    let mut all: Vec<String> = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }

    all.sort();
    all.dedup();
    assert_eq!(all.len(), 20, "each message delivered exactly once");
}

/// Redriving a dead letter returns it to the primary queue with its
/// attempt count reset.
#[tokio::test]
async fn test_redrive_resets_attempts() {
    let queue = TopicQueue::new("email", fast_config().with_retry_ceiling(0));
    queue.enqueue("evt_1", json!({})).await.unwrap();

    let message = queue.receive(Duration::from_millis(100)).await.unwrap();
    queue.nack(message.message_id, "boom").await;

    let dead = queue.dead_letters().await;
    assert_eq!(dead.len(), 1);

    queue.redrive(dead[0].message.message_id).await.unwrap();
    assert!(queue.dead_letters().await.is_empty());

    let redelivered = queue.receive(Duration::from_millis(100)).await.unwrap();
    assert_eq!(redelivered.attempt, 0);
    assert_eq!(redelivered.event_id, "evt_1");
}

/// Redriving an unknown id is an error (unlike ack, which is a no-op).
#[tokio::test]
async fn test_redrive_unknown_message() {
    let queue = TopicQueue::new("email", fast_config());
    let result = queue.redrive(uuid::Uuid::new_v4()).await;
    assert!(matches!(result, Err(QueueError::UnknownMessage { .. })));
}

/// Closing a queue lets receivers drain and then return None immediately.
#[tokio::test]
async fn test_closed_queue_drains_then_returns_none() {
    let queue = TopicQueue::new("order", fast_config());
    queue.enqueue("evt_1", json!({})).await.unwrap();
    queue.close().await;

    let message = queue.receive(Duration::from_millis(100)).await.unwrap();
    queue.acknowledge(message.message_id).await;

    let started = tokio::time::Instant::now();
    assert!(queue.receive(Duration::from_secs(10)).await.is_none());
    assert!(started.elapsed() < Duration::from_secs(1), "drained close returns promptly");
}
