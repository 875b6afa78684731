//! End-to-end pipeline tests: fan-out, worker pools, retries, shutdown.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use orderflow_events::{InboundEvent, Topic};
use orderflow_pipeline::{
    CollaboratorError, EmailDispatcher, FanoutBus, HandleError, InMemoryOrderStore,
    InventoryReserver, MailSender, MessageHandler, OrderProcessor, OrderStatus, OrderStore,
    PublishOutcome, Warehouse, WorkerPool,
};
use orderflow_queue::{QueueConfig, QueueMessage, TopicQueue};

struct RecordingMailSender {
    sent: Mutex<Vec<String>>,
}

#[async_trait]
impl MailSender for RecordingMailSender {
    async fn send(
        &self,
        to: &str,
        _subject: &str,
        _text_body: &str,
        _html_body: &str,
    ) -> Result<(), CollaboratorError> {
        self.sent.lock().await.push(to.to_string());
        Ok(())
    }
}

struct RecordingWarehouse {
    reservations: Mutex<HashSet<(String, String)>>,
}

#[async_trait]
impl Warehouse for RecordingWarehouse {
    async fn reserve(
        &self,
        sku: &str,
        _quantity: u32,
        order_id: &str,
    ) -> Result<(), CollaboratorError> {
        self.reservations
            .lock()
            .await
            .insert((order_id.to_string(), sku.to_string()));
        Ok(())
    }
}

fn checkout_event(event_id: &str, session_id: &str) -> InboundEvent {
    let body = json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "created": 1_700_000_000,
        "data": {
            "object": {
                "id": session_id,
                "payment_intent": "pi_1",
                "amount_total": 2000,
                "currency": "usd",
                "customer": "cus_1",
                "customer_details": {"email": "buyer@example.com"},
                "metadata": {
                    "products": "[{\"sku\": \"SKU-1\", \"quantity\": 2, \"name\": \"Widget\"}]"
                }
            }
        }
    });
    InboundEvent::from_body(body.to_string().as_bytes(), Utc::now()).unwrap()
}

fn fast_config() -> QueueConfig {
    QueueConfig::default()
        .with_backoff_base(Duration::from_millis(5))
        .with_backoff_cap(Duration::from_millis(20))
        .with_visibility_timeout(Duration::from_secs(5))
}

async fn wait_until_drained(queues: &[Arc<TopicQueue>]) {
    for _ in 0..200 {
        let mut busy = false;
        for queue in queues {
            if queue.depth().await > 0 || queue.in_flight_count().await > 0 {
                busy = true;
            }
        }
        if !busy {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("queues did not drain in time");
}

#[tokio::test]
async fn test_checkout_event_flows_to_all_consumers() {
    let order_queue = Arc::new(TopicQueue::new(Topic::Order.as_str(), fast_config()));
    let email_queue = Arc::new(TopicQueue::new(Topic::Email.as_str(), fast_config()));
    let inventory_queue = Arc::new(TopicQueue::new(Topic::Inventory.as_str(), fast_config()));

    let bus = FanoutBus::new([
        (Topic::Order, order_queue.clone()),
        (Topic::Email, email_queue.clone()),
        (Topic::Inventory, inventory_queue.clone()),
    ]);

    let store = Arc::new(InMemoryOrderStore::new());
    let mail = Arc::new(RecordingMailSender {
        sent: Mutex::new(Vec::new()),
    });
    let warehouse = Arc::new(RecordingWarehouse {
        reservations: Mutex::new(HashSet::new()),
    });

    let cancel = CancellationToken::new();
    let poll = Duration::from_millis(50);
    let pools = vec![
        WorkerPool::spawn(
            order_queue.clone(),
            Arc::new(OrderProcessor::new(store.clone())),
            2,
            cancel.clone(),
            poll,
        ),
        WorkerPool::spawn(
            email_queue.clone(),
            Arc::new(EmailDispatcher::new(mail.clone())),
            2,
            cancel.clone(),
            poll,
        ),
        WorkerPool::spawn(
            inventory_queue.clone(),
            Arc::new(InventoryReserver::new(warehouse.clone())),
            2,
            cancel.clone(),
            poll,
        ),
    ];

    let outcome = bus.publish(&checkout_event("evt_1", "cs_1")).await.unwrap();
    assert!(matches!(outcome, PublishOutcome::Published { .. }));

    wait_until_drained(&[order_queue.clone(), email_queue.clone(), inventory_queue.clone()]).await;

    cancel.cancel();
    for pool in pools {
        pool.join().await;
    }

    let order = store.get("cs_1").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Fulfilled);
    assert_eq!(order.customer_email.as_deref(), Some("buyer@example.com"));

    assert_eq!(mail.sent.lock().await.as_slice(), ["buyer@example.com"]);

    let reservations = warehouse.reservations.lock().await;
    assert!(reservations.contains(&("cs_1".to_string(), "SKU-1".to_string())));

    assert!(order_queue.dead_letters().await.is_empty());
}

#[tokio::test]
async fn test_duplicate_publish_processes_once() {
    let order_queue = Arc::new(TopicQueue::new(Topic::Order.as_str(), fast_config()));
    let bus = FanoutBus::new([(Topic::Order, order_queue.clone())]);

    let event = checkout_event("evt_dup", "cs_dup");
    // Only the order topic is registered here; the other projections
    // report as failed, which is fine for this test.
    bus.publish(&event).await.unwrap();
    bus.publish(&event).await.unwrap();

    assert_eq!(order_queue.depth().await, 1);
}

#[tokio::test]
async fn test_persistent_failure_dead_letters_after_ceiling() {
    struct AlwaysRetryable;

    #[async_trait]
    impl MessageHandler for AlwaysRetryable {
        fn name(&self) -> &'static str {
            "always_retryable"
        }

        async fn handle(&self, _message: &QueueMessage) -> Result<(), HandleError> {
            Err(HandleError::Retryable("collaborator down".to_string()))
        }
    }

    let queue = Arc::new(TopicQueue::new(
        "order",
        fast_config().with_retry_ceiling(3),
    ));
    queue.enqueue("evt_poison", json!({"k": "v"})).await.unwrap();

    let cancel = CancellationToken::new();
    let pool = WorkerPool::spawn(
        queue.clone(),
        Arc::new(AlwaysRetryable),
        1,
        cancel.clone(),
        Duration::from_millis(20),
    );

    // Initial delivery plus three retries, then the dead letter store.
    for _ in 0..200 {
        if !queue.dead_letters().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    cancel.cancel();
    pool.join().await;

    let dead = queue.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].message.attempt, 4);
    assert_eq!(dead[0].failure_reason, "collaborator down");
    assert_eq!(queue.depth().await, 0);
}

#[tokio::test]
async fn test_mail_outage_dead_letters_email_without_touching_orders() {
    struct DownMailSender;

    #[async_trait]
    impl MailSender for DownMailSender {
        async fn send(
            &self,
            _to: &str,
            _subject: &str,
            _text_body: &str,
            _html_body: &str,
        ) -> Result<(), CollaboratorError> {
            Err(CollaboratorError::Transient("mail relay down".to_string()))
        }
    }

    let order_queue = Arc::new(TopicQueue::new(Topic::Order.as_str(), fast_config()));
    let email_queue = Arc::new(TopicQueue::new(Topic::Email.as_str(), fast_config()));
    let bus = FanoutBus::new([
        (Topic::Order, order_queue.clone()),
        (Topic::Email, email_queue.clone()),
        (Topic::Inventory, Arc::new(TopicQueue::new(Topic::Inventory.as_str(), fast_config()))),
    ]);

    let store = Arc::new(InMemoryOrderStore::new());
    let cancel = CancellationToken::new();
    let poll = Duration::from_millis(20);
    let pools = vec![
        WorkerPool::spawn(
            order_queue.clone(),
            Arc::new(OrderProcessor::new(store.clone())),
            1,
            cancel.clone(),
            poll,
        ),
        WorkerPool::spawn(
            email_queue.clone(),
            Arc::new(EmailDispatcher::new(Arc::new(DownMailSender))),
            1,
            cancel.clone(),
            poll,
        ),
    ];

    bus.publish(&checkout_event("evt_mail", "cs_mail")).await.unwrap();

    for _ in 0..200 {
        if !email_queue.dead_letters().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    cancel.cancel();
    for pool in pools {
        pool.join().await;
    }

    // The email message exhausted its retries.
    let dead = email_queue.dead_letters().await;
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].message.attempt, 4);

    // The order topic was unaffected by the mail outage.
    let order = store.get("cs_mail").await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Fulfilled);
    assert!(order_queue.dead_letters().await.is_empty());
}

#[tokio::test]
async fn test_cancellation_stops_idle_workers() {
    struct NoopHandler;

    #[async_trait]
    impl MessageHandler for NoopHandler {
        fn name(&self) -> &'static str {
            "noop"
        }

        async fn handle(&self, _message: &QueueMessage) -> Result<(), HandleError> {
            Ok(())
        }
    }

    let queue = Arc::new(TopicQueue::new("order", fast_config()));
    let cancel = CancellationToken::new();
    let pool = WorkerPool::spawn(
        queue,
        Arc::new(NoopHandler),
        4,
        cancel.clone(),
        Duration::from_secs(30),
    );

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), pool.join())
        .await
        .expect("workers should stop promptly after cancellation");
}
