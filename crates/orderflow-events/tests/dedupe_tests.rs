//! Concurrency tests for the idempotent event store.
//!
//! The dedupe guarantee is the foundation of the whole pipeline: under
//! parallel submission of the same event id, exactly one caller may win.

use std::sync::Arc;

use chrono::Utc;
use orderflow_events::{EventStore, InMemoryEventStore, RecordOutcome};

/// N parallel callers with the same id: exactly one Accepted.
#[tokio::test]
async fn test_concurrent_same_id_yields_single_accept() {
    let store = Arc::new(InMemoryEventStore::new());
    let callers = 32;

    let mut handles = Vec::with_capacity(callers);
    for _ in 0..callers {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store.record_if_new("evt_contended", Utc::now()).await
        }));
    }

    let mut accepted = 0;
    let mut duplicate = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            RecordOutcome::Accepted => accepted += 1,
            RecordOutcome::Duplicate => duplicate += 1,
        }
    }

    assert_eq!(accepted, 1, "exactly one caller may observe Accepted");
    assert_eq!(duplicate, callers - 1);
    assert_eq!(store.len().await, 1);
}

/// Parallel callers with distinct ids never interfere.
#[tokio::test]
async fn test_concurrent_distinct_ids_all_accepted() {
    let store = Arc::new(InMemoryEventStore::new());
    let callers = 16;

    let mut handles = Vec::with_capacity(callers);
    for i in 0..callers {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            store
                .record_if_new(&format!("evt_{i}"), Utc::now())
                .await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), RecordOutcome::Accepted);
    }
    assert_eq!(store.len().await, callers);
}

/// Eviction running concurrently with inserts never corrupts the store:
/// every id recorded after the cutoff survives.
#[tokio::test]
async fn test_eviction_does_not_drop_fresh_entries() {
    let store = Arc::new(InMemoryEventStore::new());

    let writer = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            for i in 0..100 {
                store
                    .record_if_new(&format!("evt_fresh_{i}"), Utc::now())
                    .await
                    .unwrap();
            }
        })
    };

    let sweeper = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            for _ in 0..10 {
                let cutoff = Utc::now() - chrono::Duration::hours(24);
                store.evict_older_than(cutoff).await.unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    writer.await.unwrap();
    sweeper.await.unwrap();

    assert_eq!(store.len().await, 100);
}
