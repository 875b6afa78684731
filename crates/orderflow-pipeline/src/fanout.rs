//! Fan-out from recorded events to the per-topic queues.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use orderflow_events::{project, EventError, InboundEvent, Topic};
use orderflow_queue::TopicQueue;

/// Result of publishing one event's projections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Every projected message was enqueued.
    Published { topics: Vec<Topic> },
    /// At least one queue rejected its message. The event is already
    /// recorded, so the caller still acknowledges the source; the failed
    /// topics are reported for the operator to see.
    PartialFailure { failed: Vec<Topic> },
}

/// Routes projected messages to the topic queues.
///
/// Projection failures surface as errors before anything is enqueued;
/// per-queue failures after projection degrade to a partial outcome so
/// one saturated topic cannot block the others.
pub struct FanoutBus {
    queues: HashMap<Topic, Arc<TopicQueue>>,
}

impl FanoutBus {
    /// Build a bus over the given queues. Every topic a projection can
    /// target must be registered.
    #[must_use]
    pub fn new(queues: impl IntoIterator<Item = (Topic, Arc<TopicQueue>)>) -> Self {
        Self {
            queues: queues.into_iter().collect(),
        }
    }

    /// Queue handle for one topic, if registered.
    #[must_use]
    pub fn queue(&self, topic: Topic) -> Option<Arc<TopicQueue>> {
        self.queues.get(&topic).cloned()
    }

    /// Project an event and enqueue one message per target topic.
    ///
    /// Unroutable events (unknown type, or no order id) project to an
    /// empty set and publish trivially with zero topics.
    pub async fn publish(&self, event: &InboundEvent) -> Result<PublishOutcome, EventError> {
        let projections = project(event)?;

        let mut published = Vec::with_capacity(projections.len());
        let mut failed = Vec::new();

        for (topic, body) in projections {
            let Some(queue) = self.queues.get(&topic) else {
                warn!(
                    target: "fanout",
                    event_id = %event.event_id,
                    topic = topic.as_str(),
                    "No queue registered for topic"
                );
                failed.push(topic);
                continue;
            };

            match queue.enqueue(&event.event_id, body).await {
                Ok(_) => published.push(topic),
                Err(err) => {
                    warn!(
                        target: "fanout",
                        event_id = %event.event_id,
                        topic = topic.as_str(),
                        error = %err,
                        "Failed to enqueue projected message"
                    );
                    failed.push(topic);
                }
            }
        }

        if failed.is_empty() {
            info!(
                target: "fanout",
                event_id = %event.event_id,
                event_type = event.event_type.as_str(),
                topics = published.len(),
                "Event fanned out"
            );
            Ok(PublishOutcome::Published { topics: published })
        } else {
            Ok(PublishOutcome::PartialFailure { failed })
        }
    }
}
