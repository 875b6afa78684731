//! Shared state for the ingress router.

use std::sync::Arc;
use std::time::Duration;

use orderflow_events::EventStore;
use orderflow_pipeline::FanoutBus;

use crate::signature::DEFAULT_TOLERANCE;

/// Everything the webhook handler needs, cloned per request.
#[derive(Clone)]
pub struct IngestState {
    pub signing_secret: Arc<str>,
    pub tolerance: Duration,
    pub store: Arc<dyn EventStore>,
    pub bus: Arc<FanoutBus>,
}

impl IngestState {
    pub fn new(signing_secret: &str, store: Arc<dyn EventStore>, bus: Arc<FanoutBus>) -> Self {
        Self {
            signing_secret: Arc::from(signing_secret),
            tolerance: DEFAULT_TOLERANCE,
            store,
            bus,
        }
    }

    /// Override the signature timestamp tolerance.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }
}
