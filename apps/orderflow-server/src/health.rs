//! Health check endpoint with queue occupancy.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use orderflow_queue::{QueueStats, TopicQueue};

/// Application state for health checks.
#[derive(Clone)]
pub struct HealthState {
    pub start_time: Instant,
    pub version: String,
    pub queues: Vec<Arc<TopicQueue>>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_secs: u64,
    pub queues: Vec<QueueStats>,
}

/// Overall health status.
#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Create health check routes.
pub fn health_routes(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let uptime = state.start_time.elapsed().as_secs();

    let mut stats = Vec::with_capacity(state.queues.len());
    for queue in &state.queues {
        stats.push(queue.stats().await);
    }

    // Degraded when any topic has accumulated dead letters; an operator
    // needs to look at the DLQ.
    let status = if stats.iter().any(|s| s.dead_lettered > 0) {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    Json(HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: uptime,
        queues: stats,
    })
}
