//! HTTP endpoints for casesync-worker.
//!
//! Health and Prometheus metrics for monitoring, plus a small control API
//! to request syncs, inspect the queue and manage quarantined records.

pub mod api;
pub mod health;
mod metrics;

use crate::worker::Worker;
use axum::{
    routing::{delete, get, post},
    Extension, Router,
};
use std::sync::Arc;

pub use health::{init_start_time, HealthStatus};

/// Build the HTTP router with all endpoints.
pub fn build_router(worker: Arc<Worker>) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/tasks", get(api::list_tasks))
        .route("/tasks/:name", delete(api::cancel_task))
        .route("/sync", post(api::sync_all))
        .route("/sync/push", post(api::push_all))
        .route("/sync/pull", post(api::pull_all))
        .route("/sync/push/:collection", post(api::push_one))
        .route("/sync/pull/:collection", post(api::pull_one))
        .route("/network/:state", post(api::set_network))
        .route("/quarantine/:collection", get(api::list_quarantine))
        .route(
            "/quarantine/:collection/:id/release",
            post(api::release_quarantine),
        )
        .layer(Extension(worker))
}
