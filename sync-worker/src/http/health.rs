//! Health check endpoint.

use crate::queue::TaskState;
use crate::worker::Worker;
use axum::{Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Global start time for uptime calculation.
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the start time (call once at startup).
pub fn init_start_time() {
    START_TIME.get_or_init(Instant::now);
}

/// Health status response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Overall status.
    pub status: String,
    /// Worker version.
    pub version: String,
    /// Whether network-bound tasks may run.
    pub online: bool,
    /// Tasks currently running.
    pub running: Vec<String>,
    /// Tasks waiting in the queue.
    pub queued: usize,
    /// Tasks parked after giving up.
    pub failed: usize,
    /// Uptime in seconds.
    pub uptime_seconds: u64,
}

/// Health check handler.
///
/// Reports `degraded` when the queue cannot be read.
pub async fn health_handler(Extension(worker): Extension<Arc<Worker>>) -> Json<HealthStatus> {
    let uptime = START_TIME
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0);

    let (status, queued, failed) = match worker.queue().list().await {
        Ok(tasks) => (
            "ok",
            tasks.iter().filter(|t| t.state == TaskState::Queued).count(),
            tasks.iter().filter(|t| t.state == TaskState::Failed).count(),
        ),
        Err(e) => {
            tracing::warn!("health check could not read the queue: {}", e);
            ("degraded", 0, 0)
        }
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        online: worker.network().is_online(),
        running: worker.scheduler().running(),
        queued,
        failed,
        uptime_seconds: uptime,
    })
}
