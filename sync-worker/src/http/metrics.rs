//! Prometheus metrics endpoint.

use crate::queue::TaskState;
use crate::worker::Worker;
use axum::{http::header::CONTENT_TYPE, response::IntoResponse, Extension};
use casesync_types::EntityType;
use std::fmt::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Prometheus metrics handler.
///
/// Returns metrics in Prometheus text format.
/// Includes both gauges (current state) and counters (monotonic since startup).
pub async fn metrics_handler(Extension(worker): Extension<Arc<Worker>>) -> impl IntoResponse {
    let m = worker.metrics();

    // Gauges
    let online = u8::from(worker.network().is_online());
    let running = worker.scheduler().running().len();
    let tasks = worker.queue().list().await.unwrap_or_default();
    let queued = tasks.iter().filter(|t| t.state == TaskState::Queued).count();
    let failed = tasks.iter().filter(|t| t.state == TaskState::Failed).count();

    // Counters
    let succeeded = m.tasks_succeeded.load(Ordering::Relaxed);
    let retried = m.tasks_retried.load(Ordering::Relaxed);
    let failed_total = m.tasks_failed.load(Ordering::Relaxed);
    let pushed = m.records_pushed.load(Ordering::Relaxed);
    let pulled = m.records_pulled.load(Ordering::Relaxed);
    let quarantined_total = m.records_quarantined.load(Ordering::Relaxed);
    let purged = m.tombstones_purged.load(Ordering::Relaxed);

    let mut body = format!(
        r#"# HELP casesync_info Worker information
# TYPE casesync_info gauge
casesync_info{{version="{version}"}} 1

# HELP casesync_online Whether network-bound tasks may run
# TYPE casesync_online gauge
casesync_online {online}

# HELP casesync_tasks_running Tasks currently running
# TYPE casesync_tasks_running gauge
casesync_tasks_running {running}

# HELP casesync_tasks_queued Tasks waiting in the queue
# TYPE casesync_tasks_queued gauge
casesync_tasks_queued {queued}

# HELP casesync_tasks_failed Tasks parked after giving up
# TYPE casesync_tasks_failed gauge
casesync_tasks_failed {failed}

# HELP casesync_tasks_succeeded_total Task runs that succeeded
# TYPE casesync_tasks_succeeded_total counter
casesync_tasks_succeeded_total {succeeded}

# HELP casesync_tasks_retried_total Task runs scheduled for retry
# TYPE casesync_tasks_retried_total counter
casesync_tasks_retried_total {retried}

# HELP casesync_tasks_failed_total Task runs that failed
# TYPE casesync_tasks_failed_total counter
casesync_tasks_failed_total {failed_total}

# HELP casesync_records_pushed_total Records written to the remote store
# TYPE casesync_records_pushed_total counter
casesync_records_pushed_total {pushed}

# HELP casesync_records_pulled_total Records applied from the remote store
# TYPE casesync_records_pulled_total counter
casesync_records_pulled_total {pulled}

# HELP casesync_records_quarantined_total Records quarantined after repeated rejections
# TYPE casesync_records_quarantined_total counter
casesync_records_quarantined_total {quarantined_total}

# HELP casesync_tombstones_purged_total Tombstones purged from either store
# TYPE casesync_tombstones_purged_total counter
casesync_tombstones_purged_total {purged}

# HELP casesync_records_dirty Local changes waiting to be pushed
# TYPE casesync_records_dirty gauge
"#,
        version = env!("CARGO_PKG_VERSION"),
    );

    // Per-collection gauges (best effort)
    let local = worker.engine().local();
    for entity in EntityType::ALL {
        let dirty = local.count_dirty(entity).await.unwrap_or(0);
        let _ = writeln!(body, r#"casesync_records_dirty{{collection="{entity}"}} {dirty}"#);
    }
    body.push_str(
        "\n# HELP casesync_records_quarantined Records currently quarantined\n\
         # TYPE casesync_records_quarantined gauge\n",
    );
    for entity in EntityType::ALL {
        let quarantined = local.list_quarantined(entity).await.map(|q| q.len()).unwrap_or(0);
        let _ = writeln!(
            body,
            r#"casesync_records_quarantined{{collection="{entity}"}} {quarantined}"#
        );
    }

    (
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
