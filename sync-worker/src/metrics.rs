//! Operational counters for the worker.

use std::sync::atomic::AtomicU64;

/// Operational metrics for monitoring sync activity.
///
/// All counters are monotonically increasing (reset only on restart).
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    /// Task runs that succeeded.
    pub tasks_succeeded: AtomicU64,
    /// Task runs that asked to be retried.
    pub tasks_retried: AtomicU64,
    /// Task runs that failed, retries exhausted included.
    pub tasks_failed: AtomicU64,
    /// Records written to the remote store.
    pub records_pushed: AtomicU64,
    /// Records applied from the remote store.
    pub records_pulled: AtomicU64,
    /// Records quarantined after repeated rejections.
    pub records_quarantined: AtomicU64,
    /// Tombstones purged from either store.
    pub tombstones_purged: AtomicU64,
}
