//! Task kinds and how they run.
//!
//! A task is identified by a stable unique name derived from its kind, so
//! enqueuing the same kind twice addresses the same queue row.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use casesync_client::{PipelineError, StopSignal, SyncEngine};
use casesync_types::EntityType;
use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::metrics::WorkerMetrics;

/// Name of the retention cleanup task.
pub const CLEANUP_TASK: &str = "cleanup";

/// What a task does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum TaskKind {
    /// Push one entity type.
    Push(EntityType),
    /// Pull one entity type.
    Pull(EntityType),
    /// Push every entity type.
    PushAll,
    /// Pull every entity type.
    PullAll,
    /// Push every entity type, then pull every entity type.
    SyncAll,
    /// Periodic push then pull of one entity type.
    Periodic(EntityType),
    /// Purge tombstones older than `retention_days` from every entity type.
    Cleanup {
        /// Retention window in days.
        retention_days: u32,
    },
}

impl TaskKind {
    /// The unique queue name of this kind.
    pub fn name(&self) -> String {
        match self {
            TaskKind::Push(entity) => format!("push:{entity}"),
            TaskKind::Pull(entity) => format!("pull:{entity}"),
            TaskKind::PushAll => "push:all".to_string(),
            TaskKind::PullAll => "pull:all".to_string(),
            TaskKind::SyncAll => "sync:all".to_string(),
            TaskKind::Periodic(entity) => format!("periodic:{entity}"),
            TaskKind::Cleanup { .. } => CLEANUP_TASK.to_string(),
        }
    }

    /// Whether the task may only run with connectivity.
    ///
    /// Every kind talks to the remote store.
    pub fn requires_network(&self) -> bool {
        true
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Result of one task run, as seen by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Done; one-shots are removed, periodics rescheduled.
    Success,
    /// Try again after backoff.
    Retry(String),
    /// Give up on this instance.
    Failure(String),
}

impl From<Result<(), PipelineError>> for TaskOutcome {
    fn from(result: Result<(), PipelineError>) -> Self {
        match result {
            Ok(()) => TaskOutcome::Success,
            Err(e) if e.is_retryable() => TaskOutcome::Retry(e.to_string()),
            Err(e) => TaskOutcome::Failure(e.to_string()),
        }
    }
}

/// Executes tasks for the scheduler.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    /// Run one task to completion or until `stop` fires.
    async fn run(&self, kind: TaskKind, stop: &StopSignal) -> TaskOutcome;
}

/// Runs tasks against a [`SyncEngine`].
pub struct EngineRunner {
    engine: SyncEngine,
    metrics: Arc<WorkerMetrics>,
}

impl EngineRunner {
    /// Create a runner.
    pub fn new(engine: SyncEngine, metrics: Arc<WorkerMetrics>) -> Self {
        Self { engine, metrics }
    }

    async fn execute(&self, kind: TaskKind, stop: &StopSignal) -> Result<(), PipelineError> {
        let m = &self.metrics;
        let mut pushed = Vec::new();
        let mut pulled = Vec::new();

        let result = match kind {
            TaskKind::Push(entity) => self.engine.push(entity, stop).await.map(|r| pushed.push(r)),
            TaskKind::Pull(entity) => self.engine.pull(entity, stop).await.map(|r| pulled.push(r)),
            TaskKind::PushAll => self
                .engine
                .push_all(stop)
                .await
                .map(|rs| pushed.extend(rs.into_iter().map(|(_, r)| r))),
            TaskKind::PullAll => self
                .engine
                .pull_all(stop)
                .await
                .map(|rs| pulled.extend(rs.into_iter().map(|(_, r)| r))),
            TaskKind::SyncAll => self.engine.sync_all(stop).await.map(|report| {
                pushed.extend(report.pushed.into_iter().map(|(_, r)| r));
                pulled.extend(report.pulled.into_iter().map(|(_, r)| r));
            }),
            TaskKind::Periodic(entity) => self.engine.sync(entity, stop).await.map(|report| {
                pushed.extend(report.pushed.into_iter().map(|(_, r)| r));
                pulled.extend(report.pulled.into_iter().map(|(_, r)| r));
            }),
            TaskKind::Cleanup { retention_days } => self.engine.cleanup(retention_days, stop).await.map(|reports| {
                for (_, report) in reports {
                    m.tombstones_purged
                        .fetch_add(report.remote_purged + report.local_purged, Ordering::Relaxed);
                }
            }),
        };

        for report in &pushed {
            m.records_pushed.fetch_add(report.written as u64, Ordering::Relaxed);
            m.records_quarantined
                .fetch_add(report.quarantined as u64, Ordering::Relaxed);
        }
        for report in &pulled {
            m.records_pulled.fetch_add(report.applied as u64, Ordering::Relaxed);
        }
        result
    }
}

#[async_trait]
impl TaskRunner for EngineRunner {
    async fn run(&self, kind: TaskKind, stop: &StopSignal) -> TaskOutcome {
        let result = self.execute(kind, stop).await;
        match &result {
            Err(e) if e.is_retryable() => warn!(task = %kind, error = %e, "task will retry"),
            Err(e) => error!(task = %kind, error = %e, "task failed"),
            Ok(()) => {}
        }
        result.into()
    }
}
