//! Durable task queue.
//!
//! One row per unique task name. Rows survive restarts, so a sync
//! requested while offline runs once connectivity returns even if the
//! process was restarted in between.

mod sqlite;

pub use sqlite::SqliteTaskQueue;

use std::time::Duration;

use async_trait::async_trait;
use casesync_types::Timestamp;
use serde::Serialize;

use crate::error::QueueError;
use crate::task::TaskKind;

/// When a task runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Schedule {
    /// Run once, then remove.
    Once,
    /// Run every `interval`.
    Periodic {
        /// Time between successful runs.
        #[serde(with = "millis")]
        interval: Duration,
    },
}

impl Schedule {
    /// Whether the task repeats.
    pub fn is_periodic(&self) -> bool {
        matches!(self, Schedule::Periodic { .. })
    }
}

/// Lifecycle state of a queued task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for `next_run_at`.
    Queued,
    /// Dispatched and running.
    Running,
    /// Gave up; kept for inspection until re-enqueued.
    Failed,
}

impl TaskState {
    fn as_str(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Running => "running",
            TaskState::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(TaskState::Queued),
            "running" => Some(TaskState::Running),
            "failed" => Some(TaskState::Failed),
            _ => None,
        }
    }
}

/// A task as stored in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskRecord {
    /// Unique name.
    pub name: String,
    /// What to run.
    pub kind: TaskKind,
    /// One-shot or periodic.
    pub schedule: Schedule,
    /// Only dispatch with connectivity.
    pub requires_network: bool,
    /// Earliest dispatch time.
    pub next_run_at: Timestamp,
    /// Consecutive retries of the current instance.
    pub attempt: u32,
    /// Lifecycle state.
    pub state: TaskState,
    /// Bumped whenever a one-shot request replaces the previous one.
    pub generation: u64,
    /// Error of the last unsuccessful run.
    pub last_error: Option<String>,
}

/// Request to enqueue a task.
#[derive(Debug, Clone)]
pub struct NewTask {
    /// What to run; also determines the unique name.
    pub kind: TaskKind,
    /// One-shot or periodic.
    pub schedule: Schedule,
    /// Earliest dispatch time of a new row.
    pub run_at: Timestamp,
}

impl NewTask {
    /// Run once, as soon as possible.
    pub fn once(kind: TaskKind, now: Timestamp) -> Self {
        Self {
            kind,
            schedule: Schedule::Once,
            run_at: now,
        }
    }

    /// Run every `interval`, first as soon as possible.
    pub fn periodic(kind: TaskKind, interval: Duration, now: Timestamp) -> Self {
        Self {
            kind,
            schedule: Schedule::Periodic { interval },
            run_at: now,
        }
    }
}

/// Trait for task queue backends.
///
/// Completion calls carry the generation the caller dispatched; they do
/// nothing when the row has since been replaced by a newer request.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Insert or replace a task under its unique name.
    ///
    /// A one-shot replaces any pending or failed instance and bumps the
    /// generation. A periodic keeps its `next_run_at` and updates its
    /// interval and constraints in place.
    async fn upsert(&self, task: NewTask) -> Result<TaskRecord, QueueError>;

    /// Queued tasks with `next_run_at <= now`, oldest first.
    async fn due(&self, now: Timestamp, limit: usize) -> Result<Vec<TaskRecord>, QueueError>;

    /// Earliest `next_run_at` of any queued task.
    async fn next_due_at(&self) -> Result<Option<Timestamp>, QueueError>;

    /// Claim a queued task for running.
    ///
    /// Returns false if it is no longer queued under that generation.
    async fn mark_running(&self, name: &str, generation: u64) -> Result<bool, QueueError>;

    /// Remove a finished one-shot.
    async fn complete(&self, name: &str, generation: u64) -> Result<(), QueueError>;

    /// Queue the task again at `next_run_at` with a fresh attempt count.
    async fn reschedule(
        &self,
        name: &str,
        generation: u64,
        next_run_at: Timestamp,
        last_error: Option<&str>,
    ) -> Result<(), QueueError>;

    /// Queue the task again at `next_run_at` with `attempt + 1`.
    async fn retry(
        &self,
        name: &str,
        generation: u64,
        next_run_at: Timestamp,
        error: &str,
    ) -> Result<(), QueueError>;

    /// Park a one-shot as failed.
    async fn fail(&self, name: &str, generation: u64, error: &str) -> Result<(), QueueError>;

    /// Remove a task regardless of state. Returns whether it existed.
    async fn remove(&self, name: &str) -> Result<bool, QueueError>;

    /// Look up one task.
    async fn get(&self, name: &str) -> Result<Option<TaskRecord>, QueueError>;

    /// Every task, by name.
    async fn list(&self) -> Result<Vec<TaskRecord>, QueueError>;

    /// Return rows left `running` by a crash to the queue.
    async fn requeue_running(&self) -> Result<u64, QueueError>;
}

mod millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}
