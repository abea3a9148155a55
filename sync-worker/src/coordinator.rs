//! Enqueue API.
//!
//! Fire-and-forget entry points for the application, the HTTP surface and
//! the CLI. Every call is idempotent by unique task name: requesting the
//! same sync twice leaves one queued instance.

use std::sync::Arc;
use std::time::Duration;

use casesync_client::Clock;
use casesync_types::EntityType;
use tokio::sync::Notify;
use tracing::debug;

use crate::error::QueueError;
use crate::queue::{NewTask, TaskQueue, TaskRecord};
use crate::task::TaskKind;

/// Default interval of the periodic cleanup task.
pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Puts sync work on the durable queue.
#[derive(Clone)]
pub struct Coordinator {
    queue: Arc<dyn TaskQueue>,
    clock: Arc<dyn Clock>,
    notify: Option<Arc<Notify>>,
    cleanup_interval: Duration,
}

impl Coordinator {
    /// Create a coordinator writing to `queue`.
    ///
    /// Without a notifier, a running scheduler picks new work up on its
    /// next poll.
    pub fn new(queue: Arc<dyn TaskQueue>, clock: Arc<dyn Clock>) -> Self {
        Self {
            queue,
            clock,
            notify: None,
            cleanup_interval: DEFAULT_CLEANUP_INTERVAL,
        }
    }

    /// Wake the scheduler after every enqueue.
    pub fn with_notify(mut self, notify: Arc<Notify>) -> Self {
        self.notify = Some(notify);
        self
    }

    /// Set the interval used by [`Coordinator::enqueue_cleaner_periodic`].
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Push one entity type as soon as connectivity allows.
    pub async fn enqueue_push_now(&self, entity: EntityType) -> Result<TaskRecord, QueueError> {
        self.once(TaskKind::Push(entity)).await
    }

    /// Pull one entity type as soon as connectivity allows.
    pub async fn enqueue_pull_now(&self, entity: EntityType) -> Result<TaskRecord, QueueError> {
        self.once(TaskKind::Pull(entity)).await
    }

    /// Push every entity type.
    pub async fn enqueue_push_all_now(&self) -> Result<TaskRecord, QueueError> {
        self.once(TaskKind::PushAll).await
    }

    /// Pull every entity type.
    pub async fn enqueue_pull_all_now(&self) -> Result<TaskRecord, QueueError> {
        self.once(TaskKind::PullAll).await
    }

    /// Push every entity type, then pull every entity type, as one task.
    pub async fn enqueue_sync_all_now(&self) -> Result<TaskRecord, QueueError> {
        self.once(TaskKind::SyncAll).await
    }

    /// Push then pull one entity type every `interval`.
    ///
    /// Registering again updates the interval without moving the next run.
    pub async fn enqueue_periodic(
        &self,
        entity: EntityType,
        interval: Duration,
    ) -> Result<TaskRecord, QueueError> {
        self.periodic(TaskKind::Periodic(entity), interval).await
    }

    /// Purge tombstones older than `retention_days` on the cleanup interval.
    pub async fn enqueue_cleaner_periodic(&self, retention_days: u32) -> Result<TaskRecord, QueueError> {
        self.periodic(TaskKind::Cleanup { retention_days }, self.cleanup_interval)
            .await
    }

    async fn once(&self, kind: TaskKind) -> Result<TaskRecord, QueueError> {
        let task = self.queue.upsert(NewTask::once(kind, self.clock.now())).await?;
        debug!(task = %task.name, generation = task.generation, "enqueued");
        self.wake();
        Ok(task)
    }

    async fn periodic(&self, kind: TaskKind, interval: Duration) -> Result<TaskRecord, QueueError> {
        let task = self
            .queue
            .upsert(NewTask::periodic(kind, interval, self.clock.now()))
            .await?;
        debug!(task = %task.name, interval_secs = interval.as_secs(), "periodic task registered");
        self.wake();
        Ok(task)
    }

    fn wake(&self) {
        if let Some(notify) = &self.notify {
            notify.notify_one();
        }
    }
}
