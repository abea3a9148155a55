//! Task dispatch loop.
//!
//! The scheduler pulls due tasks from the durable queue, runs each on its
//! own tokio task and settles the outcome back into the queue:
//!
//! | Outcome | One-shot | Periodic |
//! |---|---|---|
//! | Success | removed | next run at now + interval |
//! | Retry | attempt + 1, next run after backoff | same |
//! | Failure | parked as `failed` | next run at now + interval, error kept |
//!
//! A retry past `max_attempts` settles as a failure. A run that was
//! stopped (cancel or shutdown) is not settled: a cancelled row is already
//! gone, and a row left `running` by shutdown is requeued on next start.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use casesync_client::{Clock, StopSignal};
use casesync_core::Backoff;
use casesync_types::Timestamp;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::QueueError;
use crate::metrics::WorkerMetrics;
use crate::network::NetworkMonitor;
use crate::queue::{Schedule, TaskQueue, TaskRecord};
use crate::task::{TaskOutcome, TaskRunner};

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the queue is polled without any wake-up.
    pub poll_interval: Duration,
    /// Retry delays.
    pub backoff: Backoff,
    /// Attempts before a retrying instance counts as failed.
    pub max_attempts: u32,
    /// Tasks fetched per dispatch pass.
    pub dispatch_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            backoff: Backoff::default(),
            max_attempts: 10,
            dispatch_limit: 32,
        }
    }
}

struct SchedulerInner {
    queue: Arc<dyn TaskQueue>,
    runner: Arc<dyn TaskRunner>,
    network: NetworkMonitor,
    clock: Arc<dyn Clock>,
    metrics: Arc<WorkerMetrics>,
    config: SchedulerConfig,
    notify: Arc<Notify>,
    running: Mutex<HashMap<String, StopSignal>>,
}

/// Durable task scheduler.
///
/// Cheap to clone; clones share the running set.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    /// Create a scheduler.
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        runner: Arc<dyn TaskRunner>,
        network: NetworkMonitor,
        clock: Arc<dyn Clock>,
        metrics: Arc<WorkerMetrics>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                queue,
                runner,
                network,
                clock,
                metrics,
                config,
                notify: Arc::new(Notify::new()),
                running: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Wake-up handle; enqueuers notify it so due work starts immediately.
    pub fn notifier(&self) -> Arc<Notify> {
        self.inner.notify.clone()
    }

    /// Requeue tasks a previous process left running.
    pub async fn recover(&self) -> Result<u64, QueueError> {
        let requeued = self.inner.queue.requeue_running().await?;
        if requeued > 0 {
            info!(requeued, "requeued tasks interrupted by a restart");
        }
        Ok(requeued)
    }

    /// Names of tasks currently running.
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock_running().keys().cloned().collect();
        names.sort();
        names
    }

    /// Cancel a task: remove it from the queue and stop a running instance
    /// at its next batch or page boundary.
    ///
    /// Returns whether anything was cancelled.
    pub async fn cancel(&self, name: &str) -> Result<bool, QueueError> {
        let removed = self.inner.queue.remove(name).await?;
        let stopped = match self.lock_running().get(name) {
            Some(stop) => {
                stop.stop();
                true
            }
            None => false,
        };
        if removed || stopped {
            info!(task = name, "task cancelled");
        }
        Ok(removed || stopped)
    }

    /// Dispatch every due task that may run now.
    ///
    /// Returns handles of the spawned runs.
    pub async fn dispatch_due(&self) -> Result<Vec<JoinHandle<()>>, QueueError> {
        let inner = &self.inner;
        let now = inner.clock.now();
        let due = inner.queue.due(now, inner.config.dispatch_limit).await?;
        let online = inner.network.is_online();
        let mut handles = Vec::new();

        for task in due {
            if task.requires_network && !online {
                debug!(task = %task.name, "waiting for connectivity");
                continue;
            }
            if self.lock_running().contains_key(&task.name) {
                continue;
            }
            if !inner.queue.mark_running(&task.name, task.generation).await? {
                continue;
            }

            let stop = StopSignal::new();
            self.lock_running().insert(task.name.clone(), stop.clone());
            debug!(task = %task.name, attempt = task.attempt, "dispatching");

            let scheduler = self.clone();
            handles.push(tokio::spawn(async move {
                scheduler.execute(task, stop).await;
            }));
        }
        Ok(handles)
    }

    /// Run the dispatch loop until `shutdown` turns true.
    ///
    /// Wakes on enqueue, on the poll tick, on connectivity changes and on
    /// shutdown. Running tasks are stopped and awaited before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut network = self.inner.network.subscribe();
        let mut handles: Vec<JoinHandle<()>> = Vec::new();
        info!(
            poll_ms = self.inner.config.poll_interval.as_millis() as u64,
            "scheduler started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.dispatch_due().await {
                Ok(spawned) => handles.extend(spawned),
                Err(e) => error!("dispatch failed: {}", e),
            }
            handles.retain(|handle| !handle.is_finished());

            tokio::select! {
                _ = self.inner.notify.notified() => {}
                _ = tokio::time::sleep(self.idle_for().await) => {}
                changed = network.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = shutdown.changed() => {}
            }
        }

        for stop in self.lock_running().values() {
            stop.stop();
        }
        for handle in handles {
            let _ = handle.await;
        }
        info!("scheduler stopped");
    }

    /// How long to sleep without a wake-up: until the earliest queued task
    /// falls due, capped at the poll interval. Work that is due now but
    /// waiting (offline, already running) is rechecked on the poll tick.
    async fn idle_for(&self) -> Duration {
        let poll = self.inner.config.poll_interval;
        match self.inner.queue.next_due_at().await {
            Ok(Some(next)) => {
                let wait = next.as_millis() - self.inner.clock.now().as_millis();
                match u64::try_from(wait) {
                    Ok(ms) if ms > 0 => poll.min(Duration::from_millis(ms)),
                    _ => poll,
                }
            }
            Ok(None) => poll,
            Err(e) => {
                warn!("could not read next due time: {}", e);
                poll
            }
        }
    }

    async fn execute(&self, task: TaskRecord, stop: StopSignal) {
        let outcome = self.inner.runner.run(task.kind, &stop).await;

        if stop.is_stopped() {
            debug!(task = %task.name, "stopped run left unsettled");
        } else if let Err(e) = self.settle(&task, outcome).await {
            error!(task = %task.name, "failed to record task outcome: {}", e);
        }

        self.lock_running().remove(&task.name);
        self.inner.notify.notify_one();
    }

    async fn settle(&self, task: &TaskRecord, outcome: TaskOutcome) -> Result<(), QueueError> {
        let inner = &self.inner;
        let now = inner.clock.now();
        let m = &inner.metrics;

        let outcome = match outcome {
            TaskOutcome::Retry(reason) if task.attempt + 1 >= inner.config.max_attempts => {
                TaskOutcome::Failure(format!(
                    "{reason} (gave up after {} attempts)",
                    task.attempt + 1
                ))
            }
            other => other,
        };

        match (outcome, task.schedule) {
            (TaskOutcome::Success, Schedule::Once) => {
                m.tasks_succeeded.fetch_add(1, Ordering::Relaxed);
                info!(task = %task.name, "task finished");
                inner.queue.complete(&task.name, task.generation).await
            }
            (TaskOutcome::Success, Schedule::Periodic { interval }) => {
                m.tasks_succeeded.fetch_add(1, Ordering::Relaxed);
                let next = after(now, interval);
                debug!(task = %task.name, next_run_at = %next, "periodic task rescheduled");
                inner.queue.reschedule(&task.name, task.generation, next, None).await
            }
            (TaskOutcome::Retry(reason), _) => {
                m.tasks_retried.fetch_add(1, Ordering::Relaxed);
                let delay = inner.config.backoff.delay(task.attempt);
                warn!(
                    task = %task.name,
                    attempt = task.attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "task retry scheduled: {}",
                    reason
                );
                inner
                    .queue
                    .retry(&task.name, task.generation, after(now, delay), &reason)
                    .await
            }
            (TaskOutcome::Failure(reason), Schedule::Once) => {
                m.tasks_failed.fetch_add(1, Ordering::Relaxed);
                error!(task = %task.name, "task failed: {}", reason);
                inner.queue.fail(&task.name, task.generation, &reason).await
            }
            (TaskOutcome::Failure(reason), Schedule::Periodic { interval }) => {
                m.tasks_failed.fetch_add(1, Ordering::Relaxed);
                error!(task = %task.name, "periodic task failed: {}", reason);
                inner
                    .queue
                    .reschedule(&task.name, task.generation, after(now, interval), Some(&reason))
                    .await
            }
        }
    }

    fn lock_running(&self) -> std::sync::MutexGuard<'_, HashMap<String, StopSignal>> {
        self.inner.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn after(now: Timestamp, delay: Duration) -> Timestamp {
    now.plus_millis(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX))
}
