//! # casesync-worker
//!
//! Background sync worker for casesync.
//!
//! This crate drives the sync engine on a device:
//! - Keeps a durable queue of one-shot and periodic sync tasks
//! - Dispatches due tasks when connectivity allows, with backoff on retry
//! - Never runs two instances of the same task at once
//! - Exposes health, metrics and a small control API over HTTP
//!
//! ## Architecture
//!
//! ```text
//!   app / CLI / HTTP
//!          │ enqueue
//!          ▼
//!   ┌─────────────┐    due     ┌───────────┐   run    ┌────────────┐
//!   │ Coordinator │──► queue ─►│ Scheduler │────────► │ SyncEngine │
//!   └─────────────┘  (SQLite)  └───────────┘          └────────────┘
//!                                    ▲
//!                     NetworkMonitor │ online / offline
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod coordinator;
pub mod error;
pub mod http;
pub mod metrics;
pub mod network;
pub mod queue;
pub mod scheduler;
pub mod task;
pub mod worker;

pub use config::Config;
pub use coordinator::Coordinator;
pub use error::{QueueError, WorkerError};
pub use network::NetworkMonitor;
pub use queue::{NewTask, Schedule, SqliteTaskQueue, TaskQueue, TaskRecord, TaskState};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use task::{EngineRunner, TaskKind, TaskOutcome, TaskRunner};
pub use worker::Worker;
