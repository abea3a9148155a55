//! Error types for casesync-worker.

use casesync_client::{LocalStoreError, RemoteError};

/// Main error type for worker operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Task queue error.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Local store error.
    #[error("local store error: {0}")]
    Local(#[from] LocalStoreError),

    /// Remote store error.
    #[error("remote store error: {0}")]
    Remote(#[from] RemoteError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Task queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored task kind could not be encoded or decoded.
    #[error("task encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// A row holds a value the queue never writes.
    #[error("corrupt task {name}: {reason}")]
    Corrupt {
        /// Task name.
        name: String,
        /// What is wrong with it.
        reason: String,
    },
}

/// Result type alias for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;

/// Result type alias for queue operations.
pub type QueueResult<T> = std::result::Result<T, QueueError>;
