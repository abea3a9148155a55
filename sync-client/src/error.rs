//! Error types for sync-client.

use casesync_types::{EntityType, RecordId};
use thiserror::Error;

/// Local store errors.
///
/// Always fatal for the running task: nothing is marked clean and the
/// scheduler reports a failure instead of retrying.
#[derive(Debug, Error)]
pub enum LocalStoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored row could not be decoded.
    #[error("corrupt row {entity}/{id}: {reason}")]
    Corrupt {
        /// Entity type of the row.
        entity: EntityType,
        /// Raw id of the row.
        id: String,
        /// What was wrong.
        reason: String,
    },

    /// Field payload serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store cannot be reached (in-memory failure injection).
    #[error("local store unavailable: {0}")]
    Unavailable(String),
}

/// Remote document store errors.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// No connectivity, or the remote reported itself unavailable.
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// The request timed out.
    #[error("remote request timed out")]
    Timeout,

    /// A write precondition no longer holds; another writer got there first.
    #[error("write conflict on {id:?}: {reason}")]
    Conflict {
        /// The conflicting record, when the remote names it.
        id: Option<RecordId>,
        /// Remote explanation.
        reason: String,
    },

    /// The remote refused the write (quota, permission, malformed data).
    #[error("write rejected: {reason}")]
    Rejected {
        /// Remote explanation.
        reason: String,
    },

    /// The remote answered with something that could not be decoded.
    #[error("invalid remote response: {0}")]
    InvalidResponse(String),

    /// The configured base URL cannot address documents.
    #[error("invalid remote url: {0}")]
    InvalidUrl(String),
}

impl RemoteError {
    /// Whether the error is transient and the operation may succeed later.
    pub fn is_transient(&self) -> bool {
        !matches!(self, RemoteError::Rejected { .. } | RemoteError::InvalidUrl(_))
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RemoteError::Timeout
        } else if e.is_connect() || e.is_request() {
            RemoteError::Unavailable(e.to_string())
        } else {
            RemoteError::InvalidResponse(e.to_string())
        }
    }
}

/// Errors that end a push, pull or cleanup run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Local store failure.
    #[error("local store error: {0}")]
    Local(#[from] LocalStoreError),

    /// Remote store failure.
    #[error("remote store error: {0}")]
    Remote(#[from] RemoteError),
}

impl PipelineError {
    /// Whether the scheduler should retry the task.
    ///
    /// Remote failures retry, rejections included; local failures do not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PipelineError::Remote(_))
    }
}
