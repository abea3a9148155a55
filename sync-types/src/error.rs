//! Error types for casesync.

use thiserror::Error;

/// Errors raised while building or decoding sync data.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Invalid data format
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Unknown collection name
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),

    /// JSON encoding or decoding failed
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
