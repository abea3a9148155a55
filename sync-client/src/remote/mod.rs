//! Remote document store.
//!
//! The remote store is shared by every device and is never locked.
//! Writes go through atomic batches guarded by per-op preconditions;
//! reads are single-document gets and ordered pages.
//!
//! # Design
//!
//! - `batch_write()` applies a batch all-or-nothing
//! - `get()` is the existence pre-check, read outside any batch
//! - `query_page()` pages documents by `(updated_at, id)`
//! - `query_tombstones_before()` / `delete_hard()` serve retention cleanup

mod http;
mod memory;

pub use http::{HttpRemoteConfig, HttpRemoteStore};
pub use memory::MemoryRemoteStore;

use async_trait::async_trait;
use casesync_types::{EntityType, PullCursor, RecordId, RemoteDocument, Timestamp, WriteOp};

use crate::error::RemoteError;

/// Default remote atomic-batch ceiling.
pub const DEFAULT_BATCH_CEILING: usize = 500;

/// Trait for remote document store backends.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Apply a batch of writes atomically.
    ///
    /// Either every op is applied or none is. A failed precondition
    /// yields [`RemoteError::Conflict`]; a batch larger than
    /// [`batch_ceiling`](Self::batch_ceiling) is rejected.
    async fn batch_write(&self, entity: EntityType, ops: &[WriteOp]) -> Result<(), RemoteError>;

    /// Fetch one document, tombstones included.
    async fn get(
        &self,
        entity: EntityType,
        id: &RecordId,
    ) -> Result<Option<RemoteDocument>, RemoteError>;

    /// Up to `limit` documents strictly after `after`, ordered ascending
    /// by `(updated_at, id)`.
    async fn query_page(
        &self,
        entity: EntityType,
        after: Option<&PullCursor>,
        limit: usize,
    ) -> Result<Vec<RemoteDocument>, RemoteError>;

    /// Ids of up to `limit` tombstones deleted before `cutoff`.
    async fn query_tombstones_before(
        &self,
        entity: EntityType,
        cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<RecordId>, RemoteError>;

    /// Permanently remove documents. Returns how many were removed.
    async fn delete_hard(&self, entity: EntityType, ids: &[RecordId]) -> Result<u64, RemoteError>;

    /// Check that the remote store is reachable.
    async fn health(&self) -> Result<(), RemoteError>;

    /// Maximum ops per atomic batch.
    fn batch_ceiling(&self) -> usize {
        DEFAULT_BATCH_CEILING
    }
}
