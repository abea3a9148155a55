//! Local embedded store.
//!
//! The local store owns the dirty flag, the pull cursors and the
//! per-record push failure counts. Every operation is scoped to one
//! entity type.

mod memory;
mod sqlite;

pub use memory::MemoryLocalStore;
pub use sqlite::SqliteLocalStore;

use std::collections::HashMap;

use async_trait::async_trait;
use casesync_types::{EntityType, PullCursor, RecordId, SyncedRecord, Timestamp};
use serde::Serialize;

use crate::error::LocalStoreError;

/// A record excluded from pushing after repeated rejections.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuarantinedRecord {
    /// The record.
    pub id: RecordId,
    /// Consecutive rejected pushes.
    pub failures: u32,
    /// Last rejection reason.
    pub last_error: Option<String>,
    /// When the record was quarantined.
    pub quarantined_at: Timestamp,
}

/// A record confirmed by a push, with the `updated_at` it was loaded with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushedRecord {
    /// The record.
    pub id: RecordId,
    /// `updated_at` of the row when the push loaded it.
    pub loaded_at: Timestamp,
}

impl PushedRecord {
    /// Capture a loaded record.
    pub fn of(record: &SyncedRecord) -> Self {
        Self {
            id: record.id.clone(),
            loaded_at: record.updated_at,
        }
    }
}

/// The state a pull saw a local row in before deciding to overwrite it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowState {
    /// No row existed.
    Absent,
    /// The row existed with these values.
    Present {
        /// `updated_at` of the row.
        updated_at: Timestamp,
        /// Dirty flag of the row.
        is_dirty: bool,
    },
}

impl RowState {
    /// The state of an optional local row.
    pub fn of(record: Option<&SyncedRecord>) -> Self {
        match record {
            None => Self::Absent,
            Some(record) => Self::Present {
                updated_at: record.updated_at,
                is_dirty: record.is_dirty,
            },
        }
    }
}

/// Trait for local store backends.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Load up to `limit` dirty, non-quarantined records.
    ///
    /// Ordered by `(updated_at, id)`, oldest change first.
    async fn load_dirty_batch(
        &self,
        entity: EntityType,
        limit: usize,
    ) -> Result<Vec<SyncedRecord>, LocalStoreError>;

    /// Mark records clean after a confirmed push.
    ///
    /// A dirty row whose `updated_at` still equals `loaded_at` becomes
    /// clean at `version` and `pushed_at`. A dirty row edited since it was
    /// loaded stays dirty: it takes at least `version` and `pushed_at`, so
    /// the edit wins the next comparison against what was just written.
    /// Push failure counts are reset either way. Unknown and clean rows
    /// are ignored.
    ///
    /// Returns how many rows were marked clean.
    async fn mark_batch_pushed(
        &self,
        entity: EntityType,
        records: &[PushedRecord],
        version: u64,
        pushed_at: Timestamp,
    ) -> Result<u64, LocalStoreError>;

    /// Write pulled records, each only if its row is still in the state
    /// the caller read it in.
    ///
    /// Returns the ids whose rows changed in the meantime; those were not
    /// written.
    async fn apply_pulled(
        &self,
        entity: EntityType,
        writes: &[(SyncedRecord, RowState)],
    ) -> Result<Vec<RecordId>, LocalStoreError>;

    /// Insert or replace records.
    ///
    /// An existing row keeps its `created_at`. Writing a clean record
    /// clears any quarantine on it.
    async fn upsert_all(
        &self,
        entity: EntityType,
        records: &[SyncedRecord],
    ) -> Result<(), LocalStoreError>;

    /// Insert or replace one record.
    async fn upsert_one(
        &self,
        entity: EntityType,
        record: &SyncedRecord,
    ) -> Result<(), LocalStoreError> {
        self.upsert_all(entity, std::slice::from_ref(record)).await
    }

    /// Look up records by id. Missing ids are absent from the map.
    async fn find(
        &self,
        entity: EntityType,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, SyncedRecord>, LocalStoreError>;

    /// Look up one record.
    async fn get(
        &self,
        entity: EntityType,
        id: &RecordId,
    ) -> Result<Option<SyncedRecord>, LocalStoreError> {
        let mut found = self.find(entity, std::slice::from_ref(id)).await?;
        Ok(found.remove(id))
    }

    /// Hard-delete clean tombstones deleted before `cutoff`.
    ///
    /// Returns the number of rows removed. Dirty tombstones are kept until
    /// they have been pushed.
    async fn delete_hard_before(
        &self,
        entity: EntityType,
        cutoff: Timestamp,
    ) -> Result<u64, LocalStoreError>;

    /// Read the persisted pull cursor.
    async fn load_pull_cursor(
        &self,
        entity: EntityType,
    ) -> Result<Option<PullCursor>, LocalStoreError>;

    /// Persist the pull cursor.
    async fn save_pull_cursor(
        &self,
        entity: EntityType,
        cursor: &PullCursor,
    ) -> Result<(), LocalStoreError>;

    /// Count a rejected push of one record.
    ///
    /// Quarantines the record once its count reaches `max_failures`.
    /// Returns `true` if the record is now quarantined.
    async fn record_push_failure(
        &self,
        entity: EntityType,
        id: &RecordId,
        error: &str,
        max_failures: u32,
        now: Timestamp,
    ) -> Result<bool, LocalStoreError>;

    /// List quarantined records.
    async fn list_quarantined(
        &self,
        entity: EntityType,
    ) -> Result<Vec<QuarantinedRecord>, LocalStoreError>;

    /// Return a quarantined record to the push queue.
    ///
    /// Returns `false` if the record was not quarantined.
    async fn release_quarantine(
        &self,
        entity: EntityType,
        id: &RecordId,
    ) -> Result<bool, LocalStoreError>;

    /// Number of dirty records, quarantined ones included.
    async fn count_dirty(&self, entity: EntityType) -> Result<u64, LocalStoreError>;
}
