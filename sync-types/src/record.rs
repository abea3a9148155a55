//! The record shape shared by every synchronized entity.

use serde::{Deserialize, Serialize};

use crate::{RecordId, Timestamp};

/// Entity-specific payload of a record.
///
/// The sync engine only distinguishes set (non-null) from unset (null)
/// values; everything else belongs to the application.
pub type Fields = serde_json::Map<String, serde_json::Value>;

/// A record as held by the local store.
///
/// Carries the audit and versioning metadata the replication pipelines
/// rely on. `deleted_at` is present if and only if `is_deleted` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncedRecord {
    /// Identifier, unique per entity type.
    pub id: RecordId,
    /// Non-decreasing version; the remote store increments it on accepted updates.
    pub version: u64,
    /// Last write, local or remote.
    pub updated_at: Timestamp,
    /// Creation time. Never rewritten by replication.
    pub created_at: Timestamp,
    /// Local changes not yet confirmed by the remote store.
    pub is_dirty: bool,
    /// Tombstone flag.
    pub is_deleted: bool,
    /// When the record was soft-deleted.
    pub deleted_at: Option<Timestamp>,
    /// Entity payload.
    #[serde(default)]
    pub fields: Fields,
}

impl SyncedRecord {
    /// A record created on this device: version 0, dirty.
    pub fn new_local(id: RecordId, fields: Fields, now: Timestamp) -> Self {
        Self {
            id,
            version: 0,
            updated_at: now,
            created_at: now,
            is_dirty: true,
            is_deleted: false,
            deleted_at: None,
            fields,
        }
    }

    /// Apply a local edit.
    ///
    /// Changed fields are merged over the existing payload. The version is
    /// left alone: only an accepted remote write advances it.
    pub fn edit(&mut self, changes: Fields, now: Timestamp) {
        for (key, value) in changes {
            self.fields.insert(key, value);
        }
        self.updated_at = now;
        self.is_dirty = true;
    }

    /// Soft-delete the record locally.
    pub fn soft_delete(&mut self, now: Timestamp) {
        self.is_deleted = true;
        self.deleted_at = Some(now);
        self.updated_at = now;
        self.is_dirty = true;
    }

    /// Whether the tombstone invariant holds.
    pub fn is_tombstone_consistent(&self) -> bool {
        self.is_deleted == self.deleted_at.is_some()
    }

    /// Restore the tombstone invariant on data from another writer.
    ///
    /// A deleted record missing `deleted_at` takes `updated_at`; a live
    /// record drops any stray `deleted_at`.
    pub fn normalize_tombstone(&mut self) {
        if self.is_deleted {
            self.deleted_at.get_or_insert(self.updated_at);
        } else {
            self.deleted_at = None;
        }
    }
}

/// A record as stored by the remote document store.
///
/// Has no dirty flag: that state only exists locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    /// Identifier, unique per entity type.
    pub id: RecordId,
    /// Version assigned by the last accepted write.
    pub version: u64,
    /// Time of the last accepted write.
    pub updated_at: Timestamp,
    /// Creation time.
    pub created_at: Timestamp,
    /// Tombstone flag.
    #[serde(default)]
    pub is_deleted: bool,
    /// When the record was soft-deleted.
    #[serde(default)]
    pub deleted_at: Option<Timestamp>,
    /// Entity payload.
    #[serde(default)]
    pub fields: Fields,
}

impl RemoteDocument {
    /// Convert to a clean local record (remote truth).
    pub fn into_clean_record(self) -> SyncedRecord {
        let mut record = SyncedRecord {
            id: self.id,
            version: self.version,
            updated_at: self.updated_at,
            created_at: self.created_at,
            is_dirty: false,
            is_deleted: self.is_deleted,
            deleted_at: self.deleted_at,
            fields: self.fields,
        };
        record.normalize_tombstone();
        record
    }

    /// View as a record for conflict resolution without consuming it.
    pub fn to_clean_record(&self) -> SyncedRecord {
        self.clone().into_clean_record()
    }
}
