//! Write operations submitted to the remote store in atomic batches.
//!
//! A batch is a list of [`WriteOp`]s that the remote applies all-or-nothing.
//! Patches merge set fields into the document; deletes write a tombstone.
//! Neither removes the document: hard deletion is reserved for retention
//! cleanup.

use serde::{Deserialize, Serialize};

use crate::{Fields, RecordId, RemoteDocument, Timestamp};

/// Condition the remote document must satisfy for a write to apply.
///
/// A failed precondition rejects the whole batch with a conflict, which
/// the caller retries after re-reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precondition {
    /// Apply unconditionally.
    None,
    /// The document must not exist yet.
    MustNotExist,
    /// The document must exist at exactly this version.
    VersionIs(u64),
}

impl Precondition {
    /// Check the condition against the current remote document.
    pub fn holds(&self, current: Option<&RemoteDocument>) -> bool {
        match (self, current) {
            (Precondition::None, _) => true,
            (Precondition::MustNotExist, current) => current.is_none(),
            (Precondition::VersionIs(expected), Some(doc)) => doc.version == *expected,
            (Precondition::VersionIs(_), None) => false,
        }
    }
}

/// Partial update of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPatch {
    /// Target document.
    pub id: RecordId,
    /// Version to store.
    pub version: u64,
    /// Shared batch timestamp.
    pub updated_at: Timestamp,
    /// Only present when the document is being created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    /// Fields that are set on the local record.
    pub fields: Fields,
    /// Write guard.
    pub precondition: Precondition,
}

/// Tombstone write for a soft-deleted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TombstoneWrite {
    /// Target document.
    pub id: RecordId,
    /// Version to store.
    pub version: u64,
    /// Shared batch timestamp.
    pub updated_at: Timestamp,
    /// When the record was deleted locally.
    pub deleted_at: Timestamp,
    /// Only present when the document is being created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Timestamp>,
    /// Write guard.
    pub precondition: Precondition,
}

/// One operation of an atomic batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOp {
    /// Merge fields into the document.
    Patch(RecordPatch),
    /// Turn the document into a tombstone.
    Delete(TombstoneWrite),
}

impl WriteOp {
    /// Target document id.
    pub fn id(&self) -> &RecordId {
        match self {
            WriteOp::Patch(patch) => &patch.id,
            WriteOp::Delete(tombstone) => &tombstone.id,
        }
    }

    /// Version this op stores.
    pub fn version(&self) -> u64 {
        match self {
            WriteOp::Patch(patch) => patch.version,
            WriteOp::Delete(tombstone) => tombstone.version,
        }
    }

    /// Write guard of this op.
    pub fn precondition(&self) -> Precondition {
        match self {
            WriteOp::Patch(patch) => patch.precondition,
            WriteOp::Delete(tombstone) => tombstone.precondition,
        }
    }

    /// Compute the document that results from applying this op.
    ///
    /// `created_at` of an existing document is preserved even if the op
    /// carries one.
    pub fn apply_to(&self, current: Option<RemoteDocument>) -> RemoteDocument {
        match self {
            WriteOp::Patch(patch) => {
                let mut doc = current.unwrap_or_else(|| RemoteDocument {
                    id: patch.id.clone(),
                    version: patch.version,
                    updated_at: patch.updated_at,
                    created_at: patch.created_at.unwrap_or(patch.updated_at),
                    is_deleted: false,
                    deleted_at: None,
                    fields: Fields::new(),
                });
                for (key, value) in &patch.fields {
                    doc.fields.insert(key.clone(), value.clone());
                }
                doc.version = patch.version;
                doc.updated_at = patch.updated_at;
                doc.is_deleted = false;
                doc.deleted_at = None;
                doc
            }
            WriteOp::Delete(tombstone) => {
                let created_at = current
                    .map(|doc| doc.created_at)
                    .or(tombstone.created_at)
                    .unwrap_or(tombstone.updated_at);
                RemoteDocument {
                    id: tombstone.id.clone(),
                    version: tombstone.version,
                    updated_at: tombstone.updated_at,
                    created_at,
                    is_deleted: true,
                    deleted_at: Some(tombstone.deleted_at),
                    fields: Fields::new(),
                }
            }
        }
    }
}
