//! Tombstone retention rules shared by the cleaner and the pull pipeline.

use casesync_types::{RemoteDocument, SyncedRecord, Timestamp};

/// Tombstones deleted before this instant are eligible for purging.
pub fn retention_cutoff(now: Timestamp, retention_days: u32) -> Timestamp {
    now.minus_days(retention_days)
}

/// Whether a local record may be hard-deleted.
///
/// Only clean tombstones qualify: a dirty tombstone has not reached the
/// remote store yet.
pub fn is_purgeable(record: &SyncedRecord, cutoff: Timestamp) -> bool {
    record.is_deleted
        && !record.is_dirty
        && record.deleted_at.is_some_and(|deleted_at| deleted_at < cutoff)
}

/// Whether a remote tombstone is past retention.
pub fn is_expired_tombstone(doc: &RemoteDocument, cutoff: Timestamp) -> bool {
    doc.is_deleted
        && doc
            .deleted_at
            .unwrap_or(doc.updated_at)
            < cutoff
}

/// Whether a pulled document must not be inserted locally.
///
/// An expired tombstone with no local row was already purged here, or is
/// about to be purged remotely. Inserting it would bring it back.
pub fn skip_on_pull(doc: &RemoteDocument, has_local_row: bool, cutoff: Timestamp) -> bool {
    !has_local_row && is_expired_tombstone(doc, cutoff)
}
