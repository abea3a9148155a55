//! In-memory local store for testing.
//!
//! Same semantics as the SQLite store, plus failure injection.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use casesync_types::{EntityType, PullCursor, RecordId, SyncedRecord, Timestamp};

use super::{LocalStore, PushedRecord, QuarantinedRecord, RowState};
use crate::error::LocalStoreError;

#[derive(Debug, Clone)]
struct Row {
    record: SyncedRecord,
    push_failures: u32,
    last_error: Option<String>,
    quarantined_at: Option<Timestamp>,
}

#[derive(Debug, Default)]
struct MemoryLocalInner {
    rows: HashMap<EntityType, BTreeMap<RecordId, Row>>,
    cursors: HashMap<EntityType, PullCursor>,
    fail_next: Option<String>,
    fail_mark_pushed: Option<String>,
    before_apply: Option<(EntityType, SyncedRecord)>,
}

/// In-memory local store.
///
/// Clones share state, like two handles onto the same database.
#[derive(Debug, Default, Clone)]
pub struct MemoryLocalStore {
    inner: Arc<Mutex<MemoryLocalInner>>,
}

impl MemoryLocalStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cause the next operation to fail with the given error.
    pub fn fail_next(&self, error: &str) {
        self.lock().fail_next = Some(error.to_string());
    }

    /// Cause the next `mark_batch_pushed` to fail, simulating a crash
    /// between the remote commit and the local bookkeeping.
    pub fn fail_next_mark_pushed(&self, error: &str) {
        self.lock().fail_mark_pushed = Some(error.to_string());
    }

    /// Write `record` at the start of the next `apply_pulled`, after the
    /// caller has read the rows it is about to overwrite.
    pub fn write_before_next_apply(&self, entity: EntityType, record: SyncedRecord) {
        self.lock().before_apply = Some((entity, record));
    }

    /// Every record of an entity type, ordered by id.
    pub fn snapshot(&self, entity: EntityType) -> Vec<SyncedRecord> {
        self.lock()
            .rows
            .get(&entity)
            .map(|rows| rows.values().map(|row| row.record.clone()).collect())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryLocalInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_rows(inner: &mut MemoryLocalInner, entity: EntityType, records: &[SyncedRecord]) {
        let rows = inner.rows.entry(entity).or_default();
        for record in records {
            match rows.get_mut(&record.id) {
                Some(row) => {
                    let created_at = row.record.created_at;
                    row.record = record.clone();
                    row.record.created_at = created_at;
                    if !record.is_dirty {
                        row.push_failures = 0;
                        row.last_error = None;
                        row.quarantined_at = None;
                    }
                }
                None => {
                    rows.insert(
                        record.id.clone(),
                        Row {
                            record: record.clone(),
                            push_failures: 0,
                            last_error: None,
                            quarantined_at: None,
                        },
                    );
                }
            }
        }
    }

    fn lock_checked(&self) -> Result<MutexGuard<'_, MemoryLocalInner>, LocalStoreError> {
        let mut inner = self.lock();
        match inner.fail_next.take() {
            Some(error) => Err(LocalStoreError::Unavailable(error)),
            None => Ok(inner),
        }
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn load_dirty_batch(
        &self,
        entity: EntityType,
        limit: usize,
    ) -> Result<Vec<SyncedRecord>, LocalStoreError> {
        let inner = self.lock_checked()?;
        let mut dirty: Vec<SyncedRecord> = inner
            .rows
            .get(&entity)
            .map(|rows| {
                rows.values()
                    .filter(|row| row.record.is_dirty && row.quarantined_at.is_none())
                    .map(|row| row.record.clone())
                    .collect()
            })
            .unwrap_or_default();
        dirty.sort_by(|a, b| (a.updated_at, &a.id).cmp(&(b.updated_at, &b.id)));
        dirty.truncate(limit);
        Ok(dirty)
    }

    async fn mark_batch_pushed(
        &self,
        entity: EntityType,
        records: &[PushedRecord],
        version: u64,
        pushed_at: Timestamp,
    ) -> Result<u64, LocalStoreError> {
        let mut inner = self.lock_checked()?;
        if let Some(error) = inner.fail_mark_pushed.take() {
            return Err(LocalStoreError::Unavailable(error));
        }
        let rows = inner.rows.entry(entity).or_default();
        let mut cleaned = 0;
        for pushed in records {
            let Some(row) = rows.get_mut(&pushed.id).filter(|row| row.record.is_dirty) else {
                continue;
            };
            row.push_failures = 0;
            row.last_error = None;
            if row.record.updated_at == pushed.loaded_at {
                row.record.is_dirty = false;
                row.record.version = version;
                row.record.updated_at = pushed_at;
                cleaned += 1;
            } else {
                row.record.version = row.record.version.max(version);
                row.record.updated_at = row.record.updated_at.max(pushed_at);
            }
        }
        Ok(cleaned)
    }

    async fn apply_pulled(
        &self,
        entity: EntityType,
        writes: &[(SyncedRecord, RowState)],
    ) -> Result<Vec<RecordId>, LocalStoreError> {
        let mut inner = self.lock_checked()?;
        if let Some((racing_entity, record)) = inner.before_apply.take() {
            Self::write_rows(&mut inner, racing_entity, std::slice::from_ref(&record));
        }
        let mut changed = Vec::new();
        let mut unchanged = Vec::with_capacity(writes.len());
        let rows = inner.rows.get(&entity);
        for (record, seen) in writes {
            let current = rows.and_then(|rows| rows.get(&record.id)).map(|row| &row.record);
            if RowState::of(current) == *seen {
                unchanged.push(record.clone());
            } else {
                changed.push(record.id.clone());
            }
        }
        Self::write_rows(&mut inner, entity, &unchanged);
        Ok(changed)
    }

    async fn upsert_all(
        &self,
        entity: EntityType,
        records: &[SyncedRecord],
    ) -> Result<(), LocalStoreError> {
        let mut inner = self.lock_checked()?;
        Self::write_rows(&mut inner, entity, records);
        Ok(())
    }

    async fn find(
        &self,
        entity: EntityType,
        ids: &[RecordId],
    ) -> Result<HashMap<RecordId, SyncedRecord>, LocalStoreError> {
        let inner = self.lock_checked()?;
        let Some(rows) = inner.rows.get(&entity) else {
            return Ok(HashMap::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| rows.get(id).map(|row| (id.clone(), row.record.clone())))
            .collect())
    }

    async fn delete_hard_before(
        &self,
        entity: EntityType,
        cutoff: Timestamp,
    ) -> Result<u64, LocalStoreError> {
        let mut inner = self.lock_checked()?;
        let rows = inner.rows.entry(entity).or_default();
        let before = rows.len();
        rows.retain(|_, row| !casesync_core::retention::is_purgeable(&row.record, cutoff));
        Ok((before - rows.len()) as u64)
    }

    async fn load_pull_cursor(
        &self,
        entity: EntityType,
    ) -> Result<Option<PullCursor>, LocalStoreError> {
        Ok(self.lock_checked()?.cursors.get(&entity).cloned())
    }

    async fn save_pull_cursor(
        &self,
        entity: EntityType,
        cursor: &PullCursor,
    ) -> Result<(), LocalStoreError> {
        self.lock_checked()?.cursors.insert(entity, cursor.clone());
        Ok(())
    }

    async fn record_push_failure(
        &self,
        entity: EntityType,
        id: &RecordId,
        error: &str,
        max_failures: u32,
        now: Timestamp,
    ) -> Result<bool, LocalStoreError> {
        let mut inner = self.lock_checked()?;
        let Some(row) = inner.rows.entry(entity).or_default().get_mut(id) else {
            return Ok(false);
        };
        row.push_failures += 1;
        row.last_error = Some(error.to_string());
        if row.push_failures >= max_failures && row.quarantined_at.is_none() {
            row.quarantined_at = Some(now);
        }
        Ok(row.quarantined_at.is_some())
    }

    async fn list_quarantined(
        &self,
        entity: EntityType,
    ) -> Result<Vec<QuarantinedRecord>, LocalStoreError> {
        let inner = self.lock_checked()?;
        let mut quarantined: Vec<QuarantinedRecord> = inner
            .rows
            .get(&entity)
            .map(|rows| {
                rows.values()
                    .filter_map(|row| {
                        row.quarantined_at.map(|quarantined_at| QuarantinedRecord {
                            id: row.record.id.clone(),
                            failures: row.push_failures,
                            last_error: row.last_error.clone(),
                            quarantined_at,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        quarantined.sort_by(|a, b| (a.quarantined_at, &a.id).cmp(&(b.quarantined_at, &b.id)));
        Ok(quarantined)
    }

    async fn release_quarantine(
        &self,
        entity: EntityType,
        id: &RecordId,
    ) -> Result<bool, LocalStoreError> {
        let mut inner = self.lock_checked()?;
        match inner.rows.entry(entity).or_default().get_mut(id) {
            Some(row) if row.quarantined_at.is_some() => {
                row.quarantined_at = None;
                row.push_failures = 0;
                row.last_error = None;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn count_dirty(&self, entity: EntityType) -> Result<u64, LocalStoreError> {
        let inner = self.lock_checked()?;
        Ok(inner
            .rows
            .get(&entity)
            .map(|rows| rows.values().filter(|row| row.record.is_dirty).count() as u64)
            .unwrap_or(0))
    }
}
