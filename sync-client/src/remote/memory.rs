//! In-memory remote store for testing.
//!
//! Behaves like the shared remote document store: atomic batches,
//! precondition checks, ordered pages. Allows injecting outages and
//! poisoning individual records so that any batch touching them is
//! rejected.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use casesync_types::{EntityType, PullCursor, RecordId, RemoteDocument, Timestamp, WriteOp};

use super::{RemoteStore, DEFAULT_BATCH_CEILING};
use crate::error::RemoteError;

#[derive(Debug)]
struct MemoryRemoteInner {
    docs: HashMap<EntityType, BTreeMap<RecordId, RemoteDocument>>,
    batch_ceiling: usize,
    offline: bool,
    poisoned: HashSet<RecordId>,
    fail_next_write: Option<RemoteError>,
    fail_next_get: Option<RemoteError>,
    fail_next_query: Option<RemoteError>,
    batches_written: usize,
    ops_written: usize,
    gets: usize,
    pages_served: usize,
}

impl Default for MemoryRemoteInner {
    fn default() -> Self {
        Self {
            docs: HashMap::new(),
            batch_ceiling: DEFAULT_BATCH_CEILING,
            offline: false,
            poisoned: HashSet::new(),
            fail_next_write: None,
            fail_next_get: None,
            fail_next_query: None,
            batches_written: 0,
            ops_written: 0,
            gets: 0,
            pages_served: 0,
        }
    }
}

/// In-memory remote store.
///
/// Clones share state, so several simulated devices can point at the
/// same remote.
#[derive(Debug, Default, Clone)]
pub struct MemoryRemoteStore {
    inner: Arc<Mutex<MemoryRemoteInner>>,
}

impl MemoryRemoteStore {
    /// Create an empty remote.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty remote with a custom batch ceiling.
    pub fn with_batch_ceiling(batch_ceiling: usize) -> Self {
        let store = Self::default();
        store.lock().batch_ceiling = batch_ceiling;
        store
    }

    /// Simulate losing or regaining connectivity.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Reject every batch that writes this record.
    pub fn poison(&self, id: RecordId) {
        self.lock().poisoned.insert(id);
    }

    /// Stop rejecting writes to this record.
    pub fn cure(&self, id: &RecordId) {
        self.lock().poisoned.remove(id);
    }

    /// Cause the next `batch_write()` to fail with the given error.
    pub fn fail_next_write(&self, error: RemoteError) {
        self.lock().fail_next_write = Some(error);
    }

    /// Cause the next `get()` to fail with the given error.
    pub fn fail_next_get(&self, error: RemoteError) {
        self.lock().fail_next_get = Some(error);
    }

    /// Cause the next `query_page()` to fail with the given error.
    pub fn fail_next_query(&self, error: RemoteError) {
        self.lock().fail_next_query = Some(error);
    }

    /// Write documents directly, bypassing batches (test setup).
    pub fn seed(&self, entity: EntityType, docs: impl IntoIterator<Item = RemoteDocument>) {
        let mut inner = self.lock();
        let collection = inner.docs.entry(entity).or_default();
        for doc in docs {
            collection.insert(doc.id.clone(), doc);
        }
    }

    /// Every document of an entity type, ordered by id.
    pub fn snapshot(&self, entity: EntityType) -> Vec<RemoteDocument> {
        self.lock()
            .docs
            .get(&entity)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Look up one document without counting it as a read.
    pub fn peek(&self, entity: EntityType, id: &RecordId) -> Option<RemoteDocument> {
        self.lock().docs.get(&entity).and_then(|docs| docs.get(id).cloned())
    }

    /// Number of committed batches.
    pub fn batches_written(&self) -> usize {
        self.lock().batches_written
    }

    /// Number of committed ops.
    pub fn ops_written(&self) -> usize {
        self.lock().ops_written
    }

    /// Number of single-document reads served.
    pub fn gets(&self) -> usize {
        self.lock().gets
    }

    /// Number of pages served.
    pub fn pages_served(&self) -> usize {
        self.lock().pages_served
    }

    fn lock(&self) -> MutexGuard<'_, MemoryRemoteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_online(inner: &MemoryRemoteInner) -> Result<(), RemoteError> {
        if inner.offline {
            return Err(RemoteError::Unavailable("offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn batch_write(&self, entity: EntityType, ops: &[WriteOp]) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        Self::check_online(&inner)?;
        if let Some(error) = inner.fail_next_write.take() {
            return Err(error);
        }

        if ops.len() > inner.batch_ceiling {
            return Err(RemoteError::Rejected {
                reason: format!(
                    "batch of {} ops exceeds ceiling {}",
                    ops.len(),
                    inner.batch_ceiling
                ),
            });
        }

        if let Some(op) = ops.iter().find(|op| inner.poisoned.contains(op.id())) {
            return Err(RemoteError::Rejected {
                reason: format!("write to {} denied", op.id()),
            });
        }

        let collection = inner.docs.entry(entity).or_default();
        for op in ops {
            if !op.precondition().holds(collection.get(op.id())) {
                return Err(RemoteError::Conflict {
                    id: Some(op.id().clone()),
                    reason: format!("precondition {:?} failed", op.precondition()),
                });
            }
        }

        for op in ops {
            let current = collection.remove(op.id());
            collection.insert(op.id().clone(), op.apply_to(current));
        }

        inner.batches_written += 1;
        inner.ops_written += ops.len();
        Ok(())
    }

    async fn get(
        &self,
        entity: EntityType,
        id: &RecordId,
    ) -> Result<Option<RemoteDocument>, RemoteError> {
        let mut inner = self.lock();
        Self::check_online(&inner)?;
        if let Some(error) = inner.fail_next_get.take() {
            return Err(error);
        }
        inner.gets += 1;
        Ok(inner.docs.get(&entity).and_then(|docs| docs.get(id).cloned()))
    }

    async fn query_page(
        &self,
        entity: EntityType,
        after: Option<&PullCursor>,
        limit: usize,
    ) -> Result<Vec<RemoteDocument>, RemoteError> {
        let mut inner = self.lock();
        Self::check_online(&inner)?;
        if let Some(error) = inner.fail_next_query.take() {
            return Err(error);
        }
        inner.pages_served += 1;

        let mut page: Vec<RemoteDocument> = inner
            .docs
            .get(&entity)
            .map(|docs| {
                docs.values()
                    .filter(|doc| after.map_or(true, |cursor| cursor.is_before(doc.updated_at, &doc.id)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        page.sort_by(|a, b| (a.updated_at, &a.id).cmp(&(b.updated_at, &b.id)));
        page.truncate(limit);
        Ok(page)
    }

    async fn query_tombstones_before(
        &self,
        entity: EntityType,
        cutoff: Timestamp,
        limit: usize,
    ) -> Result<Vec<RecordId>, RemoteError> {
        let inner = self.lock();
        Self::check_online(&inner)?;
        Ok(inner
            .docs
            .get(&entity)
            .map(|docs| {
                docs.values()
                    .filter(|doc| casesync_core::retention::is_expired_tombstone(doc, cutoff))
                    .take(limit)
                    .map(|doc| doc.id.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_hard(&self, entity: EntityType, ids: &[RecordId]) -> Result<u64, RemoteError> {
        let mut inner = self.lock();
        Self::check_online(&inner)?;
        let collection = inner.docs.entry(entity).or_default();
        Ok(ids.iter().filter(|id| collection.remove(*id).is_some()).count() as u64)
    }

    async fn health(&self) -> Result<(), RemoteError> {
        Self::check_online(&self.lock())
    }

    fn batch_ceiling(&self) -> usize {
        self.lock().batch_ceiling
    }
}
