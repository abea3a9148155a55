//! Push batch planning.
//!
//! Turns a batch of dirty local records plus the remote documents found by
//! the existence pre-check into the write operations of one atomic batch.
//! Pure: the shared batch timestamp is a parameter, not a clock read.

use std::collections::{BTreeMap, HashMap};

use casesync_types::{
    Fields, Precondition, RecordId, RecordPatch, RemoteDocument, SyncedRecord, Timestamp,
    TombstoneWrite, WriteOp,
};

use crate::resolve::{pick_winner, Winner};

/// What the push pipeline does with one dirty record.
#[derive(Debug, Clone, PartialEq)]
pub enum PushDecision {
    /// No remote document: create it.
    Create(WriteOp),
    /// Local copy wins over the remote document: overwrite it.
    Update(WriteOp),
    /// The remote document already holds this local state.
    Confirmed {
        /// Version of the remote document.
        version: u64,
        /// `updated_at` of the remote document.
        updated_at: Timestamp,
    },
    /// The remote copy wins; the record stays dirty until a pull.
    Superseded {
        /// Version of the winning remote document.
        remote_version: u64,
    },
}

/// One record's slot in a planned batch.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedRecord {
    /// The record this decision is for.
    pub id: RecordId,
    /// The decision.
    pub decision: PushDecision,
}

/// The result of planning one push batch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchPlan {
    /// Per-record decisions, in input order.
    pub records: Vec<PlannedRecord>,
    /// Shared timestamp stamped on every write.
    pub now: Timestamp,
}

impl BatchPlan {
    /// Write operations to submit, in input order.
    pub fn writes(&self) -> Vec<WriteOp> {
        self.records
            .iter()
            .filter_map(|planned| match &planned.decision {
                PushDecision::Create(op) | PushDecision::Update(op) => Some(op.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of write operations.
    pub fn write_count(&self) -> usize {
        self.records
            .iter()
            .filter(|planned| {
                matches!(
                    planned.decision,
                    PushDecision::Create(_) | PushDecision::Update(_)
                )
            })
            .count()
    }

    /// Ids the remote copy won for.
    pub fn superseded(&self) -> Vec<RecordId> {
        self.records
            .iter()
            .filter(|planned| matches!(planned.decision, PushDecision::Superseded { .. }))
            .map(|planned| planned.id.clone())
            .collect()
    }

    /// Largest version written by this batch, if it writes anything.
    pub fn max_version(&self) -> Option<u64> {
        self.records
            .iter()
            .filter_map(|planned| match &planned.decision {
                PushDecision::Create(op) | PushDecision::Update(op) => Some(op.version()),
                _ => None,
            })
            .max()
    }

    /// Records to mark clean once the batch commits, grouped by the
    /// `(version, updated_at)` each now holds remotely.
    ///
    /// Writes carry the batch timestamp; confirmed echoes keep the remote
    /// document's timestamp. Superseded records are excluded.
    pub fn clean_groups(&self) -> BTreeMap<(u64, Timestamp), Vec<RecordId>> {
        let mut groups: BTreeMap<(u64, Timestamp), Vec<RecordId>> = BTreeMap::new();
        for planned in &self.records {
            let key = match &planned.decision {
                PushDecision::Create(op) | PushDecision::Update(op) => (op.version(), self.now),
                PushDecision::Confirmed {
                    version,
                    updated_at,
                } => (*version, *updated_at),
                PushDecision::Superseded { .. } => continue,
            };
            groups.entry(key).or_default().push(planned.id.clone());
        }
        groups
    }
}

/// Plan one push batch.
///
/// `remote` must hold the current document for every record that exists
/// remotely; a missing entry means the pre-check found none.
pub fn plan_batch(
    records: &[SyncedRecord],
    remote: &HashMap<RecordId, RemoteDocument>,
    now: Timestamp,
) -> BatchPlan {
    let records = records
        .iter()
        .map(|record| PlannedRecord {
            id: record.id.clone(),
            decision: decide(record, remote.get(&record.id), now),
        })
        .collect();
    BatchPlan { records, now }
}

/// Decide what to do with one dirty record.
pub fn decide(record: &SyncedRecord, remote: Option<&RemoteDocument>, now: Timestamp) -> PushDecision {
    let Some(doc) = remote else {
        return PushDecision::Create(build_write(record, None, now));
    };

    if is_echo(record, doc) {
        return PushDecision::Confirmed {
            version: doc.version,
            updated_at: doc.updated_at,
        };
    }

    match pick_winner(record, Some(&doc.to_clean_record())) {
        Winner::Local => PushDecision::Update(build_write(record, Some(doc), now)),
        Winner::Remote => PushDecision::Superseded {
            remote_version: doc.version,
        },
    }
}

/// Whether the remote document already reflects the local state.
///
/// True when the tombstone flags agree and, for live records, every set
/// local field is equal remotely. Happens when a batch committed but the
/// local mark-clean never ran.
pub fn is_echo(record: &SyncedRecord, doc: &RemoteDocument) -> bool {
    if record.is_deleted != doc.is_deleted {
        return false;
    }
    if record.is_deleted {
        return true;
    }
    set_fields(&record.fields)
        .iter()
        .all(|(key, value)| doc.fields.get(key.as_str()) == Some(value))
}

/// The meaningfully set (non-null) fields of a payload.
pub fn set_fields(fields: &Fields) -> Fields {
    fields
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn build_write(record: &SyncedRecord, remote: Option<&RemoteDocument>, now: Timestamp) -> WriteOp {
    let (version, created_at, precondition) = match remote {
        None => (
            record.version,
            Some(record.created_at),
            Precondition::MustNotExist,
        ),
        Some(doc) => (
            record.version.max(doc.version) + 1,
            None,
            Precondition::VersionIs(doc.version),
        ),
    };

    if record.is_deleted {
        WriteOp::Delete(TombstoneWrite {
            id: record.id.clone(),
            version,
            updated_at: now,
            deleted_at: record.deleted_at.unwrap_or(record.updated_at),
            created_at,
            precondition,
        })
    } else {
        WriteOp::Patch(RecordPatch {
            id: record.id.clone(),
            version,
            updated_at: now,
            created_at,
            fields: set_fields(&record.fields),
            precondition,
        })
    }
}
