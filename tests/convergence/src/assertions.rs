//! Assertion helpers for convergence testing.
//!
//! Pure functions over snapshots of the fleet. They take state as input
//! and return pass/fail with details, so scenarios can print what diverged.

use std::collections::BTreeMap;

use casesync_types::{Fields, RecordId, RemoteDocument, SyncedRecord, Timestamp};

/// The replicated part of a record, as compared across devices.
///
/// `created_at` and the dirty flag are device-local and left out.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordView {
    /// Remote version.
    pub version: u64,
    /// Last change time.
    pub updated_at: Timestamp,
    /// Tombstone flag.
    pub is_deleted: bool,
    /// Deletion time.
    pub deleted_at: Option<Timestamp>,
    /// Payload.
    pub fields: Fields,
}

impl From<&SyncedRecord> for RecordView {
    fn from(record: &SyncedRecord) -> Self {
        Self {
            version: record.version,
            updated_at: record.updated_at,
            is_deleted: record.is_deleted,
            deleted_at: record.deleted_at,
            fields: record.fields.clone(),
        }
    }
}

impl From<&RemoteDocument> for RecordView {
    fn from(doc: &RemoteDocument) -> Self {
        Self::from(&doc.to_clean_record())
    }
}

/// One device's view of one entity type.
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    /// Device name.
    pub device: String,
    /// Records keyed by id.
    pub records: BTreeMap<RecordId, RecordView>,
    /// Ids still waiting to be pushed.
    pub dirty: Vec<RecordId>,
}

impl DeviceState {
    /// Snapshot a device's local records.
    pub fn capture(device: &str, records: &[SyncedRecord]) -> Self {
        Self {
            device: device.to_string(),
            records: records
                .iter()
                .map(|record| (record.id.clone(), RecordView::from(record)))
                .collect(),
            dirty: records
                .iter()
                .filter(|record| record.is_dirty)
                .map(|record| record.id.clone())
                .collect(),
        }
    }
}

/// Result of an assertion check.
#[derive(Debug, Clone)]
pub struct AssertionResult {
    /// Whether the assertion passed
    pub passed: bool,
    /// Description of what was checked
    pub description: String,
    /// Details on failure
    pub failure_details: Option<String>,
}

impl AssertionResult {
    /// Create a passing result.
    pub fn pass(description: &str) -> Self {
        Self {
            passed: true,
            description: description.into(),
            failure_details: None,
        }
    }

    /// Create a failing result.
    pub fn fail(description: &str, details: &str) -> Self {
        Self {
            passed: false,
            description: description.into(),
            failure_details: Some(details.into()),
        }
    }
}

/// Assert that every device holds exactly the remote's records.
pub fn assert_converged(devices: &[DeviceState], remote: &[RemoteDocument]) -> AssertionResult {
    let expected: BTreeMap<RecordId, RecordView> = remote
        .iter()
        .map(|doc| (doc.id.clone(), RecordView::from(doc)))
        .collect();

    for device in devices {
        if device.records == expected {
            continue;
        }
        let missing: Vec<&RecordId> = expected
            .keys()
            .filter(|id| !device.records.contains_key(*id))
            .collect();
        let differing: Vec<&RecordId> = device
            .records
            .iter()
            .filter(|(id, view)| expected.get(*id) != Some(*view))
            .map(|(id, _)| id)
            .collect();
        return AssertionResult::fail(
            "Convergence check",
            &format!(
                "Device {} diverges from remote: missing {:?}, differing {:?}",
                device.device, missing, differing
            ),
        );
    }

    AssertionResult::pass(&format!(
        "All {} devices match the remote's {} records",
        devices.len(),
        expected.len()
    ))
}

/// Assert that no device has unpushed changes.
pub fn assert_no_dirty(devices: &[DeviceState]) -> AssertionResult {
    for device in devices {
        if !device.dirty.is_empty() {
            return AssertionResult::fail(
                "No dirty records check",
                &format!("Device {} still has dirty {:?}", device.device, device.dirty),
            );
        }
    }
    AssertionResult::pass("No device has unpushed changes")
}

/// Assert that `id` is absent from every device and the remote.
pub fn assert_purged(devices: &[DeviceState], remote: &[RemoteDocument], id: &RecordId) -> AssertionResult {
    if remote.iter().any(|doc| &doc.id == id) {
        return AssertionResult::fail("Purge check", &format!("Remote still holds {id}"));
    }
    for device in devices {
        if device.records.contains_key(id) {
            return AssertionResult::fail(
                "Purge check",
                &format!("Device {} still holds {id}", device.device),
            );
        }
    }
    AssertionResult::pass(&format!("{id} purged everywhere"))
}

/// Assert that every device holds `id` as a tombstone.
pub fn assert_tombstone_everywhere(devices: &[DeviceState], id: &RecordId) -> AssertionResult {
    for device in devices {
        match device.records.get(id) {
            Some(view) if view.is_deleted && view.deleted_at.is_some() => {}
            Some(_) => {
                return AssertionResult::fail(
                    "Tombstone check",
                    &format!("Device {} holds {id} alive", device.device),
                )
            }
            None => {
                return AssertionResult::fail(
                    "Tombstone check",
                    &format!("Device {} has no row for {id}", device.device),
                )
            }
        }
    }
    AssertionResult::pass(&format!("{id} is a tombstone on every device"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, version: u64, dirty: bool) -> SyncedRecord {
        let mut record = SyncedRecord::new_local(RecordId::new(id).unwrap(), Fields::new(), Timestamp::from_millis(10));
        record.version = version;
        record.is_dirty = dirty;
        record
    }

    fn doc(id: &str, version: u64) -> RemoteDocument {
        RemoteDocument {
            id: RecordId::new(id).unwrap(),
            version,
            updated_at: Timestamp::from_millis(10),
            created_at: Timestamp::from_millis(1),
            is_deleted: false,
            deleted_at: None,
            fields: Fields::new(),
        }
    }

    #[test]
    fn converged_devices_pass() {
        let devices = vec![
            DeviceState::capture("a", &[record("c1", 1, false)]),
            DeviceState::capture("b", &[record("c1", 1, false)]),
        ];
        let result = assert_converged(&devices, &[doc("c1", 1)]);
        assert!(result.passed, "{:?}", result.failure_details);
    }

    #[test]
    fn version_mismatch_fails() {
        let devices = vec![DeviceState::capture("a", &[record("c1", 0, false)])];
        let result = assert_converged(&devices, &[doc("c1", 1)]);
        assert!(!result.passed);
        assert!(result.failure_details.unwrap().contains("differing"));
    }

    #[test]
    fn missing_record_fails() {
        let devices = vec![DeviceState::capture("a", &[])];
        let result = assert_converged(&devices, &[doc("c1", 1)]);
        assert!(!result.passed);
        assert!(result.failure_details.unwrap().contains("missing"));
    }

    #[test]
    fn dirty_devices_fail() {
        let devices = vec![DeviceState::capture("a", &[record("c1", 0, true)])];
        assert!(!assert_no_dirty(&devices).passed);
    }

    #[test]
    fn purge_detects_leftovers() {
        let id = RecordId::new("c1").unwrap();
        let devices = vec![DeviceState::capture("a", &[record("c1", 1, false)])];
        assert!(!assert_purged(&devices, &[], &id).passed);
        assert!(!assert_purged(&[], &[doc("c1", 1)], &id).passed);
        assert!(assert_purged(&[], &[], &id).passed);
    }
}
