//! Tombstone retention across devices.

use crate::assertions::{assert_purged, assert_tombstone_everywhere};
use crate::harness::{fields, Fleet};
use casesync_client::{Clock, EngineConfig, MemoryRemoteStore};
use casesync_types::{EntityType, RecordId};
use serde_json::json;

const RETENTION_DAYS: u32 = 30;

async fn fleet_with_tombstones(names: &[&str]) -> Fleet {
    let fleet = Fleet::with_config(names, EngineConfig::default(), MemoryRemoteStore::new());
    let a = fleet.device(0);
    a.create(EntityType::Event, "old", fields([("title", json!("Camp"))]))
        .await
        .unwrap();
    a.create(EntityType::Event, "recent", fields([("title", json!("Fair"))]))
        .await
        .unwrap();
    fleet.tick();
    fleet.settle(4).await.unwrap();

    a.delete(EntityType::Event, "old").await.unwrap();
    fleet.tick();
    fleet.settle(4).await.unwrap();

    fleet.clock().advance_days(21);
    a.delete(EntityType::Event, "recent").await.unwrap();
    fleet.tick();
    fleet.settle(4).await.unwrap();

    // "old" was deleted 31 days ago, "recent" 10 days ago.
    fleet.clock().advance_days(10);
    fleet
}

/// Expired tombstones disappear from every store; younger ones stay.
#[tokio::test]
async fn cleaner_purges_only_expired_tombstones() {
    let fleet = fleet_with_tombstones(&["a", "b"]).await;
    let old = RecordId::new("old").unwrap();
    let recent = RecordId::new("recent").unwrap();

    for device in fleet.devices() {
        device.cleanup(RETENTION_DAYS).await.unwrap();
    }

    let states = fleet.states(EntityType::Event);
    let remote = fleet.remote().snapshot(EntityType::Event);
    let result = assert_purged(&states, &remote, &old);
    assert!(result.passed, "{:?}", result.failure_details);
    let result = assert_tombstone_everywhere(&states, &recent);
    assert!(result.passed, "{:?}", result.failure_details);
    assert!(remote.iter().any(|doc| doc.id == recent && doc.is_deleted));
}

/// Purged records are not resurrected by later syncs.
#[tokio::test]
async fn purged_records_stay_gone() {
    let fleet = fleet_with_tombstones(&["a", "b"]).await;
    fleet.device(0).cleanup(RETENTION_DAYS).await.unwrap();
    fleet.device(1).cleanup(RETENTION_DAYS).await.unwrap();

    fleet.tick();
    fleet.settle(4).await.unwrap();

    let old = RecordId::new("old").unwrap();
    let result = assert_purged(
        &fleet.states(EntityType::Event),
        &fleet.remote().snapshot(EntityType::Event),
        &old,
    );
    assert!(result.passed, "{:?}", result.failure_details);
}

/// A device joining late never downloads expired tombstones, even before
/// the remote has been cleaned.
#[tokio::test]
async fn late_joiner_skips_expired_tombstones() {
    let fleet = fleet_with_tombstones(&["a"]).await;
    let fresh = Fleet::with_config(&["fresh"], EngineConfig::default(), fleet.remote().clone());
    fresh.clock().set(fleet.clock().now());

    fresh.device(0).sync().await.unwrap();

    assert!(fresh.device(0).record(EntityType::Event, "old").await.unwrap().is_none());
    let recent = fresh
        .device(0)
        .record(EntityType::Event, "recent")
        .await
        .unwrap()
        .expect("recent tombstone should replicate");
    assert!(recent.is_deleted);
}

/// A tombstone still waiting to be pushed survives the cleaner.
#[tokio::test]
async fn unpushed_tombstone_survives_cleanup() {
    let fleet = Fleet::new(&["a"]);
    let a = fleet.device(0);
    a.create(EntityType::CaseRecord, "c1", fields([("name", json!("Cy"))]))
        .await
        .unwrap();
    fleet.tick();
    fleet.settle(4).await.unwrap();

    fleet.remote().set_offline(true);
    a.delete(EntityType::CaseRecord, "c1").await.unwrap();
    fleet.clock().advance_days(40);
    assert!(a.cleanup(RETENTION_DAYS).await.is_err());
    fleet.remote().set_offline(false);
    a.cleanup(RETENTION_DAYS).await.unwrap();

    let record = a.record(EntityType::CaseRecord, "c1").await.unwrap().unwrap();
    assert!(record.is_dirty);
    assert!(record.is_deleted);

    a.sync().await.unwrap();
    let doc = fleet
        .remote()
        .peek(EntityType::CaseRecord, &RecordId::new("c1").unwrap())
        .unwrap();
    assert!(doc.is_deleted);
}
