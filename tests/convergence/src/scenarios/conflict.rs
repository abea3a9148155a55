//! Concurrent edits and deletes of the same record.

use crate::assertions::{assert_converged, assert_tombstone_everywhere};
use crate::harness::{fields, Fleet};
use casesync_types::{EntityType, RecordId};
use serde_json::json;

async fn shared_record(fleet: &Fleet) {
    fleet
        .device(0)
        .create(EntityType::CaseRecord, "c1", fields([("status", json!("open"))]))
        .await
        .unwrap();
    fleet.tick();
    fleet.settle(4).await.unwrap();
}

/// Both devices edit offline; the later local edit still loses to the
/// higher remote version written by the first push.
#[tokio::test]
async fn higher_version_beats_later_edit() {
    let fleet = Fleet::new(&["x", "y"]);
    shared_record(&fleet).await;
    let (x, y) = (fleet.device(0), fleet.device(1));

    x.edit(EntityType::CaseRecord, "c1", fields([("status", json!("review"))]))
        .await
        .unwrap();
    fleet.tick();
    y.edit(EntityType::CaseRecord, "c1", fields([("status", json!("closed"))]))
        .await
        .unwrap();
    fleet.tick();

    x.sync().await.unwrap();
    let remote = fleet
        .remote()
        .peek(EntityType::CaseRecord, &RecordId::new("c1").unwrap())
        .unwrap();
    assert_eq!(remote.version, 1);

    let report = y.sync().await.unwrap();
    let (_, pushed) = report
        .pushed
        .iter()
        .find(|(entity, _)| *entity == EntityType::CaseRecord)
        .unwrap();
    assert_eq!(pushed.superseded, 1);
    assert_eq!(pushed.written, 0);

    let local = y.record(EntityType::CaseRecord, "c1").await.unwrap().unwrap();
    assert!(!local.is_dirty);
    assert_eq!(local.version, 1);
    assert_eq!(local.fields["status"], json!("review"));

    fleet.settle(4).await.unwrap();
    let result = assert_converged(
        &fleet.states(EntityType::CaseRecord),
        &fleet.remote().snapshot(EntityType::CaseRecord),
    );
    assert!(result.passed, "{:?}", result.failure_details);
}

/// An edit made after pulling the winner pushes cleanly.
#[tokio::test]
async fn loser_can_edit_again_after_pull() {
    let fleet = Fleet::new(&["x", "y"]);
    shared_record(&fleet).await;
    let (x, y) = (fleet.device(0), fleet.device(1));

    x.edit(EntityType::CaseRecord, "c1", fields([("status", json!("review"))]))
        .await
        .unwrap();
    y.edit(EntityType::CaseRecord, "c1", fields([("status", json!("closed"))]))
        .await
        .unwrap();
    fleet.tick();
    x.sync().await.unwrap();
    fleet.tick();
    y.sync().await.unwrap();
    fleet.tick();

    y.edit(EntityType::CaseRecord, "c1", fields([("status", json!("closed"))]))
        .await
        .unwrap();
    fleet.tick();
    y.sync().await.unwrap();

    let remote = fleet
        .remote()
        .peek(EntityType::CaseRecord, &RecordId::new("c1").unwrap())
        .unwrap();
    assert_eq!(remote.version, 2);
    assert_eq!(remote.fields["status"], json!("closed"));

    fleet.settle(4).await.unwrap();
    let x_view = x.record(EntityType::CaseRecord, "c1").await.unwrap().unwrap();
    assert_eq!(x_view.fields["status"], json!("closed"));
}

/// Two devices create the same id offline; the first push wins.
#[tokio::test]
async fn concurrent_creation_keeps_first_push() {
    let fleet = Fleet::new(&["x", "y"]);
    let (x, y) = (fleet.device(0), fleet.device(1));
    x.create(EntityType::Event, "e1", fields([("title", json!("Football"))]))
        .await
        .unwrap();
    y.create(EntityType::Event, "e1", fields([("title", json!("Chess"))]))
        .await
        .unwrap();
    fleet.tick();

    fleet.settle(4).await.unwrap();

    let remote = fleet.remote().snapshot(EntityType::Event);
    assert_eq!(remote.len(), 1);
    assert_eq!(remote[0].fields["title"], json!("Football"));
    let result = assert_converged(&fleet.states(EntityType::Event), &remote);
    assert!(result.passed, "{:?}", result.failure_details);
}

/// A delete pushed first wins over a concurrent edit.
#[tokio::test]
async fn delete_pushed_first_wins() {
    let fleet = Fleet::new(&["x", "y"]);
    shared_record(&fleet).await;
    let (x, y) = (fleet.device(0), fleet.device(1));

    x.delete(EntityType::CaseRecord, "c1").await.unwrap();
    y.edit(EntityType::CaseRecord, "c1", fields([("status", json!("closed"))]))
        .await
        .unwrap();
    fleet.tick();

    fleet.settle(4).await.unwrap();

    let id = RecordId::new("c1").unwrap();
    let result = assert_tombstone_everywhere(&fleet.states(EntityType::CaseRecord), &id);
    assert!(result.passed, "{:?}", result.failure_details);
}

/// An edit pushed first wins over a concurrent delete.
#[tokio::test]
async fn edit_pushed_first_survives_delete() {
    let fleet = Fleet::new(&["x", "y"]);
    shared_record(&fleet).await;
    let (x, y) = (fleet.device(0), fleet.device(1));

    x.delete(EntityType::CaseRecord, "c1").await.unwrap();
    y.edit(EntityType::CaseRecord, "c1", fields([("status", json!("closed"))]))
        .await
        .unwrap();
    fleet.tick();

    y.sync().await.unwrap();
    fleet.tick();
    fleet.settle(4).await.unwrap();

    for device in fleet.devices() {
        let record = device.record(EntityType::CaseRecord, "c1").await.unwrap().unwrap();
        assert!(!record.is_deleted, "{} should keep c1 alive", device.name());
        assert_eq!(record.deleted_at, None);
        assert_eq!(record.fields["status"], json!("closed"));
    }
}
