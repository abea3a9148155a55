//! Remote outages, rejected batches and poison records.

use crate::assertions::{assert_converged, assert_no_dirty};
use crate::harness::{fields, Fleet, HarnessError};
use casesync_client::{EngineConfig, LocalStore, MemoryRemoteStore, PushConfig, RemoteError};
use casesync_types::{EntityType, RecordId};
use serde_json::json;

/// Changes made during an outage stay dirty and converge afterwards.
#[tokio::test]
async fn outage_keeps_changes_until_reconnect() {
    let fleet = Fleet::new(&["a", "b"]);
    let a = fleet.device(0);
    for n in 0..3 {
        a.create(EntityType::Event, &format!("e{n}"), fields([("n", json!(n))]))
            .await
            .unwrap();
    }

    fleet.remote().set_offline(true);
    let err = a.sync().await.unwrap_err();
    assert!(matches!(err, HarnessError::Pipeline { .. }));
    assert_eq!(a.dirty_count().await.unwrap(), 3);
    assert!(fleet.remote().snapshot(EntityType::Event).is_empty());

    fleet.remote().set_offline(false);
    fleet.tick();
    fleet.settle(4).await.unwrap();

    let states = fleet.states(EntityType::Event);
    let result = assert_converged(&states, &fleet.remote().snapshot(EntityType::Event));
    assert!(result.passed, "{:?}", result.failure_details);
}

/// A timed-out batch is retried without duplicating records.
#[tokio::test]
async fn failed_batch_is_retried_whole() {
    let fleet = Fleet::new(&["a", "b"]);
    let a = fleet.device(0);
    a.create(EntityType::Attendance, "t1", fields([("present", json!(true))]))
        .await
        .unwrap();
    a.create(EntityType::Attendance, "t2", fields([("present", json!(false))]))
        .await
        .unwrap();

    fleet.remote().fail_next_write(RemoteError::Timeout);
    assert!(a.sync().await.is_err());
    assert_eq!(fleet.remote().ops_written(), 0);

    fleet.tick();
    fleet.settle(4).await.unwrap();
    assert_eq!(fleet.remote().ops_written(), 2);

    let docs = fleet.remote().snapshot(EntityType::Attendance);
    assert_eq!(docs.len(), 2);
    assert!(docs.iter().all(|doc| doc.version == 0));
}

/// A record the remote keeps rejecting is quarantined without blocking
/// the rest, and pushes once released.
#[tokio::test]
async fn poison_record_is_quarantined_then_released() {
    let config = EngineConfig {
        push: PushConfig {
            max_push_failures: 2,
            ..PushConfig::default()
        },
        ..EngineConfig::default()
    };
    let fleet = Fleet::with_config(&["a", "b"], config, MemoryRemoteStore::new());
    let a = fleet.device(0);
    let poison = RecordId::new("c-bad").unwrap();
    fleet.remote().poison(poison.clone());

    a.create(EntityType::CaseRecord, "c-bad", fields([("name", json!("?"))]))
        .await
        .unwrap();
    a.create(EntityType::CaseRecord, "c-good", fields([("name", json!("Bo"))]))
        .await
        .unwrap();

    a.sync().await.unwrap();
    assert!(fleet
        .remote()
        .peek(EntityType::CaseRecord, &RecordId::new("c-good").unwrap())
        .is_some());
    assert!(a.local().list_quarantined(EntityType::CaseRecord).await.unwrap().is_empty());

    fleet.tick();
    a.sync().await.unwrap();
    let quarantined = a.local().list_quarantined(EntityType::CaseRecord).await.unwrap();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].id, poison);
    assert_eq!(quarantined[0].failures, 2);

    // Quarantined records are skipped, so further runs succeed.
    fleet.tick();
    let report = a.sync().await.unwrap();
    assert!(report.pushed.iter().all(|(_, r)| r.written == 0 && r.rejected == 0));

    fleet.remote().cure(&poison);
    assert!(a
        .local()
        .release_quarantine(EntityType::CaseRecord, &poison)
        .await
        .unwrap());
    fleet.tick();
    fleet.settle(4).await.unwrap();

    let states = fleet.states(EntityType::CaseRecord);
    let result = assert_no_dirty(&states);
    assert!(result.passed, "{:?}", result.failure_details);
    let result = assert_converged(&states, &fleet.remote().snapshot(EntityType::CaseRecord));
    assert!(result.passed, "{:?}", result.failure_details);
}

/// A push that committed remotely but never marked clean is recognized
/// as an echo on the next run instead of being written again.
#[tokio::test]
async fn lost_mark_clean_is_confirmed_not_rewritten() {
    let fleet = Fleet::new(&["a"]);
    let a = fleet.device(0);
    a.create(EntityType::Event, "e1", fields([("title", json!("Trip"))]))
        .await
        .unwrap();
    a.local().fail_next_mark_pushed("disk full");

    assert!(a.sync().await.is_err());
    assert_eq!(fleet.remote().ops_written(), 1);
    assert_eq!(a.dirty_count().await.unwrap(), 1);

    fleet.tick();
    let report = a.sync().await.unwrap();
    let (_, pushed) = report
        .pushed
        .iter()
        .find(|(entity, _)| *entity == EntityType::Event)
        .unwrap();
    assert_eq!(pushed.confirmed, 1);
    assert_eq!(pushed.written, 0);
    assert_eq!(fleet.remote().ops_written(), 1);
    assert_eq!(a.dirty_count().await.unwrap(), 0);
}
