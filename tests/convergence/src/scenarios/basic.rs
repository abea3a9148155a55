//! Offline creation, fan-out and paging.

use crate::assertions::{assert_converged, assert_no_dirty};
use crate::harness::{fields, Fleet};
use casesync_client::{EngineConfig, MemoryRemoteStore, PullConfig, StopSignal};
use casesync_core::StopReason;
use casesync_types::{EntityType, RecordId};
use serde_json::json;

/// Offline creation is pushed as version 0 and marked clean.
#[tokio::test]
async fn offline_create_is_pushed_and_cleaned() {
    let fleet = Fleet::new(&["tablet"]);
    let tablet = fleet.device(0);
    tablet
        .create(EntityType::CaseRecord, "c1", fields([("name", json!("Ana"))]))
        .await
        .unwrap();

    tablet.sync().await.unwrap();

    let doc = fleet
        .remote()
        .peek(EntityType::CaseRecord, &RecordId::new("c1").unwrap())
        .expect("remote should hold c1");
    assert_eq!(doc.version, 0);
    assert_eq!(doc.fields["name"], json!("Ana"));

    let local = tablet.record(EntityType::CaseRecord, "c1").await.unwrap().unwrap();
    assert!(!local.is_dirty);
    assert_eq!(local.version, 0);
    assert_eq!(local.updated_at, doc.updated_at);
}

/// Records created on several devices reach every device.
#[tokio::test]
async fn edits_fan_out_to_every_device() {
    let fleet = Fleet::new(&["a", "b", "c"]);
    for (i, device) in fleet.devices().iter().enumerate() {
        for n in 0..5 {
            device
                .create(
                    EntityType::Event,
                    &format!("{}-{n}", device.name()),
                    fields([("seq", json!(i * 10 + n))]),
                )
                .await
                .unwrap();
            fleet.tick();
        }
    }

    fleet.settle(4).await.unwrap();

    let states = fleet.states(EntityType::Event);
    let remote = fleet.remote().snapshot(EntityType::Event);
    assert_eq!(remote.len(), 15);
    let result = assert_converged(&states, &remote);
    assert!(result.passed, "{:?}", result.failure_details);
    let result = assert_no_dirty(&states);
    assert!(result.passed, "{:?}", result.failure_details);
}

/// Entity types replicate independently.
#[tokio::test]
async fn entity_types_do_not_mix() {
    let fleet = Fleet::new(&["a", "b"]);
    let a = fleet.device(0);
    a.create(EntityType::AssessmentQuestion, "q1", fields([("text", json!("Sleeps well?"))]))
        .await
        .unwrap();
    a.create(EntityType::AssessmentAnswer, "q1", fields([("value", json!(true))]))
        .await
        .unwrap();

    fleet.settle(4).await.unwrap();

    let b = fleet.device(1);
    let question = b.record(EntityType::AssessmentQuestion, "q1").await.unwrap().unwrap();
    let answer = b.record(EntityType::AssessmentAnswer, "q1").await.unwrap().unwrap();
    assert_eq!(question.fields["text"], json!("Sleeps well?"));
    assert_eq!(answer.fields["value"], json!(true));
    assert!(b.record(EntityType::Event, "q1").await.unwrap().is_none());
}

/// 1,200 remote records with pages of 500 take exactly three pages.
#[tokio::test]
async fn large_backlog_pulls_in_three_pages() {
    let config = EngineConfig {
        pull: PullConfig {
            page_size: 500,
            max_pages: 50,
            ..PullConfig::default()
        },
        ..EngineConfig::default()
    };
    let fleet = Fleet::with_config(&["writer", "reader"], config, MemoryRemoteStore::new());
    let writer = fleet.device(0);
    for n in 0..1200 {
        writer
            .create(EntityType::Attendance, &format!("att-{n:04}"), fields([("present", json!(true))]))
            .await
            .unwrap();
    }
    writer
        .engine()
        .push(EntityType::Attendance, &StopSignal::new())
        .await
        .unwrap();
    assert_eq!(fleet.remote().snapshot(EntityType::Attendance).len(), 1200);

    let served_before = fleet.remote().pages_served();
    let report = fleet
        .device(1)
        .engine()
        .pull(EntityType::Attendance, &StopSignal::new())
        .await
        .unwrap();

    assert_eq!(report.pages, 3);
    assert_eq!(report.applied, 1200);
    assert_eq!(report.stop_reason, Some(StopReason::ShortPage));
    assert_eq!(fleet.remote().pages_served() - served_before, 3);

    let newest = fleet
        .remote()
        .snapshot(EntityType::Attendance)
        .into_iter()
        .max_by(|a, b| (a.updated_at, &a.id).cmp(&(b.updated_at, &b.id)))
        .unwrap();
    let cursor = report.cursor.unwrap();
    assert_eq!(cursor.updated_at, newest.updated_at);
    assert_eq!(cursor.id, newest.id);
}
