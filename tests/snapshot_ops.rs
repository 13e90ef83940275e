//! Snapshot operations end to end: validation, driving, reaping.

mod common;

use common::*;
use tablens::nameserver::oplog::{TaskStatus, TaskType};
use tablens::nameserver::registry::TabletState;
use tablens::Error;

const TABLET: &str = "10.0.0.1:9090";

async fn leader_with_table() -> (
    TestHarness,
    std::sync::Arc<tablens::NameServer>,
    tablens::coord::MemoryCoordClient,
) {
    let harness = TestHarness::new();
    let tablet_session = harness.register_tablet(TABLET).await;
    let (ns, _coord) = harness.start_nameserver("ns1");
    wait_until(|| ns.is_running(), "leadership acquired").await;
    wait_until(|| ns.show_tablet().len() == 1, "tablet visible").await;
    ns.create_table(one_partition_meta("t1", TABLET))
        .await
        .unwrap();
    settle_create_table_op(&harness, &ns, TABLET).await;
    (harness, ns, tablet_session)
}

#[tokio::test]
async fn test_snapshot_of_offline_tablet_is_rejected() {
    let harness = TestHarness::new();
    let session = harness.register_tablet(TABLET).await;
    let (ns, _coord) = harness.start_nameserver("ns1");
    wait_until(|| ns.is_running(), "leadership acquired").await;
    wait_until(|| ns.show_tablet().len() == 1, "tablet visible").await;
    ns.create_table(one_partition_meta("t1", TABLET))
        .await
        .unwrap();
    settle_create_table_op(&harness, &ns, TABLET).await;

    session.expire_session();
    wait_until(
        || ns.show_tablet()[0].state == TabletState::Offline,
        "tablet offline",
    )
    .await;

    let err = ns.make_snapshot("t1", 0).await.unwrap_err();
    assert!(matches!(err, Error::TabletOffline(_)));

    // the op counter did not move
    assert_eq!(
        harness
            .read_node(&harness.paths().op_index_node())
            .await
            .unwrap(),
        b"2"
    );
}

#[tokio::test]
async fn test_snapshot_happy_path_through_reap() {
    let (harness, ns, _tablet_session) = leader_with_table().await;
    let tablet = harness.factory.get(TABLET);

    let op_id = ns.make_snapshot("t1", 0).await.unwrap();
    assert_eq!(op_id, 3);

    // the driver submits the tablet-side call; the durable record holds
    // the in-flight task
    wait_until(|| tablet.snapshot_calls() > 0, "snapshot submitted").await;
    assert_eq!(tablet.snapshots.lock().unwrap()[0], (1, 0));
    assert!(harness
        .read_node(&harness.paths().op_node(op_id))
        .await
        .is_ok());

    // the tablet reports done: the op drains, every healthy tablet is told
    // to forget it, and the durable record goes away
    tablet.report(op_id, TaskType::MakeSnapshot, TaskStatus::Done);
    wait_until(|| ns.status_summary().nb_ops == 0, "op drained").await;
    assert!(matches!(
        harness.read_node(&harness.paths().op_node(op_id)).await,
        Err(Error::NodeNotFound(_))
    ));
    assert!(tablet.deletions().iter().any(|ids| ids == &vec![op_id]));
}

#[tokio::test]
async fn test_replayed_status_reports_are_ignored_after_completion() {
    let (harness, ns, _tablet_session) = leader_with_table().await;
    let tablet = harness.factory.get(TABLET);

    let op_id = ns.make_snapshot("t1", 0).await.unwrap();
    wait_until(|| tablet.snapshot_calls() > 0, "snapshot submitted").await;
    tablet.report(op_id, TaskType::MakeSnapshot, TaskStatus::Done);
    wait_until(|| ns.status_summary().nb_ops == 0, "op drained").await;

    // a stale report for the reaped op resurfaces: ignored, nothing comes back
    tablet.report(op_id, TaskType::MakeSnapshot, TaskStatus::Done);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(ns.status_summary().nb_ops, 0);
    assert!(matches!(
        harness.read_node(&harness.paths().op_node(op_id)).await,
        Err(Error::NodeNotFound(_))
    ));
}

#[tokio::test]
async fn test_failed_snapshot_holds_the_op() {
    let (harness, ns, _tablet_session) = leader_with_table().await;
    let tablet = harness.factory.get(TABLET);

    let op_id = ns.make_snapshot("t1", 0).await.unwrap();
    wait_until(|| tablet.snapshot_calls() > 0, "snapshot submitted").await;
    tablet.report(op_id, TaskType::MakeSnapshot, TaskStatus::Failed);

    // the op neither advances nor gets reaped
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(ns.status_summary().nb_ops, 1);
    assert!(harness
        .read_node(&harness.paths().op_node(op_id))
        .await
        .is_ok());
}
