//! Leader failover: the standby takes over, recovers durable state, and
//! completes in-flight ops without duplicate id assignment.

mod common;

use common::*;
use tablens::nameserver::oplog::{TaskStatus, TaskType};
use tablens::Error;

const TABLET: &str = "10.0.0.1:9090";

#[tokio::test]
async fn test_standby_completes_inflight_op() {
    let harness = TestHarness::new();
    let _tablet_session = harness.register_tablet(TABLET).await;

    let (ns_a, coord_a) = harness.start_nameserver("ns-a");
    wait_until(|| ns_a.is_running(), "a leads").await;
    wait_until(|| ns_a.show_tablet().len() == 1, "tablet visible to a").await;

    ns_a.create_table(one_partition_meta("t1", TABLET))
        .await
        .unwrap();
    settle_create_table_op(&harness, &ns_a, TABLET).await;

    // op 3 goes in flight and is left incomplete on a
    let op_id = ns_a.make_snapshot("t1", 0).await.unwrap();
    let tablet = harness.factory.get(TABLET);
    wait_until(|| tablet.snapshot_calls() > 0, "op in flight").await;

    let (ns_b, _coord_b) = harness.start_nameserver("ns-b");
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(!ns_b.is_running(), "b must stay standby while a holds the lock");

    // a's session drops: a demotes, b takes over and recovers
    coord_a.expire_session();
    wait_until(|| !ns_a.is_running(), "a demoted").await;
    wait_until(|| ns_b.is_running(), "b leads").await;

    let summary = ns_b.status_summary();
    assert_eq!(summary.nb_tables, 1);
    wait_until(|| ns_b.status_summary().nb_ops == 1, "op recovered by b").await;

    // indices survived the transition
    assert_eq!(
        harness
            .read_node(&harness.paths().op_index_node())
            .await
            .unwrap(),
        op_id.to_string().as_bytes()
    );

    // the tablet reports done; b drains and reaps the op
    tablet.report(op_id, TaskType::MakeSnapshot, TaskStatus::Done);
    wait_until(|| ns_b.status_summary().nb_ops == 0, "op completed by b").await;
    assert!(matches!(
        harness.read_node(&harness.paths().op_node(op_id)).await,
        Err(Error::NodeNotFound(_))
    ));
    assert!(tablet.deletions().iter().any(|ids| ids == &vec![op_id]));

    // id assignment continues monotonically on the new leader
    let next = ns_b.make_snapshot("t1", 0).await.unwrap();
    assert_eq!(next, op_id + 1);
}

#[tokio::test]
async fn test_demoted_leader_rejects_admin_rpcs() {
    let harness = TestHarness::new();
    let _tablet_session = harness.register_tablet(TABLET).await;

    let (ns_a, coord_a) = harness.start_nameserver("ns-a");
    wait_until(|| ns_a.is_running(), "a leads").await;

    coord_a.expire_session();
    wait_until(|| !ns_a.is_running(), "a demoted").await;

    assert!(matches!(
        ns_a.make_snapshot("t1", 0).await,
        Err(Error::NotLeader)
    ));
    assert!(matches!(
        ns_a.create_table(one_partition_meta("t1", TABLET)).await,
        Err(Error::NotLeader)
    ));
}
