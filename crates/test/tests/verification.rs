//! Balance accounting and liveness timing through whole test cases.

mod common;

use std::time::Duration;

use alloy_primitives::U256;
use chaosbed_client::NodeHandle;
use chaosbed_engine::{Cluster, TestCase};
use chaosbed_test_support::{MockCluster, fixtures::scenario, mock_cluster::INITIAL_BALANCE};
use chaosbed_types::NodeId;
use common::{config, run_case};
use serial_test::serial;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
#[serial]
async fn self_transfer_only_costs_fees() -> color_eyre::Result<()> {
    let mock = MockCluster::new(4).with_fees();
    let mut s = scenario("TC-20: self transfer", &[], vec![], 5, 1_000, true);
    s.workload.receiver_id = NodeId::new(0);

    let outcome = run_case(&mock, s).await;
    assert!(outcome.passed(), "failed: {:?}", outcome.failure);
    assert!(mock.balance(mock.node(0).address()) < U256::from(INITIAL_BALANCE));
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn fees_are_charged_to_the_sender_only() -> color_eyre::Result<()> {
    let mock = MockCluster::new(4).with_fees();
    let s = scenario("TC-21: fees", &[], vec![], 5, 7, true);

    let outcome = run_case(&mock, s).await;
    assert!(outcome.passed(), "failed: {:?}", outcome.failure);
    let report = outcome.report.expect("report");
    assert_eq!(report.delivered, U256::from(report.mined * 7));
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn healthy_case_does_not_wait_out_the_windows() -> color_eyre::Result<()> {
    let mock = MockCluster::new(4);
    let s = scenario("TC-22: idle", &[], vec![], 5, 1, true);

    let began = Instant::now();
    let outcome = TestCase::new(s, Cluster::new(mock.handles()), config()).run().await;
    assert!(outcome.passed(), "failed: {:?}", outcome.failure);

    // Workload, one liveness sample, the safety rounds and a quick convergence.
    let window = Duration::from_secs(config().liveness_window_secs);
    assert!(began.elapsed() < Duration::from_secs(5) + window);
    Ok(())
}
