//! Whole test cases driven through every kind of disaster step.

mod common;

use alloy_primitives::U256;
use chaosbed_client::NodeHandle;
use chaosbed_engine::TestCaseState;
use chaosbed_test_support::{
    MockCluster,
    fixtures::{connect, delay, disconnect, redeploy, scenario, start, stop, undelay},
    mock_cluster::INITIAL_BALANCE,
};
use common::{assert_restored, run_case};
use serial_test::serial;

#[tokio::test(start_paused = true)]
#[serial]
async fn crash_and_restart_one_node() -> color_eyre::Result<()> {
    let mock = MockCluster::new(4);
    let s = scenario("TC-1: crash node 2", &[2], vec![stop(2, &[2]), start(8, &[2])], 10, 100, true);

    let outcome = run_case(&mock, s).await;
    assert!(outcome.passed(), "failed: {:?}", outcome.failure);
    assert_eq!(outcome.state, TestCaseState::Passed);

    let result = &outcome.result;
    let before = result.height_before_recovery.expect("height before recovery");
    let after = result.height_after_recovery.expect("height after recovery");
    assert!(after >= before);
    assert!(result.recover_end_time >= result.recover_start_time);

    let report = outcome.report.expect("report for a passed case");
    assert!(report.mined > 0);
    assert!(report.mined <= report.sent);
    assert_eq!(report.delivered, U256::from(report.mined) * U256::from(100));

    let sender = mock.node(0).address();
    let receiver = mock.node(1).address();
    // Transfers still pending at verification time get mined during recovery.
    assert!(mock.balance(receiver) >= U256::from(INITIAL_BALANCE) + report.delivered);
    assert!(mock.balance(sender) <= U256::from(INITIAL_BALANCE) - report.delivered);

    assert_eq!(mock.node(2).calls(), vec!["stop", "start"]);
    assert_restored(&mock, 4);
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn partition_and_heal() -> color_eyre::Result<()> {
    let mock = MockCluster::new(4);
    let s = scenario(
        "TC-2: partition 0 from 3",
        &[],
        vec![disconnect(2, &[(0, 3)]), connect(6, &[(0, 3)])],
        8,
        1,
        true,
    );

    let outcome = run_case(&mock, s).await;
    assert!(outcome.passed(), "failed: {:?}", outcome.failure);
    assert_eq!(mock.node(0).calls(), vec!["disconnect 10.0.0.4", "connect 10.0.0.4"]);
    assert!(mock.node(3).calls().is_empty());
    assert_eq!(outcome.scheduler.fired, 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn delay_and_restore_links() -> color_eyre::Result<()> {
    let mock = MockCluster::new(4);
    let s = scenario(
        "TC-3: slow links",
        &[],
        vec![delay(1, &[1, 3], 250.0), undelay(5, &[1, 3])],
        6,
        10,
        true,
    );

    let outcome = run_case(&mock, s).await;
    assert!(outcome.passed(), "failed: {:?}", outcome.failure);
    for id in [1, 3] {
        assert_eq!(mock.node(id).calls(), vec!["delay", "undelay"]);
        assert!(mock.node(id).latency().is_none());
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn redeploy_restarts_the_chain() -> color_eyre::Result<()> {
    let mock = MockCluster::new(4);
    let mut s = scenario("TC-4: redeploy", &[], vec![redeploy(3)], 8, 5, true);
    s.redeploy = true;

    let outcome = run_case(&mock, s).await;
    assert!(outcome.passed(), "failed: {:?}", outcome.failure);
    for id in 0..4 {
        assert_eq!(mock.node(id).calls(), vec!["redeploy"]);
    }

    // Transfers mined before the redeploy are gone with the old chain.
    let report = outcome.report.expect("report");
    assert!(report.mined < report.sent);
    assert!(mock.balance(mock.node(1).address()) >= U256::from(INITIAL_BALANCE) + report.delivered);
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn quorum_loss_is_an_expected_halt() -> color_eyre::Result<()> {
    let mock = MockCluster::new(4);
    let s = scenario("TC-5: lose quorum", &[2, 3], vec![stop(0, &[2, 3])], 4, 1, false);

    let outcome = run_case(&mock, s).await;
    assert!(outcome.passed(), "failed: {:?}", outcome.failure);
    assert_restored(&mock, 4);
    Ok(())
}
