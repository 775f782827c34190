//! Failing test cases: every one must leave the cluster restored and a
//! failure context behind.

mod common;

use std::time::Duration;

use chaosbed_engine::{FailureReason, TestCaseState, VerificationError};
use chaosbed_test_support::{
    MockCluster,
    fixtures::{disconnect, scenario, stop},
};
use chaosbed_types::{NodeId, ScenarioError};
use common::{assert_restored, config, run_case};
use serial_test::serial;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
#[serial]
async fn diverging_node_is_a_safety_violation() -> color_eyre::Result<()> {
    let mock = MockCluster::new(4);
    mock.node(2).fork();
    let s = scenario("TC-10: fork", &[], vec![], 3, 1, true);

    let outcome = run_case(&mock, s).await;
    match outcome.failure {
        Some(FailureReason::Verification(VerificationError::SafetyViolation { node, .. })) => {
            assert_eq!(node, NodeId::new(2));
        }
        other => panic!("expected a safety violation, got {other:?}"),
    }
    assert_eq!(outcome.state, TestCaseState::Failed);
    assert!(outcome.context.is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn stalled_chain_fails_after_the_full_window() -> color_eyre::Result<()> {
    let mock = MockCluster::new(4);
    let s = scenario("TC-11: stall", &[2, 3], vec![stop(1, &[2, 3])], 3, 1, true);

    let began = Instant::now();
    let outcome = run_case(&mock, s).await;
    assert!(matches!(
        outcome.failure,
        Some(FailureReason::Verification(VerificationError::Stalled { .. }))
    ));
    let window = Duration::from_secs(config().liveness_window_secs);
    assert!(began.elapsed() >= window);

    // Teardown restarted the crashed nodes and the chain caught up.
    assert_restored(&mock, 4);
    assert!(outcome.result.recover_end_time.is_some());
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn partition_left_behind_is_healed() -> color_eyre::Result<()> {
    let mock = MockCluster::new(4);
    // Production continues through a partition, so a halt expectation fails.
    let s = scenario("TC-12: no halt", &[], vec![disconnect(1, &[(1, 2)])], 3, 1, false);

    let outcome = run_case(&mock, s).await;
    assert!(matches!(
        outcome.failure,
        Some(FailureReason::Verification(VerificationError::UnexpectedProduction { .. }))
    ));
    assert_eq!(mock.node(1).calls(), vec!["disconnect 10.0.0.3", "connect 10.0.0.3"]);
    assert_restored(&mock, 4);

    let context = outcome.context.expect("failure context");
    assert_eq!(context.scenario.name, "TC-12: no halt");
    assert!(context.testcase_end_height >= context.testcase_start_height);
    assert_eq!(context.ip_mapping, vec!["0:10.0.0.1", "1:10.0.0.2", "2:10.0.0.3", "3:10.0.0.4"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn unreachable_node_never_converges() -> color_eyre::Result<()> {
    let mock = MockCluster::new(4);
    mock.node(3).set_unreachable(true);
    let s = scenario("TC-13: lagging node", &[], vec![], 3, 1, true);

    let outcome = run_case(&mock, s).await;
    let timeout = Duration::from_secs(config().heal_timeout_secs);
    assert_eq!(outcome.failure, Some(FailureReason::ConvergenceTimeout(timeout)));
    assert!(outcome.result.height_after_recovery.is_none());
    assert!(outcome.report.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn stopping_a_protected_node_is_rejected() -> color_eyre::Result<()> {
    let mock = MockCluster::new(4);
    let s = scenario("TC-14: bad targets", &[1], vec![stop(1, &[1, 2])], 3, 1, true);

    let outcome = run_case(&mock, s).await;
    assert!(matches!(
        outcome.failure,
        Some(FailureReason::InvalidScenario(ScenarioError::StopTargetNotCrashNode { .. }))
    ));
    for id in 0..4 {
        assert!(mock.node(id).calls().is_empty());
    }
    assert!(outcome.result.recover_start_time.is_none());
    Ok(())
}

#[tokio::test(start_paused = true)]
#[serial]
async fn node_refusing_to_start_fails_recovery() -> color_eyre::Result<()> {
    let mock = MockCluster::new(4);
    mock.node(3).fail_operation("start");
    let s = scenario("TC-15: stuck node", &[3], vec![stop(1, &[3])], 3, 1, true);

    let outcome = run_case(&mock, s).await;
    assert_eq!(outcome.failure, Some(FailureReason::RecoveryFailed));
    assert!(outcome.result.recover_start_time.is_some());
    assert!(outcome.result.recover_end_time.is_none());
    assert!(!mock.node(3).is_running());
    Ok(())
}
