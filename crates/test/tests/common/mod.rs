#![allow(dead_code)]

//! Shared helpers for the integration tests.
//!
//! Every test builds its own [`MockCluster`] and runs whole test cases against
//! it on paused tokio time, so multi-minute timelines finish instantly.

use chaosbed_engine::{Cluster, EngineConfig, TestCase, TestCaseOutcome};
use chaosbed_test_support::MockCluster;
use chaosbed_types::Scenario;

/// Short windows so failing cases do not wait out the production defaults.
pub(crate) fn config() -> EngineConfig {
    EngineConfig {
        heal_timeout_secs: 30,
        liveness_window_secs: 15,
        join_timeout_secs: 10,
        ..Default::default()
    }
}

pub(crate) async fn run_case(mock: &MockCluster, scenario: Scenario) -> TestCaseOutcome {
    TestCase::new(scenario, Cluster::new(mock.handles()), config()).run().await
}

/// Asserts that no member is left stopped, partitioned or delayed.
#[track_caller]
pub(crate) fn assert_restored(mock: &MockCluster, size: u32) {
    use chaosbed_client::NodeHandle;

    for id in 0..size {
        let node = mock.node(id);
        assert!(node.disruption().is_clear(), "node {id} left disrupted: {:?}", node.disruption());
    }
}
