//! Outcome records of a single test case run.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::scenario::Scenario;

/// Verdict and phase markers of a test case.
///
/// Fields are filled in as the phases complete; a field left `None` means the
/// run never reached the corresponding phase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TestCaseResult {
    pub passed: bool,
    pub start_height: u64,
    pub height_before_recovery: Option<u64>,
    pub height_after_recovery: Option<u64>,
    pub start_time: Option<SystemTime>,
    pub recover_start_time: Option<SystemTime>,
    pub recover_end_time: Option<SystemTime>,
}

/// Snapshot persisted for post-mortem analysis when a case fails.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FailureContext {
    #[serde(flatten)]
    pub scenario: Scenario,
    pub testcase_start_time: u64,
    pub testcase_start_height: u64,
    pub testcase_end_height: u64,
    pub testcase_end_time: u64,
    /// `"<index>:<host>"` for every member.
    pub ip_mapping: Vec<String>,
}

impl FailureContext {
    pub fn new(
        scenario: Scenario,
        start_time: SystemTime,
        start_height: u64,
        end_height: u64,
        end_time: SystemTime,
        ip_mapping: Vec<String>,
    ) -> Self {
        Self {
            scenario,
            testcase_start_time: unix_secs(start_time),
            testcase_start_height: start_height,
            testcase_end_height: end_height,
            testcase_end_time: unix_secs(end_time),
            ip_mapping,
        }
    }
}

/// Seconds since the unix epoch, clamped to zero for pre-epoch clocks.
pub fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or_default()
}
