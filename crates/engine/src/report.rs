//! Statistics of completed test cases and of a playbook run.

use core::fmt;
use std::time::{Duration, SystemTime};

use alloy_primitives::U256;
use chaosbed_types::{Scenario, TestCaseResult, result::unix_secs};
use tracing::info;

use crate::{verifier::BalanceReport, workload::WorkloadStats};

/// Timings, heights and throughput of one finished test case.
#[derive(Clone, Debug, PartialEq)]
pub struct TestCaseReport {
    pub name: String,
    pub start_time: SystemTime,
    pub recover_start_time: SystemTime,
    pub recover_end_time: SystemTime,
    pub start_height: u64,
    pub height_before_recovery: u64,
    pub height_after_recovery: u64,
    pub tx_start_time: SystemTime,
    pub tx_end_time: SystemTime,
    pub tx_start_height: u64,
    pub tx_end_height: u64,
    pub sent: usize,
    pub mined: usize,
    pub delivered: U256,
}

fn elapsed(from: SystemTime, to: SystemTime) -> Duration {
    to.duration_since(from).unwrap_or_default()
}

fn per_second(blocks: u64, over: Duration) -> f64 {
    if over.is_zero() { 0.0 } else { blocks as f64 / over.as_secs_f64() }
}

impl TestCaseReport {
    /// `None` unless the case went all the way through recovery.
    pub fn new(
        scenario: &Scenario,
        result: &TestCaseResult,
        workload: &WorkloadStats,
        balance: Option<&BalanceReport>,
    ) -> Option<Self> {
        let mut report = Self {
            name: scenario.name.clone(),
            start_time: result.start_time?,
            recover_start_time: result.recover_start_time?,
            recover_end_time: result.recover_end_time?,
            start_height: result.start_height,
            height_before_recovery: result.height_before_recovery?,
            height_after_recovery: result.height_after_recovery?,
            tx_start_time: workload.start_time,
            tx_end_time: workload.end_time,
            tx_start_height: workload.start_height,
            tx_end_height: workload.end_height,
            sent: workload.sent,
            mined: balance.map(|b| b.mined).unwrap_or_default(),
            delivered: balance.map(|b| b.delta).unwrap_or_default(),
        };

        // A redeployed chain restarts from genesis.
        if report.tx_start_height > report.tx_end_height {
            info!(name = %report.name, "Blockchain was re-initialised during the workload");
            report.tx_start_height = 0;
        }
        if report.start_height > report.height_after_recovery {
            info!(name = %report.name, "Blockchain was re-initialised during the test case");
            report.start_height = 0;
        }
        Some(report)
    }

    pub fn case_duration(&self) -> Duration {
        elapsed(self.start_time, self.recover_start_time)
    }

    pub fn recovery_duration(&self) -> Duration {
        elapsed(self.recover_start_time, self.recover_end_time)
    }

    pub fn tx_duration(&self) -> Duration {
        elapsed(self.tx_start_time, self.tx_end_time)
    }

    /// Blocks per second over the whole case, recovery included.
    pub fn block_rate(&self) -> f64 {
        per_second(
            self.height_after_recovery.saturating_sub(self.start_height),
            elapsed(self.start_time, self.recover_end_time),
        )
    }

    /// Blocks per second while the workload ran.
    pub fn tx_block_rate(&self) -> f64 {
        per_second(self.tx_end_height.saturating_sub(self.tx_start_height), self.tx_duration())
    }

    /// Percentage of sent transactions that were mined.
    pub fn mined_percent(&self) -> f64 {
        if self.sent == 0 { 0.0 } else { self.mined as f64 * 100.0 / self.sent as f64 }
    }

    pub fn log(&self) {
        info!(
            name = %self.name,
            start_time = unix_secs(self.start_time),
            duration_secs = self.case_duration().as_secs(),
            recover_start_time = unix_secs(self.recover_start_time),
            recover_secs = self.recovery_duration().as_secs(),
            recover_end_time = unix_secs(self.recover_end_time),
            start_height = self.start_height,
            height_before_recovery = self.height_before_recovery,
            height_after_recovery = self.height_after_recovery,
            block_rate = format_args!("{:.3}", self.block_rate()),
            "Test case statistics"
        );
        info!(
            name = %self.name,
            tx_start_time = unix_secs(self.tx_start_time),
            tx_end_time = unix_secs(self.tx_end_time),
            tx_secs = self.tx_duration().as_secs(),
            tx_start_height = self.tx_start_height,
            tx_end_height = self.tx_end_height,
            tx_block_rate = format_args!("{:.3}", self.tx_block_rate()),
            mined = self.mined,
            sent = self.sent,
            mined_percent = format_args!("{:.2}", self.mined_percent()),
            delivered = %self.delivered,
            "Workload statistics"
        );
    }
}

/// Pass/fail tally of a playbook run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    cases: Vec<(String, bool)>,
}

impl RunSummary {
    pub fn record(&mut self, name: impl Into<String>, passed: bool) {
        self.cases.push((name.into(), passed));
    }

    pub fn total(&self) -> usize {
        self.cases.len()
    }

    pub fn passed(&self) -> usize {
        self.cases.iter().filter(|(_, passed)| *passed).count()
    }

    pub fn all_passed(&self) -> bool {
        self.passed() == self.total()
    }

    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.cases.iter().filter(|(_, passed)| !*passed).map(|(name, _)| name.as_str())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[PASS] {}/{} cases were passed.", self.passed(), self.total())?;
        for (name, passed) in &self.cases {
            writeln!(f, "[{}] {name}", if *passed { "PASS" } else { "FAIL" })?;
        }
        Ok(())
    }
}
