#![forbid(unsafe_code)]

//! Drives a cluster through a fault-injection scenario and decides whether it
//! behaved.
//!
//! A [`TestCase`] owns one run: it starts the [`Scheduler`] on a background
//! task, feeds transactions through the [`WorkloadDriver`], checks balances,
//! liveness and safety with the [`Verifier`], then heals the cluster through
//! the [`RecoveryController`] and waits for it to converge.

pub mod cluster;
pub mod config;
pub mod recovery;
pub mod report;
pub mod scheduler;
pub mod testcase;
pub mod verifier;
pub mod workload;

pub use cluster::Cluster;
pub use config::EngineConfig;
pub use recovery::RecoveryController;
pub use report::{RunSummary, TestCaseReport};
pub use scheduler::{ScheduledAction, Scheduler, SchedulerStats};
pub use testcase::{FailureReason, TestCase, TestCaseOutcome, TestCaseState};
pub use verifier::{BalanceReport, VerificationError, Verifier};
pub use workload::{WorkloadDriver, WorkloadError, WorkloadStats};
