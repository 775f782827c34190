//! One scenario run, from scheduling the timeline to a converged cluster.

use core::fmt;
use std::time::{Duration, SystemTime};

use chaosbed_types::{FailureContext, Scenario, ScenarioError, TestCaseResult, TxLedger};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
    cluster::Cluster,
    config::EngineConfig,
    recovery::RecoveryController,
    report::TestCaseReport,
    scheduler::{Scheduler, SchedulerStats},
    verifier::{BalanceReport, VerificationError, Verifier},
    workload::{WorkloadDriver, WorkloadError, WorkloadStats},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TestCaseState {
    Init,
    Scheduling,
    WorkloadRunning,
    Verifying,
    Recovering,
    Converging,
    Passed,
    Failed,
}

impl fmt::Display for TestCaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Scheduling => "scheduling",
            Self::WorkloadRunning => "workload-running",
            Self::Verifying => "verifying",
            Self::Recovering => "recovering",
            Self::Converging => "converging",
            Self::Passed => "passed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a test case failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    #[error("invalid scenario: {0}")]
    InvalidScenario(#[from] ScenarioError),

    #[error("workload failed: {0}")]
    Workload(#[from] WorkloadError),

    #[error("verification failed: {0}")]
    Verification(#[from] VerificationError),

    #[error("recovery actions failed")]
    RecoveryFailed,

    #[error("cluster did not converge within {0:?}")]
    ConvergenceTimeout(Duration),
}

/// Everything a finished test case leaves behind.
#[derive(Debug)]
pub struct TestCaseOutcome {
    pub scenario: Scenario,
    pub state: TestCaseState,
    pub result: TestCaseResult,
    pub failure: Option<FailureReason>,
    /// Present whenever `failure` is.
    pub context: Option<FailureContext>,
    pub report: Option<TestCaseReport>,
    pub scheduler: SchedulerStats,
}

impl TestCaseOutcome {
    pub fn passed(&self) -> bool {
        self.result.passed
    }
}

/// Runs one scenario against a cluster, exactly once.
pub struct TestCase {
    scenario: Scenario,
    cluster: Cluster,
    config: EngineConfig,
    scheduler: Scheduler,
    state: TestCaseState,
    result: TestCaseResult,
    ledger: TxLedger,
    workload: Option<WorkloadStats>,
    balance: Option<BalanceReport>,
    context: Option<FailureContext>,
}

impl TestCase {
    pub fn new(scenario: Scenario, cluster: Cluster, config: EngineConfig) -> Self {
        Self {
            scenario,
            scheduler: Scheduler::new(cluster.clone()),
            cluster,
            config,
            state: TestCaseState::Init,
            result: TestCaseResult::default(),
            ledger: TxLedger::new(),
            workload: None,
            balance: None,
            context: None,
        }
    }

    pub async fn run(mut self) -> TestCaseOutcome {
        info!(name = %self.scenario.name, "Starting test case");
        let failure = self.execute().await.err();

        let joined = self.scheduler.join(Some(self.config.join_timeout())).await;
        if !joined {
            warn!(name = %self.scenario.name, "Disaster actions still running at the end of the case");
        }

        self.result.passed = failure.is_none();
        self.transition(if failure.is_none() { TestCaseState::Passed } else { TestCaseState::Failed });

        let report = self.workload.as_ref().and_then(|workload| {
            TestCaseReport::new(&self.scenario, &self.result, workload, self.balance.as_ref())
        });
        match &failure {
            None => info!(name = %self.scenario.name, "Test case passed"),
            Some(reason) => error!(name = %self.scenario.name, %reason, "Test case failed"),
        }

        TestCaseOutcome {
            state: self.state,
            result: self.result,
            failure,
            context: self.context,
            report,
            scheduler: self.scheduler.stats(),
            scenario: self.scenario,
        }
    }

    async fn execute(&mut self) -> Result<(), FailureReason> {
        self.result.start_time = Some(SystemTime::now());
        self.result.start_height = self.cluster.height().await;

        self.transition(TestCaseState::Scheduling);
        if let Err(e) = self.scheduler.schedule(&self.scenario) {
            // Nothing fired, so the cluster is untouched.
            self.capture_context().await;
            return Err(e.into());
        }

        self.transition(TestCaseState::WorkloadRunning);
        let driver = WorkloadDriver::new(self.cluster.clone(), self.config.clone());
        let workload = match driver.run(&self.scenario, &self.scheduler, &mut self.ledger).await {
            Ok(stats) => stats,
            Err(e) => return Err(self.abort(e.into()).await),
        };
        self.workload = Some(workload.clone());

        self.transition(TestCaseState::Verifying);
        if let Err(e) = self.verify(&workload).await {
            return Err(self.abort(e.into()).await);
        }

        self.transition(TestCaseState::Recovering);
        self.result.height_before_recovery = Some(self.cluster.height().await);
        self.result.recover_start_time = Some(SystemTime::now());
        let recovery = RecoveryController::new(self.cluster.clone(), self.config.clone());
        if !recovery.recover().await {
            self.scheduler.cancel_all();
            self.capture_context().await;
            return Err(FailureReason::RecoveryFailed);
        }

        self.transition(TestCaseState::Converging);
        let timeout = self.config.heal_timeout();
        if !recovery.is_healed(timeout).await {
            self.capture_context().await;
            return Err(FailureReason::ConvergenceTimeout(timeout));
        }
        self.mark_recovered().await;
        Ok(())
    }

    async fn verify(&mut self, workload: &WorkloadStats) -> Result<(), VerificationError> {
        let verifier = Verifier::new(self.cluster.clone(), self.config.clone());
        let balance = verifier.check_balances(&self.scenario, workload, &self.ledger).await?;
        self.balance = Some(balance);
        verifier.check_liveness(self.scenario.expected_engine_alive).await?;
        verifier.check_safety(&self.scenario).await
    }

    /// Snapshots the failure, then puts the cluster back together.
    async fn abort(&mut self, reason: FailureReason) -> FailureReason {
        self.capture_context().await;
        self.teardown().await;
        reason
    }

    async fn teardown(&mut self) {
        self.scheduler.cancel_all();
        self.result.recover_start_time = Some(SystemTime::now());
        self.result.height_before_recovery = Some(self.cluster.height().await);

        let recovery = RecoveryController::new(self.cluster.clone(), self.config.clone());
        if !recovery.recover().await {
            warn!(name = %self.scenario.name, "Cluster not fully restored after failure");
        }
        if recovery.is_healed(self.config.heal_timeout()).await {
            self.mark_recovered().await;
        }
    }

    async fn mark_recovered(&mut self) {
        self.result.height_after_recovery = Some(self.cluster.height().await);
        self.result.recover_end_time = Some(SystemTime::now());
    }

    async fn capture_context(&mut self) {
        let end_height = match self.result.height_before_recovery {
            Some(height) => height,
            None => self.cluster.height().await,
        };
        self.context = Some(FailureContext::new(
            self.scenario.clone(),
            self.result.start_time.unwrap_or_else(SystemTime::now),
            self.result.start_height,
            end_height,
            SystemTime::now(),
            self.cluster.ip_mapping(),
        ));
    }

    fn transition(&mut self, next: TestCaseState) {
        debug!(name = %self.scenario.name, from = %self.state, to = %next, "Test case state");
        self.state = next;
    }
}
