//! Transaction stream issued while the disaster timeline plays out.

use std::time::SystemTime;

use alloy_primitives::U256;
use chaosbed_client::poll_until;
use chaosbed_types::{NodeId, Scenario, TxLedger};
use thiserror::Error;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::{cluster::Cluster, config::EngineConfig, scheduler::Scheduler};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkloadError {
    #[error("workload node {0} is not part of the cluster")]
    UnknownNode(NodeId),

    #[error("cannot read the balance of node {0} before the workload")]
    BalanceUnavailable(NodeId),
}

/// What the driver did, plus the balances the verifier compares against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadStats {
    pub sent: usize,
    pub rejected: usize,
    pub sender_before: U256,
    pub receiver_before: U256,
    pub start_time: SystemTime,
    pub end_time: SystemTime,
    pub start_height: u64,
    pub end_height: u64,
}

pub struct WorkloadDriver {
    cluster: Cluster,
    config: EngineConfig,
}

impl WorkloadDriver {
    pub fn new(cluster: Cluster, config: EngineConfig) -> Self {
        Self { cluster, config }
    }

    /// Sends one transfer per tick until the workload duration has elapsed and
    /// the scheduler has nothing left to do.
    pub async fn run(
        &self,
        scenario: &Scenario,
        scheduler: &Scheduler,
        ledger: &mut TxLedger,
    ) -> Result<WorkloadStats, WorkloadError> {
        let workload = &scenario.workload;

        if let Some(offset) = workload.start_at() {
            debug!(?offset, "Waiting before sending transactions");
            let begin = Instant::now();
            poll_until(self.config.poll_interval(), offset, move || async move {
                (begin.elapsed() >= offset).then_some(())
            })
            .await;
        }

        let sender = self
            .cluster
            .node(workload.sender_id)
            .ok_or(WorkloadError::UnknownNode(workload.sender_id))?;
        let receiver = self
            .cluster
            .node(workload.receiver_id)
            .ok_or(WorkloadError::UnknownNode(workload.receiver_id))?;

        let start_time = SystemTime::now();
        let start_height = self.cluster.height().await;

        let sender_before = sender
            .balance(sender.address())
            .await
            .ok_or(WorkloadError::BalanceUnavailable(workload.sender_id))?;
        let receiver_before = receiver
            .balance(receiver.address())
            .await
            .ok_or(WorkloadError::BalanceUnavailable(workload.receiver_id))?;

        info!(
            sender = %workload.sender_id,
            receiver = %workload.receiver_id,
            duration = workload.duration_seconds,
            amount = workload.amount_per_tx,
            start_height,
            "Starting workload"
        );

        let to = receiver.address();
        let value = U256::from(workload.amount_per_tx);
        let gas_price = u128::from(self.config.gas_price_wei);
        let duration = workload.duration();
        let began = Instant::now();
        let (mut sent, mut rejected) = (0, 0);

        while began.elapsed() < duration || scheduler.is_active() {
            sleep(self.config.tx_interval()).await;
            match sender.send_transaction(to, value, gas_price).await {
                Some(hash) => {
                    ledger.record(hash, SystemTime::now());
                    sent += 1;
                    debug!(%hash, sent, "Transaction accepted");
                }
                None => {
                    rejected += 1;
                    warn!(sender = %workload.sender_id, rejected, "Transaction not accepted");
                }
            }
        }

        let end_height = self.cluster.height().await;
        info!(sent, rejected, end_height, "Workload finished");

        Ok(WorkloadStats {
            sent,
            rejected,
            sender_before,
            receiver_before,
            start_time,
            end_time: SystemTime::now(),
            start_height,
            end_height,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chaosbed_test_support::{
        MockCluster,
        fixtures::{scenario, start, stop},
        mock_cluster::INITIAL_BALANCE,
    };

    use super::*;

    fn setup(size: u32) -> (MockCluster, Cluster, WorkloadDriver) {
        let mock = MockCluster::new(size);
        let cluster = Cluster::new(mock.handles());
        let driver = WorkloadDriver::new(cluster.clone(), EngineConfig::default());
        (mock, cluster, driver)
    }

    #[tokio::test(start_paused = true)]
    async fn sends_one_transfer_per_second() {
        let (_mock, cluster, driver) = setup(4);
        let scheduler = Scheduler::new(cluster);
        let s = scenario("TC-1", &[], vec![], 5, 100, true);
        let mut ledger = TxLedger::new();

        let began = Instant::now();
        let stats = driver.run(&s, &scheduler, &mut ledger).await.unwrap();

        assert_eq!(stats.sent, 5);
        assert_eq!(ledger.len(), 5);
        assert_eq!(began.elapsed(), Duration::from_secs(5));
        assert_eq!(stats.sender_before, U256::from(INITIAL_BALANCE));
        assert!(stats.end_height >= stats.start_height);
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_sending_while_scheduler_is_active() {
        let (_mock, cluster, driver) = setup(4);
        let mut scheduler = Scheduler::new(cluster);
        let s = scenario("TC-2", &[3], vec![stop(1, &[3]), start(8, &[3])], 3, 1, true);
        scheduler.schedule(&s).unwrap();

        let mut ledger = TxLedger::new();
        let began = Instant::now();
        driver.run(&s, &scheduler, &mut ledger).await.unwrap();

        assert!(began.elapsed() >= Duration::from_secs(8));
        assert!(!scheduler.is_active());
        assert!(ledger.len() >= 8);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_start_offset() {
        let (_mock, cluster, driver) = setup(3);
        let scheduler = Scheduler::new(cluster);
        let mut s = scenario("TC-3", &[], vec![], 2, 1, true);
        s.workload.start_at_seconds = Some(4);

        let began = Instant::now();
        let stats = driver.run(&s, &scheduler, &mut TxLedger::new()).await.unwrap();
        assert_eq!(began.elapsed(), Duration::from_secs(6));
        assert_eq!(stats.sent, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_balance_fails_the_workload() {
        let (mock, cluster, driver) = setup(3);
        mock.node(1).set_unreachable(true);
        let scheduler = Scheduler::new(cluster);
        let s = scenario("TC-4", &[], vec![], 2, 1, true);

        let err = driver.run(&s, &scheduler, &mut TxLedger::new()).await.unwrap_err();
        assert_eq!(err, WorkloadError::BalanceUnavailable(NodeId::new(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_transfers_are_not_recorded() {
        let (mock, cluster, driver) = setup(3);
        mock.node(0).fail_operation("send");
        let scheduler = Scheduler::new(cluster);
        let s = scenario("TC-5", &[], vec![], 3, 1, true);
        let mut ledger = TxLedger::new();

        let stats = driver.run(&s, &scheduler, &mut ledger).await.unwrap();
        assert_eq!(stats.rejected, 3);
        assert!(ledger.is_empty());
    }
}
