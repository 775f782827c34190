//! Post-workload checks: balances, liveness and safety.

use std::{collections::BTreeMap, time::Duration};

use alloy_primitives::{B256, U256};
use chaosbed_client::poll_until;
use chaosbed_types::{NodeId, Scenario, TxLedger};
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, error, info};

use crate::{cluster::Cluster, config::EngineConfig, workload::WorkloadStats};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("node {0} is not part of the cluster")]
    UnknownNode(NodeId),

    #[error("cannot read the balance of node {0} after the workload")]
    BalanceUnavailable(NodeId),

    #[error("{account} balance is {actual}, expected {expected}")]
    BalanceMismatch { account: &'static str, expected: U256, actual: U256 },

    #[error("chain advanced from {from} to {to} although a halt was expected")]
    UnexpectedProduction { from: u64, to: u64 },

    #[error("chain stalled at height {height} for {window:?}")]
    Stalled { height: u64, window: Duration },

    #[error("node {node} has block {conflicting} at height {height}, others have {reference}")]
    SafetyViolation { height: u64, node: NodeId, reference: B256, conflicting: B256 },
}

/// Outcome of a successful balance check.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BalanceReport {
    pub mined: usize,
    /// Value moved by mined transfers.
    pub delta: U256,
    /// Fees paid by the sender for mined transfers.
    pub fees: U256,
}

/// Stateless checks over the cluster.
pub struct Verifier {
    cluster: Cluster,
    config: EngineConfig,
}

impl Verifier {
    pub fn new(cluster: Cluster, config: EngineConfig) -> Self {
        Self { cluster, config }
    }

    /// Checks that exactly the mined transfers moved value between the two accounts.
    ///
    /// Gas fees from mined receipts are charged to the sender. A self-transfer
    /// therefore expects `before - fees == after`, which reduces to
    /// `before == after` only when receipts carry no gas data.
    pub async fn check_balances(
        &self,
        scenario: &Scenario,
        workload: &WorkloadStats,
        ledger: &TxLedger,
    ) -> Result<BalanceReport, VerificationError> {
        let sender_id = scenario.workload.sender_id;
        let receiver_id = scenario.workload.receiver_id;
        let sender =
            self.cluster.node(sender_id).ok_or(VerificationError::UnknownNode(sender_id))?;
        let receiver =
            self.cluster.node(receiver_id).ok_or(VerificationError::UnknownNode(receiver_id))?;
        let amount = U256::from(scenario.workload.amount_per_tx);

        let mut report = BalanceReport::default();
        for record in ledger {
            // An unreadable receipt counts as not mined.
            let Some(receipt) = sender.transaction_receipt(record.hash).await else {
                debug!(hash = %record.hash, "Receipt unavailable");
                continue;
            };
            if receipt.is_mined() {
                report.mined += 1;
                report.delta += amount;
                report.fees += receipt.fee();
            }
        }

        let sender_after = sender
            .balance(sender.address())
            .await
            .ok_or(VerificationError::BalanceUnavailable(sender_id))?;
        let receiver_after = receiver
            .balance(receiver.address())
            .await
            .ok_or(VerificationError::BalanceUnavailable(receiver_id))?;

        info!(
            sent = ledger.len(),
            mined = report.mined,
            delta = %report.delta,
            fees = %report.fees,
            "Checking balances"
        );

        if scenario.is_self_transfer() {
            expect_equal(
                "sender",
                workload.sender_before.saturating_sub(report.fees),
                sender_after,
            )?;
            return Ok(report);
        }

        expect_equal(
            "sender",
            workload.sender_before.saturating_sub(report.delta + report.fees),
            sender_after,
        )?;
        expect_equal("receiver", workload.receiver_before + report.delta, receiver_after)?;
        Ok(report)
    }

    /// Watches the cluster height for up to the liveness window.
    ///
    /// The first observed increase ends the watch: it passes when the cluster is
    /// expected alive and fails right away otherwise. A window without any
    /// increase fails only when the cluster is expected alive.
    pub async fn check_liveness(&self, expect_alive: bool) -> Result<(), VerificationError> {
        let interval = self.config.poll_interval();
        let window = self.config.liveness_window();
        let baseline = self.cluster.height().await;
        debug!(baseline, expect_alive, "Checking liveness");

        sleep(interval.min(window)).await;
        let cluster = &self.cluster;
        let advanced = poll_until(interval, window.saturating_sub(interval), move || async move {
            let height = cluster.height().await;
            (height > baseline).then_some(height)
        })
        .await;

        match (advanced, expect_alive) {
            (Some(height), true) => {
                info!(from = baseline, to = height, "Cluster keeps producing blocks");
                Ok(())
            }
            (Some(height), false) => {
                error!(from = baseline, to = height, "Cluster produced blocks, expected a halt");
                Err(VerificationError::UnexpectedProduction { from: baseline, to: height })
            }
            (None, true) => {
                error!(height = baseline, ?window, "Cluster stalled");
                Err(VerificationError::Stalled { height: baseline, window })
            }
            (None, false) => {
                info!(height = baseline, "Cluster halted as expected");
                Ok(())
            }
        }
    }

    /// Compares block hashes of the nodes expected alive.
    ///
    /// Each round samples the best height among alive nodes; the first hash seen
    /// at a height is the reference for every later sample of that height.
    pub async fn check_safety(&self, scenario: &Scenario) -> Result<(), VerificationError> {
        let alive = scenario.alive_nodes(self.cluster.members());
        let rounds = self.config.safety_rounds.max(1);
        let mut seen: BTreeMap<u64, B256> = BTreeMap::new();

        for round in 1..=rounds {
            let height = self.cluster.best_height_of(&alive).await;
            for id in &alive {
                let Some(node) = self.cluster.node(*id) else { continue };
                let Some(hash) = node.block_hash_at(height).await else { continue };

                match seen.get(&height) {
                    None => {
                        seen.insert(height, hash);
                    }
                    Some(reference) if *reference != hash => {
                        error!(round, height, node = %id, %hash, %reference, "Block hashes diverge");
                        return Err(VerificationError::SafetyViolation {
                            height,
                            node: *id,
                            reference: *reference,
                            conflicting: hash,
                        });
                    }
                    Some(_) => {}
                }
            }
            if round < rounds {
                sleep(self.config.poll_interval()).await;
            }
        }

        debug!(heights = ?seen.keys().collect::<Vec<_>>(), "Block hashes agree");
        Ok(())
    }
}

fn expect_equal(
    account: &'static str,
    expected: U256,
    actual: U256,
) -> Result<(), VerificationError> {
    if expected == actual {
        Ok(())
    } else {
        error!(account, %expected, %actual, "Balance mismatch");
        Err(VerificationError::BalanceMismatch { account, expected, actual })
    }
}
