use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use chaosbed_types::{LatencyMeta, NodeId};
use color_eyre::eyre::{self, eyre};
use tracing::{info, warn};

/// Receipt fields the balance check needs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxReceipt {
    /// Set once the transaction is included in a block.
    pub block_hash: Option<B256>,
    pub gas_used: Option<u64>,
    pub effective_gas_price: Option<U256>,
}

impl TxReceipt {
    pub fn is_mined(&self) -> bool {
        self.block_hash.is_some()
    }

    /// Fee paid by the sender, zero when the node does not report it.
    pub fn fee(&self) -> U256 {
        match (self.gas_used, self.effective_gas_price) {
            (Some(gas), Some(price)) => U256::from(gas).saturating_mul(price),
            _ => U256::ZERO,
        }
    }
}

/// Disruptions a node currently has in effect, as tracked by its handle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Disruption {
    pub stopped: bool,
    /// `(host, p2p_port)` of every peer whose traffic is being dropped.
    pub disconnected: Vec<(String, u16)>,
    pub delayed: bool,
}

impl Disruption {
    pub fn is_clear(&self) -> bool {
        !self.stopped && self.disconnected.is_empty() && !self.delayed
    }
}

/// Control and query primitives of one cluster member.
///
/// Control operations are idempotent. Queries never fail: an unreachable node
/// answers `None`.
#[async_trait]
pub trait NodeHandle: Send + Sync {
    fn id(&self) -> NodeId;
    fn host(&self) -> &str;
    fn p2p_port(&self) -> u16;
    /// Funded account the node sends workload transactions from.
    fn address(&self) -> Address;

    async fn stop(&self) -> eyre::Result<()>;
    async fn start(&self) -> eyre::Result<()>;

    /// Drops all traffic arriving from `host`.
    async fn disconnect_peer(&self, host: &str, port: u16) -> eyre::Result<()>;
    async fn connect_peer(&self, host: &str, port: u16) -> eyre::Result<()>;

    async fn set_link_delay(&self, meta: LatencyMeta) -> eyre::Result<()>;
    async fn cancel_link_delay(&self) -> eyre::Result<()>;

    /// Stops the node, wipes its chain data and starts it from genesis.
    async fn redeploy(&self) -> eyre::Result<()>;

    async fn chain_height(&self) -> Option<u64>;
    async fn block_hash_at(&self, height: u64) -> Option<B256>;
    async fn balance(&self, address: Address) -> Option<U256>;
    async fn send_transaction(&self, to: Address, value: U256, gas_price: u128) -> Option<B256>;
    async fn transaction_receipt(&self, hash: B256) -> Option<TxReceipt>;

    fn disruption(&self) -> Disruption;

    /// Undoes every disruption this node has in effect.
    ///
    /// Each repair is attempted even when an earlier one fails; the error
    /// lists all of the failures.
    async fn heal(&self) -> eyre::Result<()> {
        let state = self.disruption();
        if state.is_clear() {
            return Ok(());
        }

        let node = self.id();
        let mut failures = Vec::new();

        if state.stopped {
            info!(%node, "Restarting stopped node");
            if let Err(e) = self.start().await {
                warn!(%node, error = %e, "Failed to restart node");
                failures.push(format!("start: {e}"));
            }
        }

        for (host, port) in &state.disconnected {
            info!(%node, peer = %host, "Reconnecting peer");
            if let Err(e) = self.connect_peer(host, *port).await {
                warn!(%node, peer = %host, error = %e, "Failed to reconnect peer");
                failures.push(format!("connect {host}:{port}: {e}"));
            }
        }

        if state.delayed {
            info!(%node, "Cancelling link delay");
            if let Err(e) = self.cancel_link_delay().await {
                warn!(%node, error = %e, "Failed to cancel link delay");
                failures.push(format!("undelay: {e}"));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(eyre!("node {node} could not be healed: {}", failures.join("; ")))
        }
    }
}
