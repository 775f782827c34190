//! Node handle backed by a live test bed member.

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use chaosbed_types::{LatencyMeta, NodeId, NodeSpec};
use color_eyre::eyre;
use tracing::{debug, info, warn};

use crate::{
    error::ClientError,
    eth_rpc::EthRpcClient,
    handle::{Disruption, NodeHandle, TxReceipt},
    lifecycle::{CommandLifecycle, Lifecycle},
    link::{CommandLinkControl, LinkControl, LinkEffect},
    poll::poll_until,
    transport::{HttpTransport, Transport},
};

/// How long `disconnect_peer` waits for the drop rule to show up.
const PARTITION_CONFIRM_TIMEOUT: Duration = Duration::from_secs(3);
const PARTITION_CONFIRM_INTERVAL: Duration = Duration::from_millis(200);
/// Upper bound for a single lifecycle or link command.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(60);

pub struct RemoteNode {
    id: NodeId,
    host: String,
    p2p_port: u16,
    coinbase: Address,
    rpc: EthRpcClient,
    link: Arc<dyn LinkControl>,
    lifecycle: Arc<dyn Lifecycle>,
    state: Mutex<Disruption>,
}

impl RemoteNode {
    /// Builds a handle that talks HTTP JSON-RPC and runs commands through the
    /// node's exec prefix.
    pub fn from_spec(spec: &NodeSpec) -> eyre::Result<Self> {
        let transport =
            HttpTransport::new(spec.rpc_url.clone(), Duration::from_millis(spec.rpc_timeout_ms))?;
        let link = CommandLinkControl::new(spec.exec.clone(), &spec.net_interface, COMMAND_TIMEOUT);
        let lifecycle = CommandLifecycle::new(spec.lifecycle.clone(), COMMAND_TIMEOUT);
        Ok(Self::new(spec, Arc::new(transport), Arc::new(link), Arc::new(lifecycle)))
    }

    pub fn new(
        spec: &NodeSpec,
        transport: Arc<dyn Transport>,
        link: Arc<dyn LinkControl>,
        lifecycle: Arc<dyn Lifecycle>,
    ) -> Self {
        Self {
            id: spec.index,
            host: spec.host.clone(),
            p2p_port: spec.p2p_port,
            coinbase: spec.coinbase,
            rpc: EthRpcClient::new(transport),
            link,
            lifecycle,
            state: Mutex::new(Disruption::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, Disruption> {
        // The guarded value is plain bookkeeping, still usable after a panic.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remember_peer(&self, host: &str, port: u16) {
        let mut state = self.state();
        if !state.disconnected.iter().any(|(h, _)| h == host) {
            state.disconnected.push((host.to_string(), port));
        }
    }

    fn forget_peer(&self, host: &str) {
        self.state().disconnected.retain(|(h, _)| h != host);
    }
}

#[async_trait]
impl NodeHandle for RemoteNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn p2p_port(&self) -> u16 {
        self.p2p_port
    }

    fn address(&self) -> Address {
        self.coinbase
    }

    async fn stop(&self) -> eyre::Result<()> {
        info!(node = %self.id, "Stopping node");
        // A timed out stop may still have killed the process; starting again is harmless.
        let stopped = self.lifecycle.stop().await;
        self.state().stopped = true;
        stopped
    }

    async fn start(&self) -> eyre::Result<()> {
        info!(node = %self.id, "Starting node");
        self.lifecycle.start().await?;
        self.state().stopped = false;
        Ok(())
    }

    async fn disconnect_peer(&self, host: &str, port: u16) -> eyre::Result<()> {
        if self.link.is_partitioned(host).await? {
            debug!(node = %self.id, peer = %host, "Peer already disconnected");
        } else {
            info!(node = %self.id, peer = %host, "Disconnecting peer");
            self.link.apply(&LinkEffect::Partition { host: host.to_string() }).await?;
            // Tracked before confirmation so that healing removes a rule we could not verify.
            self.remember_peer(host, port);

            let link = &self.link;
            let confirmed =
                poll_until(PARTITION_CONFIRM_INTERVAL, PARTITION_CONFIRM_TIMEOUT, move || async move {
                    link.is_partitioned(host).await.ok().filter(|p| *p)
                })
                .await;
            if confirmed.is_none() {
                return Err(ClientError::PartitionNotConfirmed { host: host.to_string() }.into());
            }
        }

        self.remember_peer(host, port);
        Ok(())
    }

    async fn connect_peer(&self, host: &str, _port: u16) -> eyre::Result<()> {
        if self.link.is_partitioned(host).await? {
            info!(node = %self.id, peer = %host, "Reconnecting peer");
            self.link.apply(&LinkEffect::Reconnect { host: host.to_string() }).await?;
        } else {
            debug!(node = %self.id, peer = %host, "Peer already connected");
        }
        self.forget_peer(host);
        Ok(())
    }

    async fn set_link_delay(&self, meta: LatencyMeta) -> eyre::Result<()> {
        let delayed = self.state().delayed;
        if delayed {
            // netem refuses a second root qdisc on the same device.
            if let Err(e) = self.link.apply(&LinkEffect::ClearDelay).await {
                warn!(node = %self.id, error = %e, "Failed to clear previous link delay");
            }
        }
        info!(node = %self.id, %meta, "Delaying outgoing traffic");
        self.link.apply(&LinkEffect::Delay(meta)).await?;
        self.state().delayed = true;
        Ok(())
    }

    async fn cancel_link_delay(&self) -> eyre::Result<()> {
        let delayed = self.state().delayed;
        if !delayed {
            return Ok(());
        }
        info!(node = %self.id, "Removing link delay");
        self.link.apply(&LinkEffect::ClearDelay).await?;
        self.state().delayed = false;
        Ok(())
    }

    async fn redeploy(&self) -> eyre::Result<()> {
        info!(node = %self.id, "Redeploying node");
        self.lifecycle.redeploy().await?;
        *self.state() = Disruption::default();
        Ok(())
    }

    async fn chain_height(&self) -> Option<u64> {
        self.rpc
            .block_number()
            .await
            .inspect_err(|e| debug!(node = %self.id, error = %e, "Cannot read chain height"))
            .ok()
    }

    async fn block_hash_at(&self, height: u64) -> Option<B256> {
        self.rpc
            .block_hash(height)
            .await
            .inspect_err(|e| debug!(node = %self.id, height, error = %e, "Cannot read block hash"))
            .ok()
            .flatten()
    }

    async fn balance(&self, address: Address) -> Option<U256> {
        self.rpc
            .balance(address)
            .await
            .inspect_err(|e| warn!(node = %self.id, %address, error = %e, "Cannot read balance"))
            .ok()
    }

    async fn send_transaction(&self, to: Address, value: U256, gas_price: u128) -> Option<B256> {
        self.rpc
            .send_transaction(self.coinbase, to, value, gas_price)
            .await
            .inspect_err(|e| warn!(node = %self.id, %to, error = %e, "Transaction rejected"))
            .ok()
    }

    async fn transaction_receipt(&self, hash: B256) -> Option<TxReceipt> {
        self.rpc
            .transaction_receipt(hash)
            .await
            .inspect_err(|e| debug!(node = %self.id, %hash, error = %e, "Cannot read receipt"))
            .ok()
            .flatten()
    }

    fn disruption(&self) -> Disruption {
        self.state().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use alloy_primitives::address;
    use chaosbed_types::LifecycleCommands;
    use color_eyre::eyre::eyre;
    use serde_json::json;

    use super::*;
    use crate::transport::MockTransport;

    /// Link control that keeps partition rules in memory.
    #[derive(Default)]
    struct FakeLink {
        rules: Mutex<BTreeSet<String>>,
        applied: Mutex<Vec<LinkEffect>>,
        ignore_partitions: bool,
    }

    #[async_trait]
    impl LinkControl for FakeLink {
        async fn apply(&self, effect: &LinkEffect) -> eyre::Result<()> {
            self.applied.lock().unwrap().push(effect.clone());
            let mut rules = self.rules.lock().unwrap();
            match effect {
                LinkEffect::Partition { host } if !self.ignore_partitions => {
                    rules.insert(host.clone());
                }
                LinkEffect::Reconnect { host } => {
                    rules.remove(host);
                }
                _ => {}
            }
            Ok(())
        }

        async fn is_partitioned(&self, host: &str) -> eyre::Result<bool> {
            Ok(self.rules.lock().unwrap().contains(host))
        }
    }

    /// Installs rules, but the rule listing breaks after the first query.
    #[derive(Default)]
    struct BrokenListingLink {
        inner: FakeLink,
        queries: Mutex<usize>,
    }

    #[async_trait]
    impl LinkControl for BrokenListingLink {
        async fn apply(&self, effect: &LinkEffect) -> eyre::Result<()> {
            self.inner.apply(effect).await
        }

        async fn is_partitioned(&self, host: &str) -> eyre::Result<bool> {
            let first = {
                let mut queries = self.queries.lock().unwrap();
                *queries += 1;
                *queries == 1
            };
            if first { self.inner.is_partitioned(host).await } else { Err(eyre!("iptables: lock held")) }
        }
    }

    #[derive(Default)]
    struct FakeLifecycle {
        fail_start: bool,
        fail_stop: bool,
        calls: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl Lifecycle for FakeLifecycle {
        async fn stop(&self) -> eyre::Result<()> {
            self.calls.lock().unwrap().push("stop");
            if self.fail_stop { Err(eyre!("stop timed out")) } else { Ok(()) }
        }

        async fn start(&self) -> eyre::Result<()> {
            self.calls.lock().unwrap().push("start");
            if self.fail_start { Err(eyre!("unit failed")) } else { Ok(()) }
        }

        async fn redeploy(&self) -> eyre::Result<()> {
            self.calls.lock().unwrap().push("redeploy");
            Ok(())
        }
    }

    fn spec() -> NodeSpec {
        NodeSpec {
            index: NodeId::new(1),
            host: "10.0.0.2".to_string(),
            p2p_port: 30303,
            rpc_url: "http://10.0.0.2:8545".parse().unwrap(),
            coinbase: address!("0x2222222222222222222222222222222222222222"),
            net_interface: "eth0".to_string(),
            exec: vec![],
            lifecycle: LifecycleCommands::default(),
            rpc_timeout_ms: 1000,
        }
    }

    fn node(
        link: Arc<FakeLink>,
        lifecycle: Arc<FakeLifecycle>,
    ) -> (Arc<MockTransport>, RemoteNode) {
        let transport = Arc::new(MockTransport::new());
        let node = RemoteNode::new(&spec(), transport.clone(), link, lifecycle);
        (transport, node)
    }

    #[tokio::test]
    async fn disconnect_is_idempotent_and_tracked() {
        let link = Arc::new(FakeLink::default());
        let (_, node) = node(link.clone(), Arc::default());

        node.disconnect_peer("10.0.0.3", 30303).await.unwrap();
        node.disconnect_peer("10.0.0.3", 30303).await.unwrap();

        assert_eq!(link.applied.lock().unwrap().len(), 1);
        assert_eq!(node.disruption().disconnected, vec![("10.0.0.3".to_string(), 30303)]);

        node.connect_peer("10.0.0.3", 30303).await.unwrap();
        node.connect_peer("10.0.0.3", 30303).await.unwrap();
        assert_eq!(link.applied.lock().unwrap().len(), 2);
        assert!(node.disruption().is_clear());
    }

    #[tokio::test(start_paused = true)]
    async fn unconfirmed_partition_fails() {
        let link = Arc::new(FakeLink { ignore_partitions: true, ..Default::default() });
        let (_, node) = node(link, Arc::default());

        let err = node.disconnect_peer("10.0.0.3", 30303).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ClientError>(),
            Some(ClientError::PartitionNotConfirmed { .. })
        ));
        assert_eq!(node.disruption().disconnected, vec![("10.0.0.3".to_string(), 30303)]);
    }

    #[tokio::test(start_paused = true)]
    async fn heal_removes_an_unconfirmed_drop_rule() {
        let link = Arc::new(BrokenListingLink::default());
        let node = RemoteNode::new(
            &spec(),
            Arc::new(MockTransport::new()),
            link.clone(),
            Arc::new(FakeLifecycle::default()),
        );

        assert!(node.disconnect_peer("10.0.0.3", 30303).await.is_err());
        assert!(link.inner.rules.lock().unwrap().contains("10.0.0.3"));

        // Listing works again by the time recovery runs.
        *link.queries.lock().unwrap() = 0;
        node.heal().await.unwrap();

        assert!(link.inner.rules.lock().unwrap().is_empty());
        assert!(node.disruption().is_clear());
    }

    #[tokio::test]
    async fn failed_stop_is_still_restarted_by_heal() {
        let lifecycle = Arc::new(FakeLifecycle { fail_stop: true, ..Default::default() });
        let (_, node) = node(Arc::default(), lifecycle.clone());

        assert!(node.stop().await.is_err());
        assert!(node.disruption().stopped);

        node.heal().await.unwrap();
        assert_eq!(*lifecycle.calls.lock().unwrap(), vec!["stop", "start"]);
        assert!(node.disruption().is_clear());
    }

    #[tokio::test]
    async fn heal_undoes_every_disruption() {
        let link = Arc::new(FakeLink::default());
        let lifecycle = Arc::new(FakeLifecycle::default());
        let (_, node) = node(link.clone(), lifecycle.clone());

        node.stop().await.unwrap();
        node.disconnect_peer("10.0.0.3", 30303).await.unwrap();
        node.set_link_delay(LatencyMeta::default()).await.unwrap();
        assert!(!node.disruption().is_clear());

        node.heal().await.unwrap();

        assert!(node.disruption().is_clear());
        assert_eq!(*lifecycle.calls.lock().unwrap(), vec!["stop", "start"]);
        assert_eq!(link.applied.lock().unwrap().last(), Some(&LinkEffect::ClearDelay));
    }

    #[tokio::test]
    async fn heal_continues_past_failures() {
        let link = Arc::new(FakeLink::default());
        let lifecycle = Arc::new(FakeLifecycle { fail_start: true, ..Default::default() });
        let (_, node) = node(link.clone(), lifecycle);

        node.stop().await.unwrap();
        node.disconnect_peer("10.0.0.4", 30303).await.unwrap();

        assert!(node.heal().await.is_err());
        let state = node.disruption();
        assert!(state.stopped);
        assert!(state.disconnected.is_empty());
    }

    #[tokio::test]
    async fn queries_swallow_errors() {
        let (transport, node) = node(Arc::default(), Arc::default());
        transport.push_response("eth_blockNumber", Ok(json!("0x10"))).await;
        transport.push_response("eth_blockNumber", Err(eyre!("connection refused"))).await;

        assert_eq!(node.chain_height().await, Some(16));
        assert_eq!(node.chain_height().await, None);
        assert_eq!(node.block_hash_at(3).await, None);
    }

    #[tokio::test]
    async fn transactions_are_sent_from_coinbase() {
        let (transport, node) = node(Arc::default(), Arc::default());
        transport.push_response("eth_sendTransaction", Ok(json!(B256::repeat_byte(9)))).await;

        let to = address!("0x3333333333333333333333333333333333333333");
        let hash = node.send_transaction(to, U256::from(1), 5000).await;
        assert_eq!(hash, Some(B256::repeat_byte(9)));

        let (_, params) = &transport.requests().await[0];
        assert_eq!(params[0]["from"], json!(node.address()));
    }
}
