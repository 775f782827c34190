//! In-memory replicated ledger.
//!
//! All members share one canonical chain. Blocks are produced every
//! `block_interval` of tokio time while at least `quorum` members run;
//! producing is evaluated lazily whenever a node is queried or changes state.
//! Stopped members answer no queries and are caught up when restarted.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use alloy_primitives::{Address, B256, U256};
use async_trait::async_trait;
use chaosbed_client::{Disruption, NodeHandle, TxReceipt};
use chaosbed_types::{LatencyMeta, NodeId};
use color_eyre::eyre::{self, eyre};
use tokio::time::Instant;

/// Genesis balance of every member's coinbase.
pub const INITIAL_BALANCE: u128 = 1_000_000_000_000_000_000;
/// Gas charged per transfer when fees are enabled.
pub const GAS_PER_TRANSFER: u64 = 21_000;

const DEFAULT_BLOCK_INTERVAL: Duration = Duration::from_secs(1);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
struct MockTx {
    hash: B256,
    from: Address,
    to: Address,
    value: U256,
    gas_price: u128,
    block: Option<u64>,
}

#[derive(Debug)]
struct Chain {
    height: u64,
    last_tick: Instant,
    block_interval: Duration,
    quorum: usize,
    running: BTreeSet<NodeId>,
    halted: bool,
    charge_fees: bool,
    genesis: HashMap<Address, U256>,
    txs: Vec<MockTx>,
    tx_counter: u64,
}

impl Chain {
    fn producing(&self) -> bool {
        !self.halted && self.running.len() >= self.quorum
    }

    /// Catches the chain up with the clock.
    fn advance(&mut self) {
        let now = Instant::now();
        if !self.producing() {
            self.last_tick = now;
            return;
        }
        let elapsed = now.saturating_duration_since(self.last_tick);
        let blocks = elapsed.as_nanos() / self.block_interval.as_nanos();
        if blocks == 0 {
            return;
        }
        let blocks = u32::try_from(blocks).unwrap_or(u32::MAX);

        let next = self.height + 1;
        for tx in self.txs.iter_mut().filter(|tx| tx.block.is_none()) {
            tx.block = Some(next);
        }
        self.height += u64::from(blocks);
        self.last_tick += self.block_interval * blocks;
    }

    fn reset(&mut self) {
        self.height = 0;
        self.txs.clear();
        self.last_tick = Instant::now();
    }

    fn fee(&self, tx: &MockTx) -> U256 {
        if self.charge_fees {
            U256::from(GAS_PER_TRANSFER) * U256::from(tx.gas_price)
        } else {
            U256::ZERO
        }
    }

    fn balance(&self, address: Address) -> U256 {
        let mut balance = self.genesis.get(&address).copied().unwrap_or_default();
        for tx in self.txs.iter().filter(|tx| tx.block.is_some()) {
            if tx.to == address {
                balance = balance.saturating_add(tx.value);
            }
            if tx.from == address {
                balance = balance.saturating_sub(tx.value + self.fee(tx));
            }
        }
        balance
    }
}

fn block_hash(height: u64, forked: bool) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[0] = if forked { 0xf0 } else { 0x0b };
    bytes[24..].copy_from_slice(&height.to_be_bytes());
    B256::from(bytes)
}

#[derive(Debug, Default)]
struct NodeState {
    disruption: Disruption,
    latency: Option<LatencyMeta>,
    unreachable: bool,
    forked: bool,
    failing: BTreeSet<&'static str>,
    calls: Vec<String>,
}

/// One simulated member.
#[derive(Debug)]
pub struct MockNode {
    id: NodeId,
    host: String,
    p2p_port: u16,
    address: Address,
    chain: Arc<Mutex<Chain>>,
    state: Mutex<NodeState>,
}

impl MockNode {
    /// Makes the named control operation (`stop`, `start`, `connect`, ...) fail.
    pub fn fail_operation(&self, op: &'static str) {
        lock(&self.state).failing.insert(op);
    }

    pub fn clear_failures(&self) {
        lock(&self.state).failing.clear();
    }

    /// While unreachable, every query answers `None`.
    pub fn set_unreachable(&self, unreachable: bool) {
        lock(&self.state).unreachable = unreachable;
    }

    /// Reports a different block hash than the rest of the cluster at every height.
    pub fn fork(&self) {
        lock(&self.state).forked = true;
    }

    /// Control operations received so far, e.g. `stop` or `disconnect 10.0.0.2`.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    pub fn latency(&self) -> Option<LatencyMeta> {
        lock(&self.state).latency
    }

    pub fn is_running(&self) -> bool {
        !lock(&self.state).disruption.stopped
    }

    fn begin(&self, op: &'static str, detail: Option<&str>) -> eyre::Result<()> {
        let mut state = lock(&self.state);
        state.calls.push(match detail {
            Some(detail) => format!("{op} {detail}"),
            None => op.to_string(),
        });
        if state.failing.contains(op) {
            return Err(eyre!("{op} failed on node {}", self.id));
        }
        Ok(())
    }

    fn is_down(&self) -> bool {
        let state = lock(&self.state);
        state.disruption.stopped || state.unreachable
    }

    /// Runs `f` against an up-to-date chain, `None` while the node is down.
    fn query<T>(&self, f: impl FnOnce(&mut Chain, bool) -> Option<T>) -> Option<T> {
        if self.is_down() {
            return None;
        }
        let forked = lock(&self.state).forked;
        let mut chain = lock(&self.chain);
        chain.advance();
        f(&mut chain, forked)
    }
}

#[async_trait]
impl NodeHandle for MockNode {
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
        self.address
    }

    async fn stop(&self) -> eyre::Result<()> {
        self.begin("stop", None)?;
        {
            let mut chain = lock(&self.chain);
            chain.advance();
            chain.running.remove(&self.id);
        }
        lock(&self.state).disruption.stopped = true;
        Ok(())
    }

    async fn start(&self) -> eyre::Result<()> {
        self.begin("start", None)?;
        {
            let mut chain = lock(&self.chain);
            chain.advance();
            chain.running.insert(self.id);
        }
        lock(&self.state).disruption.stopped = false;
        Ok(())
    }

    async fn disconnect_peer(&self, host: &str, port: u16) -> eyre::Result<()> {
        self.begin("disconnect", Some(host))?;
        let mut state = lock(&self.state);
        if !state.disruption.disconnected.iter().any(|(h, _)| h == host) {
            state.disruption.disconnected.push((host.to_string(), port));
        }
        Ok(())
    }

    async fn connect_peer(&self, host: &str, _port: u16) -> eyre::Result<()> {
        self.begin("connect", Some(host))?;
        lock(&self.state).disruption.disconnected.retain(|(h, _)| h != host);
        Ok(())
    }

    async fn set_link_delay(&self, meta: LatencyMeta) -> eyre::Result<()> {
        self.begin("delay", None)?;
        let mut state = lock(&self.state);
        state.disruption.delayed = true;
        state.latency = Some(meta);
        Ok(())
    }

    async fn cancel_link_delay(&self) -> eyre::Result<()> {
        self.begin("undelay", None)?;
        let mut state = lock(&self.state);
        state.disruption.delayed = false;
        state.latency = None;
        Ok(())
    }

    async fn redeploy(&self) -> eyre::Result<()> {
        self.begin("redeploy", None)?;
        {
            let mut chain = lock(&self.chain);
            chain.reset();
            chain.running.insert(self.id);
        }
        let mut state = lock(&self.state);
        state.disruption = Disruption::default();
        state.latency = None;
        Ok(())
    }

    async fn chain_height(&self) -> Option<u64> {
        self.query(|chain, _| Some(chain.height))
    }

    async fn block_hash_at(&self, height: u64) -> Option<B256> {
        self.query(|chain, forked| (height <= chain.height).then(|| block_hash(height, forked)))
    }

    async fn balance(&self, address: Address) -> Option<U256> {
        self.query(|chain, _| Some(chain.balance(address)))
    }

    async fn send_transaction(&self, to: Address, value: U256, gas_price: u128) -> Option<B256> {
        if lock(&self.state).failing.contains("send") {
            return None;
        }
        let from = self.address;
        self.query(|chain, _| {
            chain.tx_counter += 1;
            let mut bytes = [0xee_u8; 32];
            bytes[..8].copy_from_slice(&chain.tx_counter.to_be_bytes());
            let hash = B256::from(bytes);
            chain.txs.push(MockTx { hash, from, to, value, gas_price, block: None });
            Some(hash)
        })
    }

    async fn transaction_receipt(&self, hash: B256) -> Option<TxReceipt> {
        self.query(|chain, _| {
            let tx = chain.txs.iter().find(|tx| tx.hash == hash)?;
            let mined = tx.block.is_some();
            let with_fees = chain.charge_fees && mined;
            Some(TxReceipt {
                block_hash: tx.block.map(|height| block_hash(height, false)),
                gas_used: with_fees.then_some(GAS_PER_TRANSFER),
                effective_gas_price: with_fees.then(|| U256::from(tx.gas_price)),
            })
        })
    }

    fn disruption(&self) -> Disruption {
        lock(&self.state).disruption.clone()
    }
}

/// A set of [`MockNode`]s sharing one chain.
#[derive(Debug, Clone)]
pub struct MockCluster {
    chain: Arc<Mutex<Chain>>,
    nodes: Vec<Arc<MockNode>>,
}

impl MockCluster {
    /// `size` running members with a two-thirds quorum and one block per second.
    pub fn new(size: u32) -> Self {
        let addresses: Vec<Address> =
            (0..size).map(|i| Address::left_padding_from(&(i + 1).to_be_bytes())).collect();
        let chain = Arc::new(Mutex::new(Chain {
            height: 0,
            last_tick: Instant::now(),
            block_interval: DEFAULT_BLOCK_INTERVAL,
            quorum: (size as usize) * 2 / 3 + 1,
            running: (0..size).map(NodeId::new).collect(),
            halted: false,
            charge_fees: false,
            genesis: addresses.iter().map(|a| (*a, U256::from(INITIAL_BALANCE))).collect(),
            txs: Vec::new(),
            tx_counter: 0,
        }));

        let nodes = addresses
            .into_iter()
            .enumerate()
            .map(|(i, address)| {
                Arc::new(MockNode {
                    id: NodeId::new(i as u32),
                    host: format!("10.0.0.{}", i + 1),
                    p2p_port: 30303,
                    address,
                    chain: chain.clone(),
                    state: Mutex::default(),
                })
            })
            .collect();

        Self { chain, nodes }
    }

    pub fn with_block_interval(self, interval: Duration) -> Self {
        {
            let mut chain = lock(&self.chain);
            chain.advance();
            chain.block_interval = interval.max(Duration::from_millis(1));
        }
        self
    }

    /// Charges `21000 * gasPrice` per mined transfer and reports it in receipts.
    pub fn with_fees(self) -> Self {
        lock(&self.chain).charge_fees = true;
        self
    }

    pub fn with_quorum(self, quorum: usize) -> Self {
        lock(&self.chain).quorum = quorum;
        self
    }

    pub fn handles(&self) -> Vec<Arc<dyn NodeHandle>> {
        self.nodes.iter().map(|n| n.clone() as Arc<dyn NodeHandle>).collect()
    }

    pub fn node(&self, id: u32) -> Arc<MockNode> {
        self.nodes.get(id as usize).cloned().expect("node index within cluster")
    }

    pub fn height(&self) -> u64 {
        let mut chain = lock(&self.chain);
        chain.advance();
        chain.height
    }

    /// Stops block production regardless of how many members run.
    pub fn halt(&self) {
        let mut chain = lock(&self.chain);
        chain.advance();
        chain.halted = true;
    }

    pub fn resume(&self) {
        let mut chain = lock(&self.chain);
        chain.advance();
        chain.halted = false;
    }

    pub fn balance(&self, address: Address) -> U256 {
        let mut chain = lock(&self.chain);
        chain.advance();
        chain.balance(address)
    }
}
