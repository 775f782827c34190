//! Static description of the cluster under test.

use std::collections::BTreeSet;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::node_id::NodeId;

/// Default per-request RPC timeout.
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 5_000;

fn default_rpc_timeout_ms() -> u64 {
    DEFAULT_RPC_TIMEOUT_MS
}

fn default_net_interface() -> String {
    "eth0".to_string()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestBed {
    pub nodes: Vec<NodeSpec>,
}

/// How to reach and control one member.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    pub index: NodeId,
    pub host: String,
    pub p2p_port: u16,
    pub rpc_url: Url,
    /// Unlocked account the node signs workload transactions with.
    pub coinbase: Address,
    #[serde(default = "default_net_interface")]
    pub net_interface: String,
    /// Argv prefix that runs a command on the node's host, e.g.
    /// `["docker", "exec", "node0"]` or `["ssh", "root@10.0.0.1"]`. Empty means local.
    #[serde(default)]
    pub exec: Vec<String>,
    #[serde(default)]
    pub lifecycle: LifecycleCommands,
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
}

/// Argv vectors run for lifecycle operations, executed locally.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleCommands {
    #[serde(default)]
    pub stop: Vec<String>,
    #[serde(default)]
    pub start: Vec<String>,
    #[serde(default)]
    pub redeploy: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TestBedError {
    #[error("test bed has no nodes")]
    Empty,

    #[error("node index {0} is listed more than once")]
    DuplicateIndex(NodeId),

    #[error("node {0} has an empty host")]
    EmptyHost(NodeId),
}

impl TestBed {
    pub fn validate(&self) -> Result<(), TestBedError> {
        if self.nodes.is_empty() {
            return Err(TestBedError::Empty);
        }
        let mut seen = BTreeSet::new();
        for node in &self.nodes {
            if !seen.insert(node.index) {
                return Err(TestBedError::DuplicateIndex(node.index));
            }
            if node.host.trim().is_empty() {
                return Err(TestBedError::EmptyHost(node.index));
            }
        }
        Ok(())
    }

    pub fn members(&self) -> BTreeSet<NodeId> {
        self.nodes.iter().map(|n| n.index).collect()
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.index == id)
    }
}
