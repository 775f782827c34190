//! Declarative test scenarios.
//!
//! A [`Scenario`] pairs a transaction workload with a timeline of
//! [`DisasterStep`]s and the liveness outcome the cluster is expected to show
//! while the disasters are in effect. Scenarios are loaded from YAML
//! playbooks, so validation against the test bed happens separately in
//! [`Scenario::validate`] and reports a typed [`ScenarioError`].

use core::fmt;
use std::{
    collections::{BTreeMap, BTreeSet},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{latency::LatencyMeta, node_id::NodeId};

/// One test case definition.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    /// Human readable name. The part before the first `:` is the case id.
    pub name: String,
    /// Permits `redeploy` steps, which wipe and restart the whole cluster.
    #[serde(default)]
    pub redeploy: bool,
    pub workload: Workload,
    #[serde(default)]
    pub condition: Condition,
    #[serde(default)]
    pub timeline: Vec<DisasterStep>,
    /// Whether the cluster must keep producing blocks under the disasters.
    pub expected_engine_alive: bool,
}

/// Transaction stream issued while the timeline plays out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workload {
    pub duration_seconds: u64,
    pub sender_id: NodeId,
    pub receiver_id: NodeId,
    /// Value of every transfer, in wei.
    pub amount_per_tx: u64,
    /// Offset from the start of the workload phase before the first transfer.
    #[serde(default)]
    pub start_at_seconds: Option<u64>,
}

impl Workload {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_seconds)
    }

    pub fn start_at(&self) -> Option<Duration> {
        self.start_at_seconds.map(Duration::from_secs)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Nodes the timeline is allowed to stop. Every other member is "alive".
    #[serde(default)]
    pub crash_node_ids: BTreeSet<NodeId>,
}

/// A timed disruptive action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum DisasterStep {
    Stop {
        #[serde(default)]
        delay_seconds: u64,
        targets: Vec<NodeId>,
    },
    Start {
        #[serde(default)]
        delay_seconds: u64,
        targets: Vec<NodeId>,
    },
    /// For each pair `(a, b)`, `a` drops all traffic coming from `b`.
    Disconnect {
        #[serde(default)]
        delay_seconds: u64,
        peer_pairs: Vec<(NodeId, NodeId)>,
    },
    Connect {
        #[serde(default)]
        delay_seconds: u64,
        peer_pairs: Vec<(NodeId, NodeId)>,
    },
    Delay {
        #[serde(default)]
        delay_seconds: u64,
        latency: BTreeMap<NodeId, LatencyMeta>,
    },
    Undelay {
        #[serde(default)]
        delay_seconds: u64,
        targets: Vec<NodeId>,
    },
    /// Cold redeploy of the whole cluster.
    Redeploy {
        #[serde(default)]
        delay_seconds: u64,
    },
}

impl DisasterStep {
    pub fn delay(&self) -> Duration {
        let secs = match self {
            Self::Stop { delay_seconds, .. } |
            Self::Start { delay_seconds, .. } |
            Self::Disconnect { delay_seconds, .. } |
            Self::Connect { delay_seconds, .. } |
            Self::Delay { delay_seconds, .. } |
            Self::Undelay { delay_seconds, .. } |
            Self::Redeploy { delay_seconds } => *delay_seconds,
        };
        Duration::from_secs(secs)
    }

    pub fn action(&self) -> &'static str {
        match self {
            Self::Stop { .. } => "stop",
            Self::Start { .. } => "start",
            Self::Disconnect { .. } => "disconnect",
            Self::Connect { .. } => "connect",
            Self::Delay { .. } => "delay",
            Self::Undelay { .. } => "undelay",
            Self::Redeploy { .. } => "redeploy",
        }
    }

    /// Every node id this step refers to, in declaration order.
    pub fn referenced_nodes(&self) -> Vec<NodeId> {
        match self {
            Self::Stop { targets, .. } | Self::Start { targets, .. } | Self::Undelay { targets, .. } => {
                targets.clone()
            }
            Self::Disconnect { peer_pairs, .. } | Self::Connect { peer_pairs, .. } => {
                peer_pairs.iter().flat_map(|(a, b)| [*a, *b]).collect()
            }
            Self::Delay { latency, .. } => latency.keys().copied().collect(),
            Self::Redeploy { .. } => Vec::new(),
        }
    }

    pub fn is_redeploy(&self) -> bool {
        matches!(self, Self::Redeploy { .. })
    }
}

impl fmt::Display for DisasterStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let delay = self.delay().as_secs();
        match self {
            Self::Stop { targets, .. } | Self::Start { targets, .. } | Self::Undelay { targets, .. } => {
                write!(f, "{}({targets:?}) @+{delay}s", self.action())
            }
            Self::Disconnect { peer_pairs, .. } | Self::Connect { peer_pairs, .. } => {
                write!(f, "{}({peer_pairs:?}) @+{delay}s", self.action())
            }
            Self::Delay { latency, .. } => {
                let nodes: Vec<_> = latency.keys().collect();
                write!(f, "delay({nodes:?}) @+{delay}s")
            }
            Self::Redeploy { .. } => write!(f, "redeploy @+{delay}s"),
        }
    }
}

/// Reasons a scenario is rejected before anything is scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScenarioError {
    #[error("crash node {0} is not a member of the test bed")]
    UnknownCrashNode(NodeId),

    #[error("workload {role} {node} is not a member of the test bed")]
    UnknownWorkloadNode { role: &'static str, node: NodeId },

    #[error("step #{step} ({action}) references unknown node {node}")]
    UnknownNode { step: usize, action: &'static str, node: NodeId },

    #[error("step #{step} stops node {node}, which is not listed in condition.crashNodeIds")]
    StopTargetNotCrashNode { step: usize, node: NodeId },

    #[error("step #{step} ({action}) pairs node {node} with itself")]
    SelfPeerPair { step: usize, action: &'static str, node: NodeId },

    #[error("step #{step} redeploys the cluster but the scenario does not enable `redeploy`")]
    RedeployNotEnabled { step: usize },

    #[error("redeploy cannot be combined with per-node steps (step #{step} is {action})")]
    RedeployMixedWithNodeSteps { step: usize, action: &'static str },
}

impl Scenario {
    /// Case identifier: the name up to the first `:`.
    pub fn id(&self) -> &str {
        self.name.split(':').next().unwrap_or_default().trim()
    }

    pub fn is_self_transfer(&self) -> bool {
        self.workload.sender_id == self.workload.receiver_id
    }

    /// Members that the timeline is not allowed to crash.
    pub fn alive_nodes<I>(&self, members: I) -> Vec<NodeId>
    where
        I: IntoIterator<Item = NodeId>,
    {
        members.into_iter().filter(|id| !self.condition.crash_node_ids.contains(id)).collect()
    }

    /// Checks the scenario against the set of cluster members.
    pub fn validate(&self, members: &BTreeSet<NodeId>) -> Result<(), ScenarioError> {
        if let Some(node) = self.condition.crash_node_ids.iter().find(|id| !members.contains(id)) {
            return Err(ScenarioError::UnknownCrashNode(*node));
        }

        for (role, node) in [("sender", self.workload.sender_id), ("receiver", self.workload.receiver_id)]
        {
            if !members.contains(&node) {
                return Err(ScenarioError::UnknownWorkloadNode { role, node });
            }
        }

        let has_redeploy = self.timeline.iter().any(DisasterStep::is_redeploy);

        for (step, disaster) in self.timeline.iter().enumerate() {
            let action = disaster.action();

            if let Some(node) = disaster.referenced_nodes().into_iter().find(|id| !members.contains(id))
            {
                return Err(ScenarioError::UnknownNode { step, action, node });
            }

            match disaster {
                DisasterStep::Stop { targets, .. } => {
                    if let Some(node) =
                        targets.iter().find(|id| !self.condition.crash_node_ids.contains(id))
                    {
                        return Err(ScenarioError::StopTargetNotCrashNode { step, node: *node });
                    }
                }
                DisasterStep::Disconnect { peer_pairs, .. } |
                DisasterStep::Connect { peer_pairs, .. } => {
                    if let Some((node, _)) = peer_pairs.iter().find(|(a, b)| a == b) {
                        return Err(ScenarioError::SelfPeerPair { step, action, node: *node });
                    }
                }
                DisasterStep::Redeploy { .. } if !self.redeploy => {
                    return Err(ScenarioError::RedeployNotEnabled { step });
                }
                _ => {}
            }

            if has_redeploy && !disaster.is_redeploy() {
                return Err(ScenarioError::RedeployMixedWithNodeSteps { step, action });
            }
        }

        Ok(())
    }
}
