//! Scenario builders for tests.

use std::collections::BTreeMap;

use chaosbed_types::{Condition, DisasterStep, LatencyMeta, NodeId, Scenario, Workload};

fn ids(nodes: &[u32]) -> Vec<NodeId> {
    nodes.iter().copied().map(NodeId::new).collect()
}

fn pairs(nodes: &[(u32, u32)]) -> Vec<(NodeId, NodeId)> {
    nodes.iter().map(|(a, b)| (NodeId::new(*a), NodeId::new(*b))).collect()
}

/// A scenario sending `amount` per transfer from node 0 to node 1 for `duration_seconds`.
pub fn scenario(
    name: &str,
    crash: &[u32],
    timeline: Vec<DisasterStep>,
    duration_seconds: u64,
    amount: u64,
    expected_engine_alive: bool,
) -> Scenario {
    Scenario {
        name: name.to_string(),
        redeploy: false,
        workload: Workload {
            duration_seconds,
            sender_id: NodeId::new(0),
            receiver_id: NodeId::new(1),
            amount_per_tx: amount,
            start_at_seconds: None,
        },
        condition: Condition { crash_node_ids: ids(crash).into_iter().collect() },
        timeline,
        expected_engine_alive,
    }
}

pub fn stop(delay_seconds: u64, targets: &[u32]) -> DisasterStep {
    DisasterStep::Stop { delay_seconds, targets: ids(targets) }
}

pub fn start(delay_seconds: u64, targets: &[u32]) -> DisasterStep {
    DisasterStep::Start { delay_seconds, targets: ids(targets) }
}

pub fn disconnect(delay_seconds: u64, peer_pairs: &[(u32, u32)]) -> DisasterStep {
    DisasterStep::Disconnect { delay_seconds, peer_pairs: pairs(peer_pairs) }
}

pub fn connect(delay_seconds: u64, peer_pairs: &[(u32, u32)]) -> DisasterStep {
    DisasterStep::Connect { delay_seconds, peer_pairs: pairs(peer_pairs) }
}

/// Delays every listed node by `delay_ms`, other netem parameters at their defaults.
pub fn delay(delay_seconds: u64, targets: &[u32], delay_ms: f64) -> DisasterStep {
    let latency: BTreeMap<NodeId, LatencyMeta> = ids(targets)
        .into_iter()
        .map(|id| (id, LatencyMeta::default().with_delay_ms(delay_ms)))
        .collect();
    DisasterStep::Delay { delay_seconds, latency }
}

pub fn undelay(delay_seconds: u64, targets: &[u32]) -> DisasterStep {
    DisasterStep::Undelay { delay_seconds, targets: ids(targets) }
}

pub fn redeploy(delay_seconds: u64) -> DisasterStep {
    DisasterStep::Redeploy { delay_seconds }
}
