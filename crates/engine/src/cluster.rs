use std::{collections::BTreeSet, sync::Arc};

use chaosbed_client::NodeHandle;
use chaosbed_types::NodeId;

/// The fixed set of node handles a test case runs against.
#[derive(Clone)]
pub struct Cluster {
    nodes: Arc<[Arc<dyn NodeHandle>]>,
}

impl Cluster {
    pub fn new(nodes: Vec<Arc<dyn NodeHandle>>) -> Self {
        Self { nodes: nodes.into() }
    }

    pub fn nodes(&self) -> &[Arc<dyn NodeHandle>] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Arc<dyn NodeHandle>> {
        self.nodes.iter().find(|n| n.id() == id)
    }

    pub fn members(&self) -> BTreeSet<NodeId> {
        self.nodes.iter().map(|n| n.id()).collect()
    }

    /// Highest height reported by any reachable member, 0 if none answers.
    pub async fn height(&self) -> u64 {
        let mut best = 0;
        for node in self.nodes.iter() {
            if let Some(height) = node.chain_height().await {
                best = best.max(height);
            }
        }
        best
    }

    /// Highest height reported by the given members.
    pub async fn best_height_of(&self, ids: &[NodeId]) -> u64 {
        let mut best = 0;
        for id in ids {
            if let Some(node) = self.node(*id) &&
                let Some(height) = node.chain_height().await
            {
                best = best.max(height);
            }
        }
        best
    }

    /// `"<index>:<host>"` for every member.
    pub fn ip_mapping(&self) -> Vec<String> {
        self.nodes.iter().map(|n| format!("{}:{}", n.id(), n.host())).collect()
    }
}
