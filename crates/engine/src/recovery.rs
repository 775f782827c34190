//! Disaster recovery and convergence polling.

use std::{
    collections::BTreeSet,
    sync::{Mutex, MutexGuard},
    time::Duration,
};

use chaosbed_client::poll_until;
use chaosbed_types::NodeId;
use tracing::{debug, info, warn};

use crate::{cluster::Cluster, config::EngineConfig};

pub struct RecoveryController {
    cluster: Cluster,
    config: EngineConfig,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl RecoveryController {
    pub fn new(cluster: Cluster, config: EngineConfig) -> Self {
        Self { cluster, config }
    }

    /// Heals every node. True only if every node healed cleanly.
    pub async fn recover(&self) -> bool {
        let mut healthy = true;
        for node in self.cluster.nodes() {
            if let Err(e) = node.heal().await {
                warn!(node = %node.id(), error = %e, "Recovery incomplete");
                healthy = false;
            }
        }
        info!(healthy, "Recovery actions finished");
        healthy
    }

    /// Waits until every node has caught up with the best height seen when
    /// the wait began. Nodes stay marked once they have caught up.
    pub async fn is_healed(&self, timeout: Duration) -> bool {
        let target = self.cluster.height().await;
        let total = self.cluster.len();
        let healed: Mutex<BTreeSet<NodeId>> = Mutex::new(BTreeSet::new());
        debug!(target, total, "Waiting for the cluster to converge");

        let cluster = &self.cluster;
        let healed_ref = &healed;
        let converged = poll_until(self.config.poll_interval(), timeout, move || async move {
            for node in cluster.nodes() {
                let id = node.id();
                let done = lock(healed_ref).contains(&id);
                if done {
                    continue;
                }
                if let Some(height) = node.chain_height().await &&
                    height >= target
                {
                    debug!(node = %id, height, "Node caught up");
                    lock(healed_ref).insert(id);
                }
            }
            let count = lock(healed_ref).len();
            (count == total).then_some(())
        })
        .await
        .is_some();

        if converged {
            info!(target, "Cluster converged");
        } else {
            let pending: Vec<_> = self
                .cluster
                .members()
                .difference(&lock(&healed))
                .copied()
                .collect();
            warn!(?timeout, ?pending, "Disaster recovery timed out");
        }
        converged
    }
}
