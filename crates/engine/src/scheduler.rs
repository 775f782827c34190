//! Timeline scheduler.
//!
//! Every disaster step of a scenario becomes a [`ScheduledAction`] firing at
//! `schedule time + delaySeconds`. Actions live in a queue ordered by
//! `(fire_at, seq)` and are drained by a single background task, so one
//! action runs to completion before the next is looked at. An action is
//! removed from the queue before it runs and therefore fires at most once.
//! The task only exits while holding the queue lock with nothing queued, so
//! an action enqueued at any point is either drained or starts a new task.

use std::{
    collections::BTreeMap,
    fmt,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chaosbed_client::NodeHandle;
use chaosbed_types::{DisasterStep, NodeId, Scenario, ScenarioError};
use color_eyre::eyre::{self, eyre};
use itertools::Itertools;
use tokio::{
    sync::Notify,
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::{debug, info, warn};

use crate::cluster::Cluster;

pub type ActionFuture = Pin<Box<dyn Future<Output = eyre::Result<()>> + Send>>;
type ActionFn = Box<dyn FnOnce() -> ActionFuture + Send>;

/// A one-shot action due at `fire_at`.
pub struct ScheduledAction {
    fire_at: Instant,
    seq: u64,
    label: String,
    run: ActionFn,
}

impl ScheduledAction {
    pub fn new<F, Fut>(fire_at: Instant, seq: u64, label: impl Into<String>, run: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        Self { fire_at, seq, label: label.into(), run: Box::new(move || Box::pin(run())) }
    }

    pub fn fire_at(&self) -> Instant {
        self.fire_at
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl fmt::Debug for ScheduledAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledAction")
            .field("fire_at", &self.fire_at)
            .field("seq", &self.seq)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Outcome counters of the background task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub fired: usize,
    pub failed: usize,
}

#[derive(Default)]
struct Queue {
    actions: BTreeMap<(Instant, u64), ScheduledAction>,
    /// Set while a background task owns the queue.
    draining: bool,
    stats: SchedulerStats,
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    wake: Notify,
}

impl Shared {
    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub struct Scheduler {
    cluster: Cluster,
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new(cluster: Cluster) -> Self {
        Self {
            cluster,
            shared: Arc::new(Shared::default()),
            task: None,
            next_seq: 0,
        }
    }

    /// Validates `scenario` and queues its timeline relative to now.
    ///
    /// Nothing is queued when validation fails.
    pub fn schedule(&mut self, scenario: &Scenario) -> Result<(), ScenarioError> {
        scenario.validate(&self.cluster.members())?;

        let base = Instant::now();
        let actions: Vec<_> = scenario
            .timeline
            .iter()
            .enumerate()
            .map(|(index, step)| {
                let cluster = self.cluster.clone();
                let owned = step.clone();
                let label = format!("#{index} {step}");
                ScheduledAction::new(base + step.delay(), self.next_seq + index as u64, label, {
                    move || async move { execute_step(&cluster, &owned).await }
                })
            })
            .collect();

        info!(scenario = %scenario.name, steps = actions.len(), "Scheduling disaster timeline");
        self.enqueue(actions);
        Ok(())
    }

    /// Queues prepared actions and makes sure the background task runs.
    pub fn enqueue(&mut self, actions: Vec<ScheduledAction>) {
        let spawn = {
            let mut queue = self.shared.queue();
            for action in actions {
                self.next_seq = self.next_seq.max(action.seq + 1);
                queue.actions.insert((action.fire_at, action.seq), action);
            }
            // A task that died in a panicking action never clears the flag.
            let spawn = !queue.draining || self.task_finished();
            queue.draining = true;
            spawn
        };

        if spawn {
            self.task = Some(tokio::spawn(drain(self.shared.clone())));
        } else {
            self.shared.wake.notify_one();
        }
    }

    fn task_finished(&self) -> bool {
        self.task.as_ref().is_none_or(|task| task.is_finished())
    }

    /// Whether an action is still queued or running.
    pub fn is_active(&self) -> bool {
        let queue = self.shared.queue();
        !queue.actions.is_empty() || (queue.draining && !self.task_finished())
    }

    /// Drops every action that has not fired yet; returns how many were dropped.
    ///
    /// An action already running is left to complete.
    pub fn cancel_all(&self) -> usize {
        let cancelled = {
            let mut queue = self.shared.queue();
            let n = queue.actions.len();
            queue.actions.clear();
            n
        };
        self.shared.wake.notify_one();
        if cancelled > 0 {
            info!(cancelled, "Cancelled pending disaster actions");
        }
        cancelled
    }

    /// Waits for the background task. Returns `false` if `timeout` elapsed first.
    pub async fn join(&mut self, timeout: Option<Duration>) -> bool {
        let Some(task) = self.task.as_mut() else {
            return true;
        };

        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut *task).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!(?limit, "Scheduler did not finish in time");
                    return false;
                }
            },
            None => task.await,
        };
        self.task = None;

        if let Err(e) = joined {
            warn!(error = %e, "Scheduler task ended abnormally");
            self.shared.queue().draining = false;
        }
        true
    }

    /// Counters of every action fired so far.
    pub fn stats(&self) -> SchedulerStats {
        self.shared.queue().stats
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Background loop: fires due actions in `(fire_at, seq)` order until the
/// queue is empty.
async fn drain(shared: Arc<Shared>) {
    loop {
        let next = {
            let mut queue = shared.queue();
            let next = queue.actions.first_key_value().map(|((at, _), _)| *at);
            let Some(next) = next else {
                queue.draining = false;
                return;
            };
            next
        };

        tokio::select! {
            _ = sleep_until(next) => {}
            // Queue changed; look again.
            _ = shared.wake.notified() => continue,
        }

        let due = {
            let mut queue = shared.queue();
            match queue.actions.first_entry() {
                Some(entry) if entry.key().0 <= Instant::now() => Some(entry.remove()),
                _ => None,
            }
        };
        let Some(action) = due else { continue };

        debug!(action = %action.label, "Firing disaster action");
        let outcome = (action.run)().await;

        let mut queue = shared.queue();
        queue.stats.fired += 1;
        match outcome {
            Ok(()) => info!(action = %action.label, "Disaster action completed"),
            Err(e) => {
                queue.stats.failed += 1;
                warn!(action = %action.label, error = %e, "Disaster action failed");
            }
        }
    }
}

/// Runs one disaster step against the cluster.
///
/// Every node call of the step is attempted; the step fails if any of them did.
pub(crate) async fn execute_step(cluster: &Cluster, step: &DisasterStep) -> eyre::Result<()> {
    let mut failures = Vec::new();
    let mut record = |node: NodeId, outcome: eyre::Result<()>| {
        if let Err(e) = outcome {
            failures.push(format!("node {node}: {e}"));
        }
    };

    match step {
        DisasterStep::Stop { targets, .. } => {
            for node in resolve(cluster, targets)? {
                record(node.id(), node.stop().await);
            }
        }
        DisasterStep::Start { targets, .. } => {
            for node in resolve(cluster, targets)? {
                record(node.id(), node.start().await);
            }
        }
        DisasterStep::Disconnect { peer_pairs, .. } => {
            for (node, peer) in resolve_pairs(cluster, peer_pairs)? {
                record(node.id(), node.disconnect_peer(peer.host(), peer.p2p_port()).await);
            }
        }
        DisasterStep::Connect { peer_pairs, .. } => {
            for (node, peer) in resolve_pairs(cluster, peer_pairs)? {
                record(node.id(), node.connect_peer(peer.host(), peer.p2p_port()).await);
            }
        }
        DisasterStep::Delay { latency, .. } => {
            for (id, meta) in latency {
                let node = lookup(cluster, *id)?;
                record(node.id(), node.set_link_delay(*meta).await);
            }
        }
        DisasterStep::Undelay { targets, .. } => {
            for node in resolve(cluster, targets)? {
                record(node.id(), node.cancel_link_delay().await);
            }
        }
        DisasterStep::Redeploy { .. } => {
            for node in cluster.nodes() {
                record(node.id(), node.redeploy().await);
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(eyre!("{} node call(s) failed: {}", failures.len(), failures.iter().join("; ")))
    }
}

fn lookup(cluster: &Cluster, id: NodeId) -> eyre::Result<Arc<dyn NodeHandle>> {
    cluster.node(id).cloned().ok_or_else(|| eyre!("node {id} is not part of the cluster"))
}

fn resolve(cluster: &Cluster, ids: &[NodeId]) -> eyre::Result<Vec<Arc<dyn NodeHandle>>> {
    ids.iter().map(|id| lookup(cluster, *id)).collect()
}

fn resolve_pairs(
    cluster: &Cluster,
    pairs: &[(NodeId, NodeId)],
) -> eyre::Result<Vec<(Arc<dyn NodeHandle>, Arc<dyn NodeHandle>)>> {
    pairs.iter().map(|(a, b)| Ok((lookup(cluster, *a)?, lookup(cluster, *b)?))).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chaosbed_test_support::{
        MockCluster,
        fixtures::{delay, disconnect, scenario, start, stop, undelay},
    };
    use proptest::prelude::*;

    use super::*;

    fn setup(size: u32) -> (MockCluster, Scheduler) {
        let mock = MockCluster::new(size);
        let scheduler = Scheduler::new(Cluster::new(mock.handles()));
        (mock, scheduler)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_steps_at_their_offsets() {
        let (mock, mut scheduler) = setup(4);
        let s = scenario("TC-1", &[2], vec![stop(2, &[2]), start(8, &[2])], 10, 1, true);

        let start_at = Instant::now();
        scheduler.schedule(&s).unwrap();
        assert!(scheduler.is_active());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!mock.node(2).is_running());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(mock.node(2).is_running());

        assert!(scheduler.join(Some(Duration::from_secs(1))).await);
        assert!(!scheduler.is_active());
        assert_eq!(scheduler.stats(), SchedulerStats { fired: 2, failed: 0 });
        assert!(start_at.elapsed() >= Duration::from_secs(8));
    }

    #[tokio::test]
    async fn invalid_scenario_queues_nothing() {
        let (mock, mut scheduler) = setup(4);
        let s = scenario("TC-2", &[1], vec![stop(0, &[1, 2])], 5, 1, true);

        assert_eq!(
            scheduler.schedule(&s),
            Err(ScenarioError::StopTargetNotCrashNode { step: 0, node: NodeId::new(2) })
        );
        assert!(!scheduler.is_active());
        assert!(scheduler.join(None).await);
        assert!(mock.node(1).calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_drops_pending_actions() {
        let (mock, mut scheduler) = setup(4);
        let s = scenario("TC-3", &[3], vec![stop(1, &[3]), start(30, &[3])], 5, 1, true);
        scheduler.schedule(&s).unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(scheduler.cancel_all(), 1);
        assert!(scheduler.join(Some(Duration::from_secs(1))).await);

        assert!(!scheduler.is_active());
        assert_eq!(mock.node(3).calls(), vec!["stop"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_step_does_not_abort_siblings() {
        let (mock, mut scheduler) = setup(4);
        mock.node(1).fail_operation("delay");
        let s = scenario(
            "TC-4",
            &[],
            vec![delay(0, &[1, 2], 200.0), disconnect(1, &[(0, 3)]), undelay(2, &[2])],
            5,
            1,
            true,
        );
        scheduler.schedule(&s).unwrap();
        assert!(scheduler.join(None).await);

        assert_eq!(scheduler.stats(), SchedulerStats { fired: 3, failed: 1 });
        assert_eq!(mock.node(2).calls(), vec!["delay", "undelay"]);
        assert_eq!(mock.node(0).calls(), vec!["disconnect 10.0.0.4"]);
        assert_eq!(mock.node(0).disruption().disconnected, vec![("10.0.0.4".to_string(), 30303)]);
    }

    #[tokio::test(start_paused = true)]
    async fn join_times_out_while_actions_pending() {
        let (_mock, mut scheduler) = setup(4);
        let s = scenario("TC-5", &[1], vec![stop(100, &[1])], 5, 1, true);
        scheduler.schedule(&s).unwrap();

        assert!(!scheduler.join(Some(Duration::from_secs(1))).await);
        assert!(scheduler.is_active());
        scheduler.cancel_all();
        assert!(scheduler.join(Some(Duration::from_secs(1))).await);
    }

    fn recording(at: Instant, seq: u64, fired: &Arc<Mutex<Vec<u64>>>) -> ScheduledAction {
        let fired = fired.clone();
        ScheduledAction::new(at, seq, format!("a{seq}"), move || async move {
            fired.lock().unwrap().push(seq);
            Ok(())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_after_queue_ran_dry_still_fires() {
        let (_mock, mut scheduler) = setup(1);
        let fired = Arc::new(Mutex::new(Vec::new()));

        scheduler.enqueue(vec![recording(Instant::now(), 0, &fired)]);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!scheduler.is_active());

        // The first task may or may not have been reaped yet.
        scheduler.enqueue(vec![recording(Instant::now() + Duration::from_secs(1), 1, &fired)]);
        assert!(scheduler.is_active());
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert!(!scheduler.is_active());
        assert!(scheduler.join(Some(Duration::from_secs(1))).await);
        assert_eq!(*fired.lock().unwrap(), vec![0, 1]);
        assert_eq!(scheduler.stats(), SchedulerStats { fired: 2, failed: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn enqueue_restarts_after_a_panicking_action() {
        let (_mock, mut scheduler) = setup(1);
        let fired = Arc::new(Mutex::new(Vec::new()));

        async fn explode() -> eyre::Result<()> {
            panic!("action blew up")
        }
        scheduler.enqueue(vec![ScheduledAction::new(Instant::now(), 0, "boom", explode)]);
        tokio::time::sleep(Duration::from_millis(10)).await;

        scheduler.enqueue(vec![recording(Instant::now(), 1, &fired)]);
        assert!(scheduler.join(Some(Duration::from_secs(1))).await);
        assert_eq!(*fired.lock().unwrap(), vec![1]);
        assert!(!scheduler.is_active());
    }

    fn fire_order(delays: &[u64]) -> Vec<u64> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async {
            let mock = MockCluster::new(1);
            let mut scheduler = Scheduler::new(Cluster::new(mock.handles()));
            let fired = Arc::new(Mutex::new(Vec::new()));
            let base = Instant::now();

            let actions = delays
                .iter()
                .enumerate()
                .map(|(i, d)| recording(base + Duration::from_secs(*d), i as u64, &fired))
                .collect();
            scheduler.enqueue(actions);
            assert!(scheduler.join(None).await);

            fired.lock().unwrap().clone()
        })
    }

    proptest! {
        #[test]
        fn fires_in_time_then_timeline_order(delays in proptest::collection::vec(0u64..5, 1..12)) {
            let mut expected: Vec<(u64, u64)> =
                delays.iter().enumerate().map(|(i, d)| (*d, i as u64)).collect();
            expected.sort();
            let expected: Vec<u64> = expected.into_iter().map(|(_, seq)| seq).collect();

            prop_assert_eq!(fire_order(&delays), expected);
        }
    }
}
