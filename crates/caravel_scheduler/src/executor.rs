//! The bounded-concurrency execution engine.
//!
//! [`Scheduler::run`] drives a built [`DependencyGraph`] to a terminal
//! state: every node ends `Ready`, `Error`, or `Skipped` (or stays
//! `Pending` under cancellation). The orchestrator loop is the single
//! writer of node statuses; workers only create resources and probe
//! readiness, then report back through a [`JoinSet`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use caravel_cluster::{ClusterClient, ResourceHandle, ResourceKey, RunMode, Selector};
use caravel_graph::{DependencyGraph, GraphOptions, Node, NodeStatus, detect_cycles};
use hashbrown::HashMap;
use tokio::sync::watch;
use tokio::task::{Id, JoinSet};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::report::{RunOutcome, RunReport};

/// Executes dependency graphs with a fixed worker budget.
///
/// One scheduler can run many graphs; each call to [`run`](Self::run) is
/// independent. Construction clamps a zero concurrency request to 1, so a
/// scheduler always makes progress.
pub struct Scheduler {
    client: Arc<dyn ClusterClient>,
    selector: Selector,
    concurrency: usize,
    mode: RunMode,
    probe_interval: Duration,
    probe_attempts: u32,
}

impl Scheduler {
    /// Creates a scheduler deploying through the given client, scoped by
    /// the selector that listed the graph's definitions.
    #[must_use]
    pub fn new(client: Arc<dyn ClusterClient>, selector: Selector, concurrency: usize) -> Self {
        let concurrency = if concurrency == 0 {
            warn!("concurrency 0 requested, clamping to 1");
            1
        } else {
            concurrency
        };
        Self {
            client,
            selector,
            concurrency,
            mode: RunMode::Create,
            probe_interval: Duration::from_millis(200),
            probe_attempts: 60,
        }
    }

    /// Sets how existing resources are treated.
    #[must_use]
    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the pause between readiness probes.
    #[must_use]
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Sets how many readiness probes a node gets before it is failed.
    #[must_use]
    pub fn with_probe_attempts(mut self, attempts: u32) -> Self {
        self.probe_attempts = attempts;
        self
    }

    // ─────────────────────────────────────────────────────────────────────
    // Orchestrator loop
    // ─────────────────────────────────────────────────────────────────────

    /// Runs the graph to a terminal state.
    ///
    /// Cyclic graphs are rejected before any node is dispatched. Raising
    /// the `stop` signal stops new admissions; in-flight workers drain to
    /// their natural terminal status and the run reports `Cancelled`.
    pub async fn run(
        &self,
        graph: &mut DependencyGraph,
        options: &GraphOptions,
        mut stop: watch::Receiver<bool>,
    ) -> RunReport {
        let cycles = detect_cycles(graph);
        if !cycles.is_empty() {
            warn!(count = cycles.len(), "rejecting cyclic graph");
            return RunReport::rejected(cycles, graph.statuses());
        }
        info!(
            nodes = graph.len(),
            concurrency = self.concurrency,
            mode = %self.mode,
            "starting run"
        );

        let mut errors: Vec<(ResourceKey, String)> = Vec::new();
        let mut cancelled = *stop.borrow_and_update();
        let mut stop_closed = false;
        let mut workers: JoinSet<Result<(), String>> = JoinSet::new();
        let mut in_flight: HashMap<Id, ResourceKey> = HashMap::new();

        loop {
            cascade_skips(graph, &mut errors);
            if !cancelled {
                self.admit(graph, &mut workers, &mut in_flight);
            }
            if workers.is_empty() {
                break;
            }

            tokio::select! {
                joined = workers.join_next_with_id() => match joined {
                    Some(Ok((id, result))) => {
                        if let Some(key) = in_flight.remove(&id) {
                            match result {
                                Ok(()) => {
                                    debug!(%key, "node ready");
                                    graph.set_status(&key, NodeStatus::Ready);
                                }
                                Err(reason) => {
                                    warn!(%key, %reason, "node failed");
                                    graph.set_status(&key, NodeStatus::Error);
                                    errors.push((key, reason));
                                }
                            }
                        }
                    }
                    Some(Err(join_error)) => {
                        // A worker panicked or was aborted; fail its node
                        // and keep the run going.
                        if let Some(key) = in_flight.remove(&join_error.id()) {
                            warn!(%key, %join_error, "worker task failed");
                            graph.set_status(&key, NodeStatus::Error);
                            errors.push((key, format!("worker task failed: {join_error}")));
                        }
                    }
                    None => {}
                },
                changed = stop.changed(), if !cancelled && !stop_closed => match changed {
                    Ok(()) => {
                        if *stop.borrow_and_update() {
                            info!("stop signal received, draining in-flight work");
                            cancelled = true;
                        }
                    }
                    Err(_) => stop_closed = true,
                },
            }
        }

        self.finish(graph, options, errors, cancelled).await
    }

    /// Dispatches every admissible `Pending` node, up to the concurrency
    /// bound. Flow-instance nodes carry no work: they turn `Ready` on
    /// admission, which may unlock further nodes within the same pass.
    fn admit(
        &self,
        graph: &mut DependencyGraph,
        workers: &mut JoinSet<Result<(), String>>,
        in_flight: &mut HashMap<Id, ResourceKey>,
    ) {
        loop {
            let mut progressed = false;
            for key in graph.sorted_keys() {
                if graph.status_of(&key) != Some(NodeStatus::Pending) {
                    continue;
                }
                let unlocked = graph
                    .dependencies_of(&key)
                    .iter()
                    .all(|dep| graph.status_of(dep) == Some(NodeStatus::Ready));
                if !unlocked {
                    continue;
                }

                match graph.get(&key).and_then(Node::handle) {
                    Some(handle) => {
                        if in_flight.len() >= self.concurrency {
                            continue;
                        }
                        debug!(%key, "dispatching node");
                        let worker = drive(
                            Arc::clone(handle),
                            self.mode,
                            self.probe_interval,
                            self.probe_attempts,
                        );
                        let abort = workers.spawn(worker);
                        in_flight.insert(abort.id(), key.clone());
                        graph.set_status(&key, NodeStatus::Running);
                    }
                    None => {
                        debug!(%key, "flow instance complete");
                        graph.set_status(&key, NodeStatus::Ready);
                    }
                }
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
    }

    /// Computes the verdict and runs the external-delete pass if the run
    /// earned it.
    async fn finish(
        &self,
        graph: &DependencyGraph,
        options: &GraphOptions,
        mut errors: Vec<(ResourceKey, String)>,
        cancelled: bool,
    ) -> RunReport {
        let statuses: BTreeMap<ResourceKey, NodeStatus> = graph.statuses();
        let all_ready = statuses.values().all(|s| *s == NodeStatus::Ready);
        let mut outcome = if cancelled {
            RunOutcome::Cancelled
        } else if all_ready {
            RunOutcome::Succeeded
        } else {
            RunOutcome::Failed
        };

        let mut deleted = Vec::new();
        let mut fatal = None;
        if outcome == RunOutcome::Succeeded && options.allow_delete_external {
            match self.client.list_managed(&self.selector) {
                Ok(managed) => {
                    for key in managed {
                        if graph.contains(&key) {
                            continue;
                        }
                        match self.client.delete(key.clone()).await {
                            Ok(()) => {
                                info!(%key, "deleted external resource");
                                deleted.push(key);
                            }
                            Err(error) => {
                                warn!(%key, %error, "external delete failed");
                                errors.push((key, error.to_string()));
                                outcome = RunOutcome::Failed;
                            }
                        }
                    }
                }
                Err(error) => {
                    warn!(%error, "listing managed resources failed");
                    fatal = Some(error.to_string());
                    outcome = RunOutcome::Failed;
                }
            }
        }

        info!(outcome = %outcome, errors = errors.len(), "run finished");
        RunReport {
            outcome,
            statuses,
            errors,
            cycles: Vec::new(),
            deleted,
            fatal,
        }
    }
}

/// Marks every `Pending` node with a failed dependency as `Skipped`,
/// transitively, recording why.
fn cascade_skips(graph: &mut DependencyGraph, errors: &mut Vec<(ResourceKey, String)>) {
    loop {
        let mut to_skip: Vec<(ResourceKey, ResourceKey, NodeStatus)> = Vec::new();
        for key in graph.sorted_keys() {
            if graph.status_of(&key) != Some(NodeStatus::Pending) {
                continue;
            }
            let failed_dep = graph
                .dependencies_of(&key)
                .iter()
                .find(|dep| graph.status_of(dep).is_some_and(|s| s.is_failure()));
            if let Some(dep) = failed_dep {
                let status = graph.status_of(dep).unwrap_or(NodeStatus::Error);
                to_skip.push((key.clone(), dep.clone(), status));
            }
        }
        if to_skip.is_empty() {
            break;
        }
        for (key, dep, dep_status) in to_skip {
            debug!(%key, %dep, "skipping node, dependency failed");
            graph.set_status(&key, NodeStatus::Skipped);
            errors.push((key, format!("skipped: dependency {dep} ended {dep_status}")));
        }
    }
}

/// One worker's life: create the resource, then poll readiness until it
/// turns true or the attempt budget runs out.
async fn drive(
    handle: Arc<dyn ResourceHandle>,
    mode: RunMode,
    interval: Duration,
    attempts: u32,
) -> Result<(), String> {
    handle.create(mode).await.map_err(|e| e.to_string())?;
    for _ in 0..attempts {
        match handle.ready().await {
            Ok(true) => return Ok(()),
            Ok(false) => sleep(interval).await,
            Err(error) => return Err(error.to_string()),
        }
    }
    Err(format!("did not become ready within {attempts} probes"))
}
