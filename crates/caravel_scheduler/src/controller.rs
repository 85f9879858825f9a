//! The run trigger boundary.
//!
//! Deployments are triggered by control objects: small key/value payloads
//! delivered by whatever watches the cluster. [`RunManager`] owns the
//! lifecycle of the triggered run. It is explicit state, not an ambient
//! global, and it supervises at most one run at a time: applying a new
//! control object replaces (cancels and joins) the previous run, and
//! removing the object cancels it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use caravel_cluster::{ClusterClient, RunMode, Selector, SelectorError};
use caravel_graph::builder::BuildError;
use caravel_graph::{GraphBuilder, GraphOptions};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::executor::Scheduler;
use crate::report::RunReport;

/// Control-object data key holding the worker budget.
pub const CONCURRENCY_KEY: &str = "concurrency";

/// Control-object data key holding the label selector.
pub const SELECTOR_KEY: &str = "selector";

/// Errors raised while parsing a control object or building its graph.
/// Any of these means the run was never started.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// The concurrency value is present but not a positive integer.
    #[error("invalid concurrency value {0:?}")]
    InvalidConcurrency(String),

    /// The selector value does not parse.
    #[error(transparent)]
    Selector(#[from] SelectorError),

    /// Graph construction failed.
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// The payload of a run-triggering control object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlObject {
    /// Raw key/value parameters.
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl ControlObject {
    /// Creates an empty control object (all defaults).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a data key.
    #[must_use]
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.data.insert(key.to_owned(), value.to_owned());
        self
    }

    /// The requested worker budget. A missing key defaults to 1; a present
    /// value must be a positive integer, anything else is a validation
    /// error.
    pub fn concurrency(&self) -> Result<usize, ControlError> {
        match self.data.get(CONCURRENCY_KEY) {
            None => Ok(1),
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(n) if n >= 1 => Ok(n),
                _ => Err(ControlError::InvalidConcurrency(raw.clone())),
            },
        }
    }

    /// The requested selector. A missing key means match-all.
    pub fn selector(&self) -> Result<Selector, ControlError> {
        match self.data.get(SELECTOR_KEY) {
            None => Ok(Selector::match_all()),
            Some(raw) => Ok(Selector::parse(raw)?),
        }
    }
}

/// What the watching layer observed about the control object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// The control object was created or updated.
    Applied(ControlObject),
    /// The control object was deleted.
    Removed,
}

struct ActiveRun {
    join: JoinHandle<RunReport>,
    stop: watch::Sender<bool>,
}

/// Supervises the single run a control object may have in flight.
pub struct RunManager {
    client: Arc<dyn ClusterClient>,
    mode: RunMode,
    options: GraphOptions,
    probe_interval: Duration,
    probe_attempts: u32,
    active: Option<ActiveRun>,
}

impl RunManager {
    /// Creates a manager with no active run, deploying through the given
    /// client.
    #[must_use]
    pub fn new(client: Arc<dyn ClusterClient>) -> Self {
        Self {
            client,
            mode: RunMode::Create,
            options: GraphOptions::new(),
            probe_interval: Duration::from_millis(200),
            probe_attempts: 60,
            active: None,
        }
    }

    /// Sets how triggered runs treat existing resources.
    #[must_use]
    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the graph options triggered runs are built with.
    #[must_use]
    pub fn with_options(mut self, options: GraphOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the pause between readiness probes for triggered runs.
    #[must_use]
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Sets the readiness probe budget for triggered runs.
    #[must_use]
    pub fn with_probe_attempts(mut self, attempts: u32) -> Self {
        self.probe_attempts = attempts;
        self
    }

    /// Returns true while a triggered run is still executing.
    #[must_use]
    pub fn has_active_run(&self) -> bool {
        self.active.as_ref().is_some_and(|run| !run.join.is_finished())
    }

    /// Reacts to a control-object event.
    ///
    /// `Applied` parses the object's parameters, builds the graph, and
    /// starts a supervised run, first cancelling any run already in flight;
    /// its report (if any) is returned. `Removed` cancels the active run
    /// and returns its report.
    ///
    /// # Errors
    ///
    /// Returns a [`ControlError`] when the parameters do not parse or the
    /// graph does not build; no run is started in that case.
    pub async fn handle_event(
        &mut self,
        event: ControlEvent,
    ) -> Result<Option<RunReport>, ControlError> {
        match event {
            ControlEvent::Applied(object) => {
                let concurrency = object.concurrency()?;
                let selector = object.selector()?;

                let mut graph =
                    GraphBuilder::new(self.client.as_ref(), selector.clone()).build(&self.options)?;

                let replaced = self.cancel_active().await;
                if replaced.is_some() {
                    info!("replaced an in-flight run");
                }

                info!(concurrency, selector = %selector, "control object applied, starting run");
                let scheduler =
                    Scheduler::new(Arc::clone(&self.client), selector, concurrency)
                        .with_mode(self.mode)
                        .with_probe_interval(self.probe_interval)
                        .with_probe_attempts(self.probe_attempts);
                let options = self.options.clone();
                let (stop, stop_rx) = watch::channel(false);
                let join = tokio::spawn(async move {
                    scheduler.run(&mut graph, &options, stop_rx).await
                });
                self.active = Some(ActiveRun { join, stop });
                Ok(replaced)
            }
            ControlEvent::Removed => {
                info!("control object removed, cancelling run");
                Ok(self.cancel_active().await)
            }
        }
    }

    /// Raises the stop signal on the active run and waits for its report.
    pub async fn cancel_active(&mut self) -> Option<RunReport> {
        let run = self.active.take()?;
        let _ = run.stop.send(true);
        match run.join.await {
            Ok(report) => Some(report),
            Err(error) => {
                warn!(%error, "run task failed");
                None
            }
        }
    }

    /// Waits for the active run to finish on its own, without cancelling.
    pub async fn shutdown(&mut self) -> Option<RunReport> {
        let run = self.active.take()?;
        match run.join.await {
            Ok(report) => Some(report),
            Err(error) => {
                warn!(%error, "run task failed");
                None
            }
        }
    }
}
