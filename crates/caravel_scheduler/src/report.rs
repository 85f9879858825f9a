//! Run reports: the scheduler's account of what happened to every node.

use core::fmt;
use std::collections::BTreeMap;

use caravel_cluster::ResourceKey;
use caravel_graph::{Cycle, NodeStatus};

/// Overall verdict of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every node ended `Ready` (and any requested delete pass succeeded).
    Succeeded,
    /// At least one node ended `Error` or `Skipped`, or the delete pass or
    /// a cluster-level call failed.
    Failed,
    /// The stop signal was raised mid-run; in-flight work drained but no
    /// new work was dispatched.
    Cancelled,
    /// The graph contained dependency cycles; execution never started.
    Rejected,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Succeeded => f.write_str("succeeded"),
            RunOutcome::Failed => f.write_str("failed"),
            RunOutcome::Cancelled => f.write_str("cancelled"),
            RunOutcome::Rejected => f.write_str("rejected"),
        }
    }
}

/// The full account of one run. Always enumerates every node's final
/// status, so callers can see exactly what was and wasn't deployed.
#[derive(Debug)]
pub struct RunReport {
    /// Overall verdict.
    pub outcome: RunOutcome,
    /// Final status of every node, keyed and sorted by resource key.
    pub statuses: BTreeMap<ResourceKey, NodeStatus>,
    /// Per-node failure detail, including why skipped nodes were skipped.
    pub errors: Vec<(ResourceKey, String)>,
    /// The cycles that caused a `Rejected` outcome; empty otherwise.
    pub cycles: Vec<Cycle>,
    /// Resources removed by the external-delete pass.
    pub deleted: Vec<ResourceKey>,
    /// A run-level failure that is not attributable to a single node, such
    /// as the cluster becoming unreachable during the delete pass.
    pub fatal: Option<String>,
}

impl RunReport {
    pub(crate) fn rejected(cycles: Vec<Cycle>, statuses: BTreeMap<ResourceKey, NodeStatus>) -> Self {
        Self {
            outcome: RunOutcome::Rejected,
            statuses,
            errors: Vec::new(),
            cycles,
            deleted: Vec::new(),
            fatal: None,
        }
    }

    /// Returns true only for a fully successful run.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }

    /// Number of nodes that ended in the given status.
    #[must_use]
    pub fn count(&self, status: NodeStatus) -> usize {
        self.statuses.values().filter(|s| **s == status).count()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "run {}", self.outcome)?;
        for (key, status) in &self.statuses {
            writeln!(f, "  {key}: {status}")?;
        }
        for cycle in &self.cycles {
            writeln!(f, "  cycle: {cycle}")?;
        }
        for (key, error) in &self.errors {
            writeln!(f, "  error {key}: {error}")?;
        }
        for key in &self.deleted {
            writeln!(f, "  deleted {key}")?;
        }
        if let Some(fatal) = &self.fatal {
            writeln!(f, "  fatal: {fatal}")?;
        }
        Ok(())
    }
}
