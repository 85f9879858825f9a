//! Per-run graph construction options.

use std::collections::BTreeMap;
use std::str::FromStr;

/// Raised when a replica count string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid replica count format: {0:?}")]
pub struct ReplicaParseError(pub String);

/// Requested replica count for a flow-scoped run.
///
/// `Absolute` pins the total number of replicas; `Delta` adjusts relative to
/// the count already present in the cluster. The textual forms are `"3"`
/// (absolute), `"+2"` (grow) and `"-1"` (shrink).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicaSpec {
    /// Desired total replica count.
    Absolute(usize),
    /// Adjustment applied to the existing replica count.
    Delta(isize),
}

impl ReplicaSpec {
    /// Resolves the spec against the existing replica count, clamping the
    /// result so it never drops below `min`.
    #[must_use]
    pub fn resolve(&self, existing: usize, min: usize) -> usize {
        let resolved = match self {
            Self::Absolute(n) => *n,
            Self::Delta(d) => existing.saturating_add_signed(*d),
        };
        resolved.max(min)
    }
}

impl FromStr for ReplicaSpec {
    type Err = ReplicaParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.starts_with('+') || trimmed.starts_with('-') {
            trimmed
                .parse::<isize>()
                .map(Self::Delta)
                .map_err(|_| ReplicaParseError(s.to_owned()))
        } else {
            trimmed
                .parse::<usize>()
                .map(Self::Absolute)
                .map_err(|_| ReplicaParseError(s.to_owned()))
        }
    }
}

/// Knobs controlling which definitions enter the graph and how flow-scoped
/// runs fan out.
#[derive(Debug, Clone)]
pub struct GraphOptions {
    /// Restrict the graph to resources of this flow (plus the dependency
    /// closure reachable from it).
    pub flow_name: Option<String>,
    /// Within the selected flow, start only from resources marked exported.
    pub exported_only: bool,
    /// Caller-supplied flow arguments, merged over the flow's defaults.
    pub args: BTreeMap<String, String>,
    /// Accept argument keys the flow never declared.
    pub allow_undeclared_args: bool,
    /// Replica fan-out for the selected flow. `None` means a single plain
    /// instantiation.
    pub replicas: Option<ReplicaSpec>,
    /// Lower bound on the resolved replica count.
    pub min_replicas: usize,
    /// After a fully successful run, delete managed resources that are no
    /// longer part of any definition.
    pub allow_delete_external: bool,
}

impl Default for GraphOptions {
    /// No flow filter, no args, single instantiation, a replica floor of
    /// one, no external deletes.
    fn default() -> Self {
        Self {
            flow_name: None,
            exported_only: false,
            args: BTreeMap::new(),
            allow_undeclared_args: false,
            replicas: None,
            min_replicas: 1,
            allow_delete_external: false,
        }
    }
}

impl GraphOptions {
    /// Options for a plain (non-flow) run over everything the selector
    /// matches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scopes the run to the named flow.
    #[must_use]
    pub fn for_flow(mut self, name: impl Into<String>) -> Self {
        self.flow_name = Some(name.into());
        self
    }

    /// Starts graph construction only from exported resources of the flow.
    #[must_use]
    pub fn exported_only(mut self, yes: bool) -> Self {
        self.exported_only = yes;
        self
    }

    /// Adds a caller argument for the flow.
    #[must_use]
    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Permits argument keys the flow never declared.
    #[must_use]
    pub fn allow_undeclared_args(mut self, yes: bool) -> Self {
        self.allow_undeclared_args = yes;
        self
    }

    /// Sets the replica fan-out for the flow.
    #[must_use]
    pub fn with_replicas(mut self, spec: ReplicaSpec) -> Self {
        self.replicas = Some(spec);
        self
    }

    /// Sets the lower bound on the resolved replica count.
    #[must_use]
    pub fn min_replicas(mut self, min: usize) -> Self {
        self.min_replicas = min;
        self
    }

    /// Enables the post-run deletion pass for resources that fell out of
    /// the definition set.
    #[must_use]
    pub fn allow_delete_external(mut self, yes: bool) -> Self {
        self.allow_delete_external = yes;
        self
    }
}
