//! A dependency-graph deployment scheduler.
//!
//! Caravel turns declarative resource definitions into a dependency graph
//! and drives it to convergence with a bounded worker pool: resources are
//! created only after everything they depend on is ready, failures skip
//! their dependents without stopping independent branches, and runs can be
//! cancelled cleanly mid-flight.
//!
//! The crate is a facade over three layers:
//!
//! - [`caravel_cluster`]: resource definitions, label selectors, and the
//!   cluster-client seam (plus an in-memory cluster for tests)
//! - [`caravel_graph`]: the graph model, the builder (flows, replicas,
//!   argument binding), and cycle detection
//! - [`caravel_scheduler`]: the execution engine, run reports, and the
//!   control-object run trigger

pub use caravel_cluster;
pub use caravel_graph;
pub use caravel_scheduler;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use caravel_cluster::prelude::*;
    pub use caravel_graph::prelude::*;
    pub use caravel_scheduler::prelude::*;
}

pub use caravel_cluster::{
    ClusterClient, ClusterError, DefinitionSet, FlowDefinition, MemoryCluster,
    ResourceDefinition, ResourceError, ResourceHandle, ResourceKey, RunMode, Selector,
};
pub use caravel_graph::{
    BuildError, Cycle, DependencyGraph, GraphBuilder, GraphOptions, Node, NodeStatus,
    ReplicaSpec, detect_cycles,
};
pub use caravel_scheduler::{
    ControlError, ControlEvent, ControlObject, RunManager, RunOutcome, RunReport, Scheduler,
};
