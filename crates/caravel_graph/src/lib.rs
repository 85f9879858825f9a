//! Dependency-graph primitives for caravel (Layer 2).
//!
//! `caravel_graph` turns a selected set of resource definitions into an
//! executable dependency graph: nodes carry resource handles and runtime
//! status, edges carry the "must be ready first" relation.
//!
//! # Core Concepts
//!
//! - [`DependencyGraph`] - node map plus dependency edges and adjacency
//! - [`Node`] - a resource or a flow-instance synchronization point
//! - [`GraphBuilder`] - selection, flow inclusion, argument binding,
//!   replica fan-out; all-or-nothing
//! - [`detect_cycles`] - read-only analysis reporting every cycle before
//!   any execution attempt
//!
//! # Example
//!
//! ```ignore
//! use caravel_cluster::{MemoryCluster, Selector};
//! use caravel_graph::{GraphBuilder, GraphOptions, detect_cycles};
//!
//! let builder = GraphBuilder::new(&cluster, Selector::match_all());
//! let graph = builder.build(&GraphOptions::default())?;
//! assert!(detect_cycles(&graph).is_empty());
//! ```

/// Graph construction from resource definitions and run options.
pub mod builder;

/// Cycle detection over the dependency relation.
pub mod cycles;

/// Dependency edges.
pub mod edge;

/// The dependency graph structure.
pub mod graph;

/// Node types and the per-node status state machine.
pub mod node;

/// Run options and replica-count parsing.
pub mod options;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::builder::{BuildError, GraphBuilder};
    pub use crate::cycles::{Cycle, detect_cycles};
    pub use crate::edge::Dependency;
    pub use crate::graph::{DependencyGraph, GraphError};
    pub use crate::node::{FlowInstanceNode, Node, NodeStatus, ResourceNode};
    pub use crate::options::{GraphOptions, ReplicaParseError, ReplicaSpec};
}

pub use builder::{BuildError, GraphBuilder};
pub use cycles::{Cycle, detect_cycles};
pub use graph::{DependencyGraph, GraphError};
pub use node::{Node, NodeStatus};
pub use options::{GraphOptions, ReplicaSpec};
