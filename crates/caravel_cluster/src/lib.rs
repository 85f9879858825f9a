//! Cluster-facing primitives for caravel (Layer 1).
//!
//! `caravel_cluster` defines the boundary between the dependency-graph
//! scheduler and the cluster it deploys into. The scheduler never talks to a
//! cluster directly; it goes through two seams defined here:
//!
//! - [`ResourceHandle`] - one deployable object (or one nested flow
//!   instance): create it, probe its readiness, optionally delete it
//! - [`ClusterClient`] - list resource definitions matching a selector,
//!   mint handles, and report what the cluster currently holds
//!
//! The crate also ships [`MemoryCluster`], an in-memory `ClusterClient` with
//! scriptable failures and readiness delays, which is what the test suites
//! run against.
//!
//! # Architecture
//!
//! This crate is Layer 1 of the caravel architecture:
//!
//! - **Layer 1** (`caravel_cluster`): resource definitions and cluster seams (this crate)
//! - **Layer 2** (`caravel_graph`): dependency-graph model, builder, cycle detection
//! - **Layer 3** (`caravel_scheduler`): bounded-concurrency execution engine and run trigger

/// Cluster client seam and the in-memory implementation.
pub mod client;

/// Resource definitions, keys, and the resource handle capability.
pub mod resource;

/// Label-selector parsing and matching.
pub mod selector;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::client::{ClusterClient, ClusterError, MemoryCluster};
    pub use crate::resource::{
        BoxFuture, DefinitionSet, FlowDefinition, ResourceDefinition, ResourceError,
        ResourceHandle, ResourceKey, RunMode,
    };
    pub use crate::selector::{Requirement, Selector, SelectorError};
}

pub use client::{ClusterClient, ClusterError, MemoryCluster};
pub use resource::{
    BoxFuture, DefinitionSet, FlowDefinition, ResourceDefinition, ResourceError, ResourceHandle,
    ResourceKey, RunMode,
};
pub use selector::{Selector, SelectorError};
