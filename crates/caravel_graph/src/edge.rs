//! Dependency edges.
//!
//! An edge `from -> to` means `to` must reach `Ready` before `from` may
//! start. Edges are immutable once the graph is built; the scheduler reads
//! them but never restructures them.

use core::fmt;

use caravel_cluster::ResourceKey;

/// A directed dependency: `from` depends on `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// The dependent node.
    pub from: ResourceKey,
    /// The node that must become `Ready` first.
    pub to: ResourceKey,
}

impl Dependency {
    /// Creates a dependency edge.
    #[must_use]
    pub fn new(from: ResourceKey, to: ResourceKey) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}
