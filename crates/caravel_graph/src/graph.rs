//! The dependency graph structure.
//!
//! A [`DependencyGraph`] owns its nodes (keyed by [`ResourceKey`]) and the
//! dependency edges between them, plus adjacency in both directions so the
//! scheduler can walk dependencies and dependents without rescanning the
//! edge list. The graph is owned exclusively by the run that built it; the
//! scheduler mutates node statuses in place but never restructures edges.

use std::collections::BTreeMap;

use caravel_cluster::ResourceKey;
use hashbrown::HashMap;

use crate::edge::Dependency;
use crate::node::{Node, NodeStatus};

/// Errors raised when graph invariants are violated at insertion time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// A node with this key is already present.
    #[error("duplicate node key: {0}")]
    DuplicateKey(ResourceKey),

    /// An edge endpoint does not refer to an existing node.
    #[error("edge endpoint refers to unknown node: {0}")]
    UnknownNode(ResourceKey),
}

/// The set of nodes plus the set of dependency edges.
///
/// Invariants held by construction: node keys are unique, and every edge
/// endpoint refers to an existing node. Acyclicity is *not* an insertion
/// invariant - it is established by a clean
/// [`detect_cycles`](crate::cycles::detect_cycles) pass before execution.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<ResourceKey, Node>,
    edges: Vec<Dependency>,
    /// key -> keys it depends on.
    dependencies: HashMap<ResourceKey, Vec<ResourceKey>>,
    /// key -> keys that depend on it.
    dependents: HashMap<ResourceKey, Vec<ResourceKey>>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::DuplicateKey`] if a node with the same key is
    /// already present.
    pub fn add_node(&mut self, node: Node) -> Result<(), GraphError> {
        let key = node.key().clone();
        if self.nodes.contains_key(&key) {
            return Err(GraphError::DuplicateKey(key));
        }
        self.nodes.insert(key, node);
        Ok(())
    }

    /// Adds a dependency edge: `from` depends on `to`.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownNode`] if either endpoint is not a node
    /// of this graph.
    pub fn add_dependency(&mut self, from: &ResourceKey, to: &ResourceKey) -> Result<(), GraphError> {
        if !self.nodes.contains_key(from) {
            return Err(GraphError::UnknownNode(from.clone()));
        }
        if !self.nodes.contains_key(to) {
            return Err(GraphError::UnknownNode(to.clone()));
        }
        self.edges.push(Dependency::new(from.clone(), to.clone()));
        self.dependencies
            .entry(from.clone())
            .or_default()
            .push(to.clone());
        self.dependents
            .entry(to.clone())
            .or_default()
            .push(from.clone());
        Ok(())
    }

    /// Returns the node with the given key.
    #[must_use]
    pub fn get(&self, key: &ResourceKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    /// Returns true if a node with the given key exists.
    #[must_use]
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// Iterates over all nodes in unspecified order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Returns all edges.
    #[must_use]
    pub fn edges(&self) -> &[Dependency] {
        &self.edges
    }

    /// Returns the keys this node depends on (empty for unknown keys).
    #[must_use]
    pub fn dependencies_of(&self, key: &ResourceKey) -> &[ResourceKey] {
        self.dependencies.get(key).map_or(&[], Vec::as_slice)
    }

    /// Returns the keys that depend on this node (empty for unknown keys).
    #[must_use]
    pub fn dependents_of(&self, key: &ResourceKey) -> &[ResourceKey] {
        self.dependents.get(key).map_or(&[], Vec::as_slice)
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Returns all node keys in sorted order, for deterministic traversal.
    #[must_use]
    pub fn sorted_keys(&self) -> Vec<ResourceKey> {
        let mut keys: Vec<ResourceKey> = self.nodes.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns the status of the node with the given key.
    #[must_use]
    pub fn status_of(&self, key: &ResourceKey) -> Option<NodeStatus> {
        self.nodes.get(key).map(Node::status)
    }

    /// Sets the status of the node with the given key. Returns false if the
    /// key is unknown.
    pub fn set_status(&mut self, key: &ResourceKey, status: NodeStatus) -> bool {
        match self.nodes.get_mut(key) {
            Some(node) => {
                node.set_status(status);
                true
            }
            None => false,
        }
    }

    /// Snapshot of every node's status, sorted by key.
    #[must_use]
    pub fn statuses(&self) -> BTreeMap<ResourceKey, NodeStatus> {
        self.nodes
            .iter()
            .map(|(key, node)| (key.clone(), node.status()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> ResourceKey {
        ResourceKey::from_string(s)
    }

    fn sync_node(flow: &str, replica: usize) -> Node {
        Node::flow_instance(flow, replica)
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let mut graph = DependencyGraph::new();
        graph.add_node(sync_node("a", 0)).unwrap();
        let err = graph.add_node(sync_node("a", 0)).unwrap_err();
        assert_eq!(err, GraphError::DuplicateKey(key("flow/a/0")));
    }

    #[test]
    fn edges_require_existing_endpoints() {
        let mut graph = DependencyGraph::new();
        graph.add_node(sync_node("a", 0)).unwrap();
        let missing = key("flow/b/0");
        let err = graph
            .add_dependency(&key("flow/a/0"), &missing)
            .unwrap_err();
        assert_eq!(err, GraphError::UnknownNode(missing));
    }

    #[test]
    fn adjacency_is_tracked_both_ways() {
        let mut graph = DependencyGraph::new();
        graph.add_node(sync_node("a", 0)).unwrap();
        graph.add_node(sync_node("b", 0)).unwrap();
        graph
            .add_dependency(&key("flow/a/0"), &key("flow/b/0"))
            .unwrap();

        assert_eq!(graph.dependencies_of(&key("flow/a/0")), &[key("flow/b/0")]);
        assert_eq!(graph.dependents_of(&key("flow/b/0")), &[key("flow/a/0")]);
        assert!(graph.dependencies_of(&key("flow/b/0")).is_empty());
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn status_updates_in_place() {
        let mut graph = DependencyGraph::new();
        graph.add_node(sync_node("a", 0)).unwrap();

        assert_eq!(graph.status_of(&key("flow/a/0")), Some(NodeStatus::Pending));
        assert!(graph.set_status(&key("flow/a/0"), NodeStatus::Ready));
        assert_eq!(graph.status_of(&key("flow/a/0")), Some(NodeStatus::Ready));
        assert!(!graph.set_status(&key("flow/x/0"), NodeStatus::Ready));

        let statuses = graph.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[&key("flow/a/0")], NodeStatus::Ready);
    }
}
