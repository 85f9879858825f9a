//! Node types and the per-node status state machine.
//!
//! Nodes are the vertices of a dependency graph. A node is either a single
//! cluster resource or a flow-instance synchronization point; the closed
//! variant set keeps dispatch on the variant rather than on runtime type
//! inspection.

use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

use caravel_cluster::{ResourceHandle, ResourceKey};

/// Runtime status of one node during a run.
///
/// Transitions are owned by the scheduler: `Pending -> Running -> Ready`
/// on success, `Pending -> Running -> Error` on failure, and
/// `Pending -> Skipped` when a dependency ends in `Error` or `Skipped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    /// Dependencies unresolved, or not yet picked up.
    #[default]
    Pending,
    /// The create/apply operation has been dispatched.
    Running,
    /// Created and the readiness check passed. Terminal success.
    Ready,
    /// Create/apply or readiness failed irrecoverably. Terminal failure.
    Error,
    /// A dependency ended in `Error`; this node was never dispatched.
    Skipped,
}

impl NodeStatus {
    /// Returns true for `Ready`, `Error`, and `Skipped`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Ready | NodeStatus::Error | NodeStatus::Skipped)
    }

    /// Returns true for `Error` and `Skipped`: statuses that propagate to
    /// dependents as `Skipped`.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, NodeStatus::Error | NodeStatus::Skipped)
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Pending => f.write_str("pending"),
            NodeStatus::Running => f.write_str("running"),
            NodeStatus::Ready => f.write_str("ready"),
            NodeStatus::Error => f.write_str("error"),
            NodeStatus::Skipped => f.write_str("skipped"),
        }
    }
}

/// A node wrapping one cluster resource.
pub struct ResourceNode {
    /// Unique key within the graph.
    pub key: ResourceKey,
    /// Handle through which the scheduler creates and probes the resource.
    pub handle: Arc<dyn ResourceHandle>,
    /// Flow this node belongs to, if any.
    pub flow: Option<String>,
    /// Replica index; 0 for non-replicated nodes.
    pub replica: usize,
    /// Bound arguments after flow-level merging.
    pub args: BTreeMap<String, String>,
    /// Runtime status, mutated only by the scheduler.
    pub status: NodeStatus,
}

impl fmt::Debug for ResourceNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceNode")
            .field("key", &self.key)
            .field("flow", &self.flow)
            .field("replica", &self.replica)
            .field("status", &self.status)
            .finish()
    }
}

/// A synchronization node representing one replica of a flow.
///
/// Flow instances carry no handle: they depend on their replica's member
/// nodes and become `Ready` as soon as they are dispatched, marking the
/// replica as fully deployed.
#[derive(Debug)]
pub struct FlowInstanceNode {
    /// Unique key within the graph.
    pub key: ResourceKey,
    /// The flow this instance belongs to.
    pub flow: String,
    /// Replica index.
    pub replica: usize,
    /// Runtime status, mutated only by the scheduler.
    pub status: NodeStatus,
}

/// A vertex in the dependency graph.
#[derive(Debug)]
pub enum Node {
    /// A single cluster resource.
    Resource(ResourceNode),
    /// A flow-instance synchronization point.
    FlowInstance(FlowInstanceNode),
}

impl Node {
    /// Creates a resource node in the `Pending` state.
    #[must_use]
    pub fn resource(
        key: ResourceKey,
        handle: Arc<dyn ResourceHandle>,
        flow: Option<String>,
        replica: usize,
        args: BTreeMap<String, String>,
    ) -> Self {
        Node::Resource(ResourceNode {
            key,
            handle,
            flow,
            replica,
            args,
            status: NodeStatus::Pending,
        })
    }

    /// Creates a flow-instance node in the `Pending` state.
    #[must_use]
    pub fn flow_instance(flow: &str, replica: usize) -> Self {
        Node::FlowInstance(FlowInstanceNode {
            key: ResourceKey::flow_instance(flow, replica),
            flow: flow.to_owned(),
            replica,
            status: NodeStatus::Pending,
        })
    }

    /// Returns the node's key.
    #[must_use]
    pub fn key(&self) -> &ResourceKey {
        match self {
            Node::Resource(n) => &n.key,
            Node::FlowInstance(n) => &n.key,
        }
    }

    /// Returns the node's current status.
    #[must_use]
    pub fn status(&self) -> NodeStatus {
        match self {
            Node::Resource(n) => n.status,
            Node::FlowInstance(n) => n.status,
        }
    }

    /// Sets the node's status.
    pub fn set_status(&mut self, status: NodeStatus) {
        match self {
            Node::Resource(n) => n.status = status,
            Node::FlowInstance(n) => n.status = status,
        }
    }

    /// Returns the flow this node belongs to, if any.
    #[must_use]
    pub fn flow(&self) -> Option<&str> {
        match self {
            Node::Resource(n) => n.flow.as_deref(),
            Node::FlowInstance(n) => Some(&n.flow),
        }
    }

    /// Returns the replica index (0 for non-replicated nodes).
    #[must_use]
    pub fn replica(&self) -> usize {
        match self {
            Node::Resource(n) => n.replica,
            Node::FlowInstance(n) => n.replica,
        }
    }

    /// Returns the resource handle, if this is a resource node.
    #[must_use]
    pub fn handle(&self) -> Option<&Arc<dyn ResourceHandle>> {
        match self {
            Node::Resource(n) => Some(&n.handle),
            Node::FlowInstance(_) => None,
        }
    }

    /// Returns the bound argument map, if this is a resource node.
    #[must_use]
    pub fn args(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Node::Resource(n) => Some(&n.args),
            Node::FlowInstance(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(!NodeStatus::Pending.is_terminal());
        assert!(!NodeStatus::Running.is_terminal());
        assert!(NodeStatus::Ready.is_terminal());
        assert!(NodeStatus::Error.is_terminal());
        assert!(NodeStatus::Skipped.is_terminal());

        assert!(NodeStatus::Error.is_failure());
        assert!(NodeStatus::Skipped.is_failure());
        assert!(!NodeStatus::Ready.is_failure());
    }

    #[test]
    fn status_display() {
        assert_eq!(format!("{}", NodeStatus::Pending), "pending");
        assert_eq!(format!("{}", NodeStatus::Skipped), "skipped");
    }

    #[test]
    fn flow_instance_accessors() {
        let mut node = Node::flow_instance("frontend", 2);
        assert_eq!(node.key().as_str(), "flow/frontend/2");
        assert_eq!(node.flow(), Some("frontend"));
        assert_eq!(node.replica(), 2);
        assert!(node.handle().is_none());
        assert_eq!(node.status(), NodeStatus::Pending);

        node.set_status(NodeStatus::Ready);
        assert_eq!(node.status(), NodeStatus::Ready);
    }
}
