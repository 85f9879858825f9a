//! Resource definitions, keys, and the resource handle capability.
//!
//! A [`ResourceDefinition`] is what operators write: a named, kinded object
//! with labels, declared dependencies, and optional flow membership. The
//! graph builder turns definitions into nodes; each node carries a
//! [`ResourceHandle`] through which the scheduler creates the object and
//! probes its readiness.

use core::fmt;
use core::future::Future;
use core::pin::Pin;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Stable unique identifier for a deployable object within one graph.
///
/// Keys are derived from the definition, not generated: `kind/name` for a
/// plain resource, `flow/<flow>/<replica>/<kind>/<name>` for a replicated
/// flow member, and `flow/<flow>/<replica>` for a flow-instance node.
///
/// Internally uses `Arc<str>` for cheap cloning (reference count bump only).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceKey(Arc<str>);

impl ResourceKey {
    /// Creates the key for a plain (non-replicated) resource.
    #[must_use]
    pub fn new(kind: &str, name: &str) -> Self {
        Self(format!("{kind}/{name}").into())
    }

    /// Creates the key for one replica's instance of a flow member.
    #[must_use]
    pub fn replicated(flow: &str, replica: usize, kind: &str, name: &str) -> Self {
        Self(format!("flow/{flow}/{replica}/{kind}/{name}").into())
    }

    /// Creates the key for a flow-instance node.
    #[must_use]
    pub fn flow_instance(flow: &str, replica: usize) -> Self {
        Self(format!("flow/{flow}/{replica}").into())
    }

    /// Creates a key from a raw string, as written in a `depends_on` list.
    #[must_use]
    pub fn from_string(key: impl Into<Arc<str>>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One resource definition as listed from the cluster.
///
/// `depends_on` entries are `kind/name` references to other definitions in
/// the same pool; unresolved references are a build-time validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    /// Object name, unique per kind.
    pub name: String,
    /// Resource kind (pod, job, service, ...). Opaque to the scheduler.
    pub kind: String,
    /// Labels matched against the run's selector.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// `kind/name` references this resource depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Flow this definition belongs to, if any.
    #[serde(default)]
    pub flow: Option<String>,
    /// Whether the definition is part of its flow's exported surface.
    #[serde(default)]
    pub exported: bool,
    /// Argument template; merged with flow-level bindings at build time.
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

impl ResourceDefinition {
    /// Creates a minimal definition with the given kind and name.
    #[must_use]
    pub fn new(kind: &str, name: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: kind.to_owned(),
            labels: BTreeMap::new(),
            depends_on: Vec::new(),
            flow: None,
            exported: false,
            args: BTreeMap::new(),
        }
    }

    /// Adds a label.
    #[must_use]
    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Adds a `kind/name` dependency reference.
    #[must_use]
    pub fn with_dependency(mut self, reference: &str) -> Self {
        self.depends_on.push(reference.to_owned());
        self
    }

    /// Assigns the definition to a flow.
    #[must_use]
    pub fn in_flow(mut self, flow: &str, exported: bool) -> Self {
        self.flow = Some(flow.to_owned());
        self.exported = exported;
        self
    }

    /// Adds a template argument.
    #[must_use]
    pub fn with_arg(mut self, key: &str, value: &str) -> Self {
        self.args.insert(key.to_owned(), value.to_owned());
        self
    }

    /// Returns the `kind/name` key for this definition.
    #[must_use]
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.kind, &self.name)
    }
}

/// A named, reusable sub-graph declaration.
///
/// Flows declare which arguments their members may be parameterized with;
/// supplying anything outside `declared_args` is rejected unless the run
/// opts into undeclared arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowDefinition {
    /// Flow name, referenced by member definitions and run options.
    pub name: String,
    /// Argument names members of this flow may bind.
    #[serde(default)]
    pub declared_args: BTreeSet<String>,
    /// Default values for declared arguments.
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

impl FlowDefinition {
    /// Creates a flow declaring the given argument names.
    #[must_use]
    pub fn new(name: &str, declared_args: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            name: name.to_owned(),
            declared_args: declared_args.into_iter().map(str::to_owned).collect(),
            defaults: BTreeMap::new(),
        }
    }

    /// Sets a default value for a declared argument.
    #[must_use]
    pub fn with_default(mut self, key: &str, value: &str) -> Self {
        self.defaults.insert(key.to_owned(), value.to_owned());
        self
    }
}

/// The pool of definitions a cluster listing returns.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefinitionSet {
    /// Resource definitions matching the listing's selector.
    #[serde(default)]
    pub resources: Vec<ResourceDefinition>,
    /// Flow declarations visible alongside the resources.
    #[serde(default)]
    pub flows: Vec<FlowDefinition>,
}

/// How a run treats resources that already exist in the cluster.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Provision resources that do not yet exist. Re-running against state
    /// that is already present counts as success without reapplying.
    #[default]
    Create,
    /// Additionally apply changes to already-existing resources. Used for
    /// iterative or debug redeployment.
    InPlace,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Create => f.write_str("create"),
            RunMode::InPlace => f.write_str("inplace"),
        }
    }
}

/// Errors a resource handle can report.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// Creating or applying the object failed.
    #[error("create failed for {key}: {reason}")]
    CreateFailed {
        /// The resource being created.
        key: ResourceKey,
        /// Failure detail from the cluster.
        reason: String,
    },

    /// The readiness probe itself failed (as opposed to returning "not yet").
    #[error("readiness probe failed for {key}: {reason}")]
    ProbeFailed {
        /// The resource being probed.
        key: ResourceKey,
        /// Failure detail from the cluster.
        reason: String,
    },

    /// The handle does not support deletion.
    #[error("delete is not supported for {0}")]
    DeleteUnsupported(ResourceKey),
}

/// Capability surface of one deployable object.
///
/// Handles are minted by a [`ClusterClient`](crate::client::ClusterClient)
/// and owned by graph nodes. The methods return [`BoxFuture`]s so the trait
/// stays object-safe; implementors box their async bodies the same way
/// systems do in the execution layer.
pub trait ResourceHandle: Send + Sync {
    /// The key this handle was minted for.
    fn key(&self) -> ResourceKey;

    /// Creates or applies the object, according to the run mode.
    fn create<'a>(&'a self, mode: RunMode) -> BoxFuture<'a, Result<(), ResourceError>>;

    /// Probes whether the object has become ready. `Ok(false)` means "not
    /// yet"; the scheduler polls until the probe turns true or its attempt
    /// budget runs out.
    fn ready<'a>(&'a self) -> BoxFuture<'a, Result<bool, ResourceError>>;

    /// Deletes the object. Optional: handles that cannot delete return
    /// [`ResourceError::DeleteUnsupported`].
    fn delete<'a>(&'a self) -> BoxFuture<'a, Result<(), ResourceError>> {
        let key = self.key();
        Box::pin(async move { Err(ResourceError::DeleteUnsupported(key)) })
    }
}
