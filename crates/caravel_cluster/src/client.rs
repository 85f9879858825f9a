//! Cluster client seam and the in-memory implementation.
//!
//! The scheduler's only view of a cluster is the [`ClusterClient`] trait:
//! list definitions, mint resource handles, report what the cluster holds,
//! delete by key. [`MemoryCluster`] implements the seam in memory with
//! scriptable failures and readiness delays; every test suite in the
//! workspace runs against it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;

use crate::resource::{
    BoxFuture, DefinitionSet, FlowDefinition, ResourceDefinition, ResourceError, ResourceHandle,
    ResourceKey, RunMode,
};
use crate::selector::Selector;

/// Errors the cluster client can report.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The cluster cannot be reached at all. Fatal for the run.
    #[error("cluster unreachable: {0}")]
    Unreachable(String),

    /// A per-resource operation failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// The external cluster seam.
///
/// Listing and handle minting are synchronous (they operate on a snapshot);
/// only the per-object operations behind [`ResourceHandle`] and
/// [`delete`](ClusterClient::delete) are async, because those are the calls
/// that actually wait on a cluster.
pub trait ClusterClient: Send + Sync {
    /// Lists the definitions whose labels match the selector, plus every
    /// flow declaration visible to the caller.
    fn list(&self, selector: &Selector) -> Result<DefinitionSet, ClusterError>;

    /// Returns how many replicas of the named flow the cluster already
    /// holds. Used to resolve relative replica counts.
    fn existing_replicas(&self, flow: &str) -> Result<usize, ClusterError>;

    /// Mints the handle for one graph node. `args` is the node's bound
    /// argument map after flow-level merging.
    fn handle(
        &self,
        definition: &ResourceDefinition,
        key: ResourceKey,
        args: BTreeMap<String, String>,
    ) -> Arc<dyn ResourceHandle>;

    /// Keys of the objects the cluster currently holds under this
    /// selector's management. Drives the external-delete pass.
    fn list_managed(&self, selector: &Selector) -> Result<Vec<ResourceKey>, ClusterError>;

    /// Deletes one object by key.
    fn delete<'a>(&'a self, key: ResourceKey) -> BoxFuture<'a, Result<(), ClusterError>>;
}

#[derive(Default)]
struct Inner {
    definitions: Mutex<DefinitionSet>,
    replicas: Mutex<HashMap<String, usize>>,
    /// Objects currently present in the cluster.
    existing: Mutex<HashSet<ResourceKey>>,
    create_failures: Mutex<HashMap<ResourceKey, String>>,
    ready_failures: Mutex<HashMap<ResourceKey, String>>,
    /// Remaining probes that report "not yet" before a key turns ready.
    ready_delays: Mutex<HashMap<ResourceKey, u32>>,
    /// Creation order log, one entry per successful create/apply.
    applied: Mutex<Vec<ResourceKey>>,
    deleted: Mutex<Vec<ResourceKey>>,
    unreachable: AtomicBool,
}

impl Inner {
    fn check_reachable(&self) -> Result<(), ClusterError> {
        if self.unreachable.load(Ordering::Relaxed) {
            return Err(ClusterError::Unreachable("injected outage".to_owned()));
        }
        Ok(())
    }
}

/// In-memory [`ClusterClient`] for tests and demos.
///
/// Definitions, pre-existing objects, and failure injection are all
/// scriptable; the applied-order and deleted logs let tests assert on what
/// the scheduler actually did, in which order.
///
/// # Example
///
/// ```ignore
/// let cluster = MemoryCluster::new();
/// cluster.define(ResourceDefinition::new("pod", "web"));
/// cluster.fail_create(&ResourceKey::new("pod", "web"), "quota exceeded");
/// ```
#[derive(Clone, Default)]
pub struct MemoryCluster {
    inner: Arc<Inner>,
}

impl MemoryCluster {
    /// Creates an empty cluster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource definition to the pool.
    pub fn define(&self, definition: ResourceDefinition) {
        self.inner.definitions.lock().resources.push(definition);
    }

    /// Adds a flow declaration to the pool.
    pub fn define_flow(&self, flow: FlowDefinition) {
        self.inner.definitions.lock().flows.push(flow);
    }

    /// Sets the replica count the cluster reports for a flow.
    pub fn set_existing_replicas(&self, flow: &str, count: usize) {
        self.inner.replicas.lock().insert(flow.to_owned(), count);
    }

    /// Marks an object as already present in the cluster.
    pub fn mark_existing(&self, key: ResourceKey) {
        self.inner.existing.lock().insert(key);
    }

    /// Makes create fail for the given key.
    pub fn fail_create(&self, key: &ResourceKey, reason: &str) {
        self.inner
            .create_failures
            .lock()
            .insert(key.clone(), reason.to_owned());
    }

    /// Makes the readiness probe fail for the given key.
    pub fn fail_ready(&self, key: &ResourceKey, reason: &str) {
        self.inner
            .ready_failures
            .lock()
            .insert(key.clone(), reason.to_owned());
    }

    /// Makes the first `probes` readiness probes report "not yet".
    pub fn delay_ready(&self, key: &ResourceKey, probes: u32) {
        self.inner.ready_delays.lock().insert(key.clone(), probes);
    }

    /// Simulates the cluster becoming unreachable.
    pub fn make_unreachable(&self) {
        self.inner.unreachable.store(true, Ordering::Relaxed);
    }

    /// Returns true if the object is currently present.
    #[must_use]
    pub fn exists(&self, key: &ResourceKey) -> bool {
        self.inner.existing.lock().contains(key)
    }

    /// Returns the creation order log.
    #[must_use]
    pub fn applied(&self) -> Vec<ResourceKey> {
        self.inner.applied.lock().clone()
    }

    /// Returns the deletion log.
    #[must_use]
    pub fn deleted(&self) -> Vec<ResourceKey> {
        self.inner.deleted.lock().clone()
    }
}

impl ClusterClient for MemoryCluster {
    fn list(&self, selector: &Selector) -> Result<DefinitionSet, ClusterError> {
        self.inner.check_reachable()?;
        let pool = self.inner.definitions.lock();
        Ok(DefinitionSet {
            resources: pool
                .resources
                .iter()
                .filter(|def| selector.matches(&def.labels))
                .cloned()
                .collect(),
            flows: pool.flows.clone(),
        })
    }

    fn existing_replicas(&self, flow: &str) -> Result<usize, ClusterError> {
        self.inner.check_reachable()?;
        Ok(self.inner.replicas.lock().get(flow).copied().unwrap_or(0))
    }

    fn handle(
        &self,
        _definition: &ResourceDefinition,
        key: ResourceKey,
        _args: BTreeMap<String, String>,
    ) -> Arc<dyn ResourceHandle> {
        Arc::new(MemoryHandle {
            inner: Arc::clone(&self.inner),
            key,
        })
    }

    fn list_managed(&self, _selector: &Selector) -> Result<Vec<ResourceKey>, ClusterError> {
        self.inner.check_reachable()?;
        let mut keys: Vec<ResourceKey> = self.inner.existing.lock().iter().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn delete<'a>(&'a self, key: ResourceKey) -> BoxFuture<'a, Result<(), ClusterError>> {
        Box::pin(async move {
            self.inner.check_reachable()?;
            self.inner.existing.lock().remove(&key);
            self.inner.deleted.lock().push(key);
            Ok(())
        })
    }
}

struct MemoryHandle {
    inner: Arc<Inner>,
    key: ResourceKey,
}

impl ResourceHandle for MemoryHandle {
    fn key(&self) -> ResourceKey {
        self.key.clone()
    }

    fn create<'a>(&'a self, mode: RunMode) -> BoxFuture<'a, Result<(), ResourceError>> {
        Box::pin(async move {
            if self.inner.unreachable.load(Ordering::Relaxed) {
                return Err(ResourceError::CreateFailed {
                    key: self.key.clone(),
                    reason: "cluster unreachable".to_owned(),
                });
            }
            if let Some(reason) = self.inner.create_failures.lock().get(&self.key) {
                return Err(ResourceError::CreateFailed {
                    key: self.key.clone(),
                    reason: reason.clone(),
                });
            }
            let already_present = !self.inner.existing.lock().insert(self.key.clone());
            if already_present && mode == RunMode::Create {
                // Idempotent create: existing state counts as success.
                return Ok(());
            }
            self.inner.applied.lock().push(self.key.clone());
            Ok(())
        })
    }

    fn ready<'a>(&'a self) -> BoxFuture<'a, Result<bool, ResourceError>> {
        Box::pin(async move {
            if let Some(reason) = self.inner.ready_failures.lock().get(&self.key) {
                return Err(ResourceError::ProbeFailed {
                    key: self.key.clone(),
                    reason: reason.clone(),
                });
            }
            let mut delays = self.inner.ready_delays.lock();
            if let Some(remaining) = delays.get_mut(&self.key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Ok(false);
                }
            }
            Ok(true)
        })
    }

    fn delete<'a>(&'a self) -> BoxFuture<'a, Result<(), ResourceError>> {
        Box::pin(async move {
            self.inner.existing.lock().remove(&self.key);
            self.inner.deleted.lock().push(self.key.clone());
            Ok(())
        })
    }
}
