//! Graph construction from cluster definitions.
//!
//! [`GraphBuilder`] turns the definitions a cluster listing returns into a
//! [`DependencyGraph`] ready for execution. Construction is all-or-nothing:
//! any validation failure aborts the build and no partial graph is ever
//! handed to a caller.

use std::collections::{BTreeMap, VecDeque};

use caravel_cluster::{
    ClusterClient, ClusterError, FlowDefinition, ResourceDefinition, ResourceKey, Selector,
};
use hashbrown::{HashMap, HashSet};
use tracing::debug;

use crate::graph::{DependencyGraph, GraphError};
use crate::node::Node;
use crate::options::GraphOptions;

/// Errors the build pipeline can report. All of these are validation or
/// cluster failures raised before any execution happens.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// Listing definitions or querying replica counts failed.
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Two definitions in the listing share a `kind/name` key.
    #[error("duplicate definition: {0}")]
    DuplicateDefinition(ResourceKey),

    /// A `depends_on` reference does not resolve to any listed definition.
    #[error("{from} depends on unknown resource {reference:?}")]
    UnknownDependency {
        /// The definition carrying the dangling reference.
        from: ResourceKey,
        /// The unresolved `kind/name` reference.
        reference: String,
    },

    /// The requested flow has no flow definition.
    #[error("unknown flow: {0:?}")]
    UnknownFlow(String),

    /// A caller argument is not declared by the flow.
    #[error("flow {flow:?} does not declare argument {key:?}")]
    UndeclaredArgument {
        /// The flow the run was scoped to.
        flow: String,
        /// The undeclared argument key.
        key: String,
    },

    /// Replica fan-out was requested without scoping the run to a flow.
    #[error("replica count requires a flow-scoped run")]
    ReplicasWithoutFlow,

    /// Graph assembly violated a structural invariant.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Builds a dependency graph from whatever the cluster lists under a
/// selector.
pub struct GraphBuilder<'a> {
    client: &'a dyn ClusterClient,
    selector: Selector,
}

impl<'a> GraphBuilder<'a> {
    /// Creates a builder listing through the given client and selector.
    #[must_use]
    pub fn new(client: &'a dyn ClusterClient, selector: Selector) -> Self {
        Self { client, selector }
    }

    /// Runs the build pipeline: list, validate, select, bind arguments,
    /// expand replicas, assemble.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] on any validation or cluster failure; no
    /// partial graph is produced.
    pub fn build(&self, options: &GraphOptions) -> Result<DependencyGraph, BuildError> {
        if options.replicas.is_some() && options.flow_name.is_none() {
            return Err(BuildError::ReplicasWithoutFlow);
        }

        let set = self.client.list(&self.selector)?;
        let pool = Pool::index(set.resources)?;

        let (selected, flow) = match &options.flow_name {
            Some(name) => {
                let flow = set
                    .flows
                    .iter()
                    .find(|f| f.name == *name)
                    .ok_or_else(|| BuildError::UnknownFlow(name.clone()))?;
                let selected = pool.flow_closure(name, options.exported_only);
                (selected, Some(flow))
            }
            None => (pool.all_keys(), None),
        };

        let bound_args = match flow {
            Some(flow) => bind_args(flow, options)?,
            None => BTreeMap::new(),
        };

        let replicas = match (&options.flow_name, options.replicas) {
            (Some(name), Some(spec)) => {
                let existing = self.client.existing_replicas(name)?;
                let resolved = spec.resolve(existing, options.min_replicas);
                debug!(flow = %name, existing, resolved, "resolved replica count");
                Some(resolved)
            }
            _ => None,
        };

        self.assemble(&pool, &selected, options, &bound_args, replicas)
    }

    /// Materializes handles and assembles nodes and edges.
    fn assemble(
        &self,
        pool: &Pool,
        selected: &HashSet<ResourceKey>,
        options: &GraphOptions,
        bound_args: &BTreeMap<String, String>,
        replicas: Option<usize>,
    ) -> Result<DependencyGraph, BuildError> {
        let flow_name = options.flow_name.as_deref();
        let mut graph = DependencyGraph::new();

        // Replica index -> member keys of that replica, for the flow
        // instance edges.
        let mut members_per_replica: Vec<Vec<ResourceKey>> = Vec::new();

        for def in pool.defs() {
            if !selected.contains(&def.key()) {
                continue;
            }
            let is_member = flow_name.is_some() && def.flow.as_deref() == flow_name;

            if is_member {
                let flow = def.flow.as_deref().unwrap_or_default();
                let count = replicas.unwrap_or(1);
                members_per_replica.resize(count, Vec::new());
                let mut args = def.args.clone();
                args.extend(bound_args.iter().map(|(k, v)| (k.clone(), v.clone())));

                for replica in 0..count {
                    let key = member_key(def, flow, replica, replicas.is_some());
                    let handle = self.client.handle(def, key.clone(), args.clone());
                    graph.add_node(Node::resource(
                        key.clone(),
                        handle,
                        Some(flow.to_owned()),
                        replica,
                        args.clone(),
                    ))?;
                    members_per_replica[replica].push(key);
                }
            } else {
                let key = def.key();
                let handle = self.client.handle(def, key.clone(), def.args.clone());
                graph.add_node(Node::resource(
                    key,
                    handle,
                    def.flow.clone(),
                    0,
                    def.args.clone(),
                ))?;
            }
        }

        // One synchronization node per replica of the selected flow.
        if let Some(flow) = flow_name {
            let count = replicas.unwrap_or(1);
            members_per_replica.resize(count, Vec::new());
            for replica in 0..count {
                graph.add_node(Node::flow_instance(flow, replica))?;
            }
        }

        self.wire_edges(
            pool,
            selected,
            flow_name,
            replicas,
            &members_per_replica,
            &mut graph,
        )?;

        debug!(nodes = graph.len(), edges = graph.edges().len(), "graph assembled");
        Ok(graph)
    }

    fn wire_edges(
        &self,
        pool: &Pool,
        selected: &HashSet<ResourceKey>,
        flow_name: Option<&str>,
        replicas: Option<usize>,
        members_per_replica: &[Vec<ResourceKey>],
        graph: &mut DependencyGraph,
    ) -> Result<(), BuildError> {
        let count = replicas.unwrap_or(1);
        let replicated = replicas.is_some();
        let is_member =
            |def: &ResourceDefinition| flow_name.is_some() && def.flow.as_deref() == flow_name;

        for def in pool.defs() {
            if !selected.contains(&def.key()) {
                continue;
            }
            for reference in &def.depends_on {
                let target = pool.resolve(&def.key(), reference)?;
                match (is_member(def), is_member(target)) {
                    // Intra-flow edges are duplicated per replica.
                    (true, true) => {
                        let flow = flow_name.unwrap_or_default();
                        for replica in 0..count {
                            graph.add_dependency(
                                &member_key(def, flow, replica, replicated),
                                &member_key(target, flow, replica, replicated),
                            )?;
                        }
                    }
                    // Edges to external nodes are shared by every replica.
                    (true, false) => {
                        let flow = flow_name.unwrap_or_default();
                        let to = target.key();
                        for replica in 0..count {
                            graph.add_dependency(
                                &member_key(def, flow, replica, replicated),
                                &to,
                            )?;
                        }
                    }
                    // An external node depending on a member waits on every
                    // replica's instance of it.
                    (false, true) => {
                        let flow = flow_name.unwrap_or_default();
                        let from = def.key();
                        for replica in 0..count {
                            graph.add_dependency(
                                &from,
                                &member_key(target, flow, replica, replicated),
                            )?;
                        }
                    }
                    (false, false) => {
                        graph.add_dependency(&def.key(), &target.key())?;
                    }
                }
            }
        }

        // The flow instance of replica i depends on all of replica i's
        // members.
        if let Some(flow) = flow_name {
            for (replica, members) in members_per_replica.iter().enumerate() {
                let instance = ResourceKey::flow_instance(flow, replica);
                for member in members {
                    graph.add_dependency(&instance, member)?;
                }
            }
        }

        Ok(())
    }
}

/// Listed definitions indexed by key, in listing order.
struct Pool {
    defs: Vec<ResourceDefinition>,
    index: HashMap<ResourceKey, usize>,
}

impl Pool {
    fn index(defs: Vec<ResourceDefinition>) -> Result<Self, BuildError> {
        let mut index = HashMap::with_capacity(defs.len());
        for (i, def) in defs.iter().enumerate() {
            if index.insert(def.key(), i).is_some() {
                return Err(BuildError::DuplicateDefinition(def.key()));
            }
        }
        let pool = Self { defs, index };
        // Every reference must resolve even for definitions that end up
        // outside the selection.
        for def in &pool.defs {
            for reference in &def.depends_on {
                pool.resolve(&def.key(), reference)?;
            }
        }
        Ok(pool)
    }

    fn defs(&self) -> &[ResourceDefinition] {
        &self.defs
    }

    fn resolve(
        &self,
        from: &ResourceKey,
        reference: &str,
    ) -> Result<&ResourceDefinition, BuildError> {
        self.index
            .get(&ResourceKey::from_string(reference))
            .map(|&i| &self.defs[i])
            .ok_or_else(|| BuildError::UnknownDependency {
                from: from.clone(),
                reference: reference.to_owned(),
            })
    }

    fn all_keys(&self) -> HashSet<ResourceKey> {
        self.index.keys().cloned().collect()
    }

    /// Flow members (exported only, if asked) plus everything reachable
    /// through `depends_on`, crossing flow boundaries.
    fn flow_closure(&self, flow: &str, exported_only: bool) -> HashSet<ResourceKey> {
        let mut selected = HashSet::new();
        let mut queue: VecDeque<ResourceKey> = self
            .defs
            .iter()
            .filter(|def| def.flow.as_deref() == Some(flow))
            .filter(|def| !exported_only || def.exported)
            .map(ResourceDefinition::key)
            .collect();

        while let Some(key) = queue.pop_front() {
            if !selected.insert(key.clone()) {
                continue;
            }
            if let Some(&i) = self.index.get(&key) {
                for reference in &self.defs[i].depends_on {
                    queue.push_back(ResourceKey::from_string(reference.as_str()));
                }
            }
        }
        selected
    }
}

/// Key for one replica's instance of a flow member. Non-replicated flow
/// runs keep the plain `kind/name` key.
fn member_key(def: &ResourceDefinition, flow: &str, replica: usize, replicated: bool) -> ResourceKey {
    if replicated {
        ResourceKey::replicated(flow, replica, &def.kind, &def.name)
    } else {
        def.key()
    }
}

/// Merges caller arguments over the flow's defaults, validating caller keys
/// against the declared set.
fn bind_args(
    flow: &FlowDefinition,
    options: &GraphOptions,
) -> Result<BTreeMap<String, String>, BuildError> {
    let mut bound = flow.defaults.clone();
    for (key, value) in &options.args {
        if !flow.declared_args.contains(key) && !options.allow_undeclared_args {
            return Err(BuildError::UndeclaredArgument {
                flow: flow.name.clone(),
                key: key.clone(),
            });
        }
        bound.insert(key.clone(), value.clone());
    }
    Ok(bound)
}
