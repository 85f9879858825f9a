//! Integration tests for the graph build pipeline: selection, flow closure,
//! argument binding, and replica fan-out.


use caravel_cluster::{
    FlowDefinition, MemoryCluster, ResourceDefinition, ResourceKey, Selector,
};
use caravel_graph::builder::BuildError;
use caravel_graph::{GraphBuilder, GraphOptions, Node, ReplicaSpec};
use test_utils::{build, chain_cluster, flow_cluster, key};

// ═══════════════════════════════════════════════════════════════════════════════
// SELECTION AND VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// A plain run includes every definition the selector matches, with edges
/// following `depends_on`.
#[test]
fn plain_run_includes_all_matching_definitions() {
    let graph = build(&chain_cluster(), &GraphOptions::new());

    assert_eq!(graph.len(), 3);
    assert_eq!(
        graph.dependencies_of(&key("service/api")),
        &[key("job/migrate")]
    );
    assert_eq!(graph.dependencies_of(&key("job/migrate")), &[key("pod/db")]);
    assert_eq!(graph.dependents_of(&key("pod/db")), &[key("job/migrate")]);
}

/// The selector narrows the listing before any graph is built.
#[test]
fn selector_narrows_the_listing() {
    let cluster = MemoryCluster::new();
    cluster.define(ResourceDefinition::new("pod", "web").with_label("tier", "frontend"));
    cluster.define(ResourceDefinition::new("pod", "db").with_label("tier", "backend"));

    let selector = Selector::parse("tier=frontend").unwrap();
    let graph = GraphBuilder::new(&cluster, selector)
        .build(&GraphOptions::new())
        .unwrap();

    assert_eq!(graph.len(), 1);
    assert!(graph.contains(&key("pod/web")));
}

/// A dangling `depends_on` reference aborts the build with no graph.
#[test]
fn unknown_dependency_is_rejected() {
    let cluster = MemoryCluster::new();
    cluster.define(ResourceDefinition::new("pod", "web").with_dependency("pod/ghost"));

    let err = GraphBuilder::new(&cluster, Selector::match_all())
        .build(&GraphOptions::new())
        .unwrap_err();
    assert!(matches!(
        err,
        BuildError::UnknownDependency { ref reference, .. } if reference == "pod/ghost"
    ));
}

/// Two definitions sharing a `kind/name` key abort the build.
#[test]
fn duplicate_definitions_are_rejected() {
    let cluster = MemoryCluster::new();
    cluster.define(ResourceDefinition::new("pod", "web"));
    cluster.define(ResourceDefinition::new("pod", "web"));

    let err = GraphBuilder::new(&cluster, Selector::match_all())
        .build(&GraphOptions::new())
        .unwrap_err();
    assert!(matches!(err, BuildError::DuplicateDefinition(k) if k == key("pod/web")));
}

// ═══════════════════════════════════════════════════════════════════════════════
// FLOW SELECTION
// ═══════════════════════════════════════════════════════════════════════════════

/// A flow-scoped run pulls in the flow's members plus the dependency
/// closure, crossing the flow boundary into `pod/db`.
#[test]
fn flow_run_pulls_in_dependency_closure() {
    let graph = build(&flow_cluster(), &GraphOptions::new().for_flow("frontend"));

    // Two members + the external db + one flow-instance node.
    assert_eq!(graph.len(), 4);
    assert!(graph.contains(&key("pod/web")));
    assert!(graph.contains(&key("pod/cache")));
    assert!(graph.contains(&key("pod/db")));
    assert!(graph.contains(&ResourceKey::flow_instance("frontend", 0)));

    // The flow instance depends on both members but not on the external.
    let instance_deps = graph.dependencies_of(&ResourceKey::flow_instance("frontend", 0));
    assert_eq!(instance_deps.len(), 2);
    assert!(!instance_deps.contains(&key("pod/db")));
}

/// With `exported_only`, closure starts from exported members only; members
/// reachable only through unexported seeds drop out.
#[test]
fn exported_only_restricts_the_seed_set() {
    let cluster = flow_cluster();
    // An unexported member nothing else depends on.
    cluster.define(ResourceDefinition::new("pod", "sidecar").in_flow("frontend", false));

    let all = build(&cluster, &GraphOptions::new().for_flow("frontend"));
    assert!(all.contains(&key("pod/sidecar")));

    let exported = build(
        &cluster,
        &GraphOptions::new().for_flow("frontend").exported_only(true),
    );
    assert!(!exported.contains(&key("pod/sidecar")));
    // web -> cache -> db are all still reachable from the exported seed.
    assert!(exported.contains(&key("pod/cache")));
    assert!(exported.contains(&key("pod/db")));
}

/// Naming a flow with no flow definition is a validation error.
#[test]
fn unknown_flow_is_rejected() {
    let err = GraphBuilder::new(&flow_cluster(), Selector::match_all())
        .build(&GraphOptions::new().for_flow("backend"))
        .unwrap_err();
    assert!(matches!(err, BuildError::UnknownFlow(name) if name == "backend"));
}

// ═══════════════════════════════════════════════════════════════════════════════
// ARGUMENT BINDING
// ═══════════════════════════════════════════════════════════════════════════════

/// Caller args merge over flow defaults; member nodes carry the bound map.
#[test]
fn caller_args_merge_over_defaults() {
    let options = GraphOptions::new()
        .for_flow("frontend")
        .with_arg("image", "nginx");
    let graph = build(&flow_cluster(), &options);

    let node = graph.get(&key("pod/web")).unwrap();
    let args = node.args().unwrap();
    assert_eq!(args.get("image").map(String::as_str), Some("nginx"));
    // Default survives because the caller never overrode it.
    assert_eq!(args.get("tag").map(String::as_str), Some("latest"));
}

/// An argument key outside the flow's declared set is rejected unless the
/// run opts in, in which case it is carried opaquely.
#[test]
fn undeclared_arguments_require_opt_in() {
    let options = GraphOptions::new()
        .for_flow("frontend")
        .with_arg("color", "blue");
    let err = GraphBuilder::new(&flow_cluster(), Selector::match_all())
        .build(&options)
        .unwrap_err();
    assert!(matches!(
        err,
        BuildError::UndeclaredArgument { ref key, .. } if key == "color"
    ));

    let graph = build(&flow_cluster(), &options.clone().allow_undeclared_args(true));
    let node = graph.get(&key("pod/web")).unwrap();
    assert_eq!(
        node.args().unwrap().get("color").map(String::as_str),
        Some("blue")
    );
}

/// External nodes in the closure never receive flow argument bindings.
#[test]
fn external_nodes_are_not_parameterized() {
    let options = GraphOptions::new()
        .for_flow("frontend")
        .with_arg("image", "nginx");
    let graph = build(&flow_cluster(), &options);

    let db = graph.get(&key("pod/db")).unwrap();
    assert!(db.args().unwrap().is_empty());
}

// ═══════════════════════════════════════════════════════════════════════════════
// REPLICA FAN-OUT
// ═══════════════════════════════════════════════════════════════════════════════

/// An absolute replica count instantiates the member subgraph once per
/// index, with templated keys and per-replica flow instances.
#[test]
fn absolute_replicas_template_member_keys() {
    let options = GraphOptions::new()
        .for_flow("frontend")
        .with_replicas(ReplicaSpec::Absolute(2));
    let graph = build(&flow_cluster(), &options);

    // 2 replicas x 2 members + shared external + 2 flow instances.
    assert_eq!(graph.len(), 7);
    for replica in 0..2 {
        let web = ResourceKey::replicated("frontend", replica, "pod", "web");
        let cache = ResourceKey::replicated("frontend", replica, "pod", "cache");
        assert_eq!(graph.dependencies_of(&web), &[cache.clone()]);
        // Each replica's cache shares the single external db.
        assert_eq!(graph.dependencies_of(&cache), &[key("pod/db")]);
        let instance = ResourceKey::flow_instance("frontend", replica);
        assert_eq!(graph.dependencies_of(&instance).len(), 2);
    }
}

/// A delta replica spec resolves against the count the cluster reports.
#[test]
fn delta_replicas_resolve_against_existing_count() {
    let cluster = flow_cluster();
    cluster.set_existing_replicas("frontend", 3);

    let options = GraphOptions::new()
        .for_flow("frontend")
        .with_replicas(ReplicaSpec::Delta(2));
    let graph = build(&cluster, &options);

    let instances = graph
        .nodes()
        .filter(|node| matches!(node, Node::FlowInstance(_)))
        .count();
    assert_eq!(instances, 5);
}

/// An absolute count of zero is clamped up to `min_replicas`.
#[test]
fn zero_replicas_clamp_to_minimum() {
    let options = GraphOptions::new()
        .for_flow("frontend")
        .with_replicas(ReplicaSpec::Absolute(0))
        .min_replicas(1);
    let graph = build(&flow_cluster(), &options);

    assert!(graph.contains(&ResourceKey::replicated("frontend", 0, "pod", "web")));
    assert!(!graph.contains(&ResourceKey::replicated("frontend", 1, "pod", "web")));
}

/// The clamp also holds for untouched default options: an explicit "0"
/// must never produce an empty graph.
#[test]
fn default_options_never_erase_the_flow() {
    let options = GraphOptions::default()
        .for_flow("frontend")
        .with_replicas(ReplicaSpec::Absolute(0));
    let graph = build(&flow_cluster(), &options);

    assert!(!graph.is_empty());
    assert!(graph.contains(&ResourceKey::replicated("frontend", 0, "pod", "web")));
    assert!(graph.contains(&ResourceKey::flow_instance("frontend", 0)));
}

/// Replica fan-out without a flow scope is a validation error.
#[test]
fn replicas_require_a_flow() {
    let err = GraphBuilder::new(&chain_cluster(), Selector::match_all())
        .build(&GraphOptions::new().with_replicas(ReplicaSpec::Absolute(2)))
        .unwrap_err();
    assert!(matches!(err, BuildError::ReplicasWithoutFlow));
}

/// Flow arguments still bind when the flow declares none and the run passes
/// none; an empty declared set simply rejects everything undeclared.
#[test]
fn argless_flow_builds() {
    let cluster = MemoryCluster::new();
    cluster.define(ResourceDefinition::new("pod", "solo").in_flow("batch", true));
    cluster.define_flow(FlowDefinition::new("batch", []));

    let graph = build(&cluster, &GraphOptions::new().for_flow("batch"));
    assert_eq!(graph.len(), 2);
}
