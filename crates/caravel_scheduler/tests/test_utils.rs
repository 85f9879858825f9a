//! Shared fixtures for the scheduler integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use caravel_cluster::{MemoryCluster, ResourceDefinition, ResourceKey, Selector};
use caravel_graph::{DependencyGraph, GraphBuilder, GraphOptions};
use caravel_scheduler::{RunReport, Scheduler};
use tokio::sync::watch;

/// Shorthand for a raw key as written in `depends_on` lists.
pub fn key(s: &str) -> ResourceKey {
    ResourceKey::from_string(s)
}

/// Routes scheduler logs to the test harness (visible with `--nocapture`).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A three-resource chain: `service/api -> job/migrate -> pod/db`.
pub fn chain_cluster() -> MemoryCluster {
    let cluster = MemoryCluster::new();
    cluster.define(ResourceDefinition::new("pod", "db"));
    cluster.define(ResourceDefinition::new("job", "migrate").with_dependency("pod/db"));
    cluster.define(ResourceDefinition::new("service", "api").with_dependency("job/migrate"));
    cluster
}

/// A diamond: `service/api` depends on `pod/web` and `pod/worker`, both of
/// which depend on `pod/db`.
pub fn diamond_cluster() -> MemoryCluster {
    let cluster = MemoryCluster::new();
    cluster.define(ResourceDefinition::new("pod", "db"));
    cluster.define(ResourceDefinition::new("pod", "web").with_dependency("pod/db"));
    cluster.define(ResourceDefinition::new("pod", "worker").with_dependency("pod/db"));
    cluster.define(
        ResourceDefinition::new("service", "api")
            .with_dependency("pod/web")
            .with_dependency("pod/worker"),
    );
    cluster
}

/// Builds a graph over everything in the cluster.
pub fn build(cluster: &MemoryCluster, options: &GraphOptions) -> DependencyGraph {
    GraphBuilder::new(cluster, Selector::match_all())
        .build(options)
        .expect("graph should build")
}

/// A scheduler wired to the cluster with millisecond probe pacing.
pub fn fast_scheduler(cluster: &MemoryCluster, concurrency: usize) -> Scheduler {
    Scheduler::new(Arc::new(cluster.clone()), Selector::match_all(), concurrency)
        .with_probe_interval(Duration::from_millis(1))
        .with_probe_attempts(50)
}

/// Runs the graph with a stop signal that is never raised.
pub async fn run(
    scheduler: &Scheduler,
    graph: &mut DependencyGraph,
    options: &GraphOptions,
) -> RunReport {
    let (_stop, stop_rx) = watch::channel(false);
    scheduler.run(graph, options, stop_rx).await
}
