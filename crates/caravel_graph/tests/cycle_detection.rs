//! Structural tests for the cycle detector, including property-based
//! coverage over randomly generated graphs.


use caravel_cluster::ResourceKey;
use caravel_graph::{DependencyGraph, Node, detect_cycles};
use proptest::prelude::*;

fn instance_key(i: usize) -> ResourceKey {
    ResourceKey::flow_instance("n", i)
}

/// Graph with nodes `0..n` and the given index edges.
fn index_graph(n: usize, edges: &[(usize, usize)]) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    for i in 0..n {
        graph.add_node(Node::flow_instance("n", i)).unwrap();
    }
    for &(from, to) in edges {
        graph
            .add_dependency(&instance_key(from), &instance_key(to))
            .unwrap();
    }
    graph
}

/// A three-node cycle is reported with exactly its participants.
#[test]
fn three_node_cycle_is_reported_exactly() {
    let graph = index_graph(4, &[(0, 1), (1, 2), (2, 0), (3, 0)]);
    let cycles = detect_cycles(&graph);

    assert_eq!(cycles.len(), 1);
    let mut keys: Vec<_> = cycles[0].keys().to_vec();
    keys.sort();
    assert_eq!(keys, vec![instance_key(0), instance_key(1), instance_key(2)]);
}

/// A cycle unreachable from the "natural" roots is still found because
/// every node is used as a DFS root.
#[test]
fn disconnected_cycle_is_found() {
    let graph = index_graph(5, &[(0, 1), (3, 4), (4, 3)]);
    let cycles = detect_cycles(&graph);
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].keys().len(), 2);
}

/// A linear chain far deeper than any thread stack could absorb if the
/// walk recursed per edge. The detector must stay silent on it, and still
/// find the cycle once the chain is closed.
#[test]
fn very_deep_chain_is_traversed_without_overflow() {
    let n = 100_000;
    let mut edges: Vec<(usize, usize)> = (1..n).map(|i| (i, i - 1)).collect();
    let graph = index_graph(n, &edges);
    assert!(detect_cycles(&graph).is_empty());

    edges.push((0, n - 1));
    let closed = index_graph(n, &edges);
    let cycles = detect_cycles(&closed);
    assert_eq!(cycles.len(), 1);
    assert_eq!(cycles[0].keys().len(), n);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Any graph whose edges all point from a higher index to a lower one
    /// is acyclic by construction, so the detector must stay silent.
    #[test]
    fn forward_edge_graphs_are_acyclic(
        n in 2usize..20,
        pairs in prop::collection::vec((0usize..100, 0usize..100), 0..40),
    ) {
        let edges: Vec<(usize, usize)> = pairs
            .into_iter()
            .map(|(a, b)| (a % n, b % n))
            .filter(|(from, to)| from > to)
            .collect();
        let graph = index_graph(n, &edges);
        prop_assert!(detect_cycles(&graph).is_empty());
    }

    /// Closing any forward-edge chain back to its start produces at least
    /// one reported cycle containing the start node.
    #[test]
    fn closing_a_chain_reports_a_cycle(len in 2usize..12) {
        let mut edges: Vec<(usize, usize)> = (1..len).map(|i| (i, i - 1)).collect();
        edges.push((0, len - 1));
        let graph = index_graph(len, &edges);

        let cycles = detect_cycles(&graph);
        prop_assert!(!cycles.is_empty());
        prop_assert!(
            cycles
                .iter()
                .any(|c| c.keys().contains(&instance_key(0)))
        );
    }
}
