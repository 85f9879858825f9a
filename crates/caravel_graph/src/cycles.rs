//! Cycle detection over the dependency graph.
//!
//! Execution of a graph with a dependency cycle would stall forever, so a
//! run is rejected up front if this pass finds anything. The walk is a
//! three-color depth-first search started from every node in sorted key
//! order, which makes the reported cycle list deterministic for a given
//! graph.

use std::fmt;

use caravel_cluster::ResourceKey;
use hashbrown::HashMap;

use crate::graph::DependencyGraph;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

/// One dependency cycle, in traversal order starting from the node where
/// the back edge closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cycle(Vec<ResourceKey>);

impl Cycle {
    /// The keys participating in the cycle.
    #[must_use]
    pub fn keys(&self) -> &[ResourceKey] {
        &self.0
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for key in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{key}")?;
            first = false;
        }
        Ok(())
    }
}

/// Finds every dependency cycle in the graph. Returns an empty vec when the
/// graph is acyclic. Read-only: the graph is untouched either way.
#[must_use]
pub fn detect_cycles(graph: &DependencyGraph) -> Vec<Cycle> {
    let mut colors: HashMap<ResourceKey, Color> = graph
        .nodes()
        .map(|node| (node.key().clone(), Color::White))
        .collect();
    let mut cycles = Vec::new();

    for root in graph.sorted_keys() {
        if colors[&root] == Color::White {
            visit(graph, root, &mut colors, &mut cycles);
        }
    }
    cycles
}

/// One DFS from `root` over an explicit frame stack, so chain depth is
/// bounded by the heap rather than the thread stack. Each frame holds a
/// node plus a cursor into its dependency list; `path` mirrors the grey
/// frames for cycle extraction.
fn visit(
    graph: &DependencyGraph,
    root: ResourceKey,
    colors: &mut HashMap<ResourceKey, Color>,
    cycles: &mut Vec<Cycle>,
) {
    let mut path: Vec<ResourceKey> = vec![root.clone()];
    let mut stack: Vec<(ResourceKey, usize)> = vec![(root.clone(), 0)];
    colors.insert(root, Color::Grey);

    loop {
        let next = {
            let Some((key, cursor)) = stack.last_mut() else {
                break;
            };
            let deps = graph.dependencies_of(key);
            if *cursor < deps.len() {
                let next = deps[*cursor].clone();
                *cursor += 1;
                Some(next)
            } else {
                None
            }
        };

        match next {
            Some(next) => match colors[&next] {
                Color::White => {
                    colors.insert(next.clone(), Color::Grey);
                    path.push(next.clone());
                    stack.push((next, 0));
                }
                Color::Grey => {
                    // Back edge: everything on the path from `next` onward
                    // is the cycle.
                    if let Some(idx) = path.iter().position(|k| *k == next) {
                        cycles.push(Cycle(path[idx..].to_vec()));
                    }
                }
                Color::Black => {}
            },
            // Frame exhausted: the node is finished.
            None => {
                if let Some((key, _)) = stack.pop() {
                    colors.insert(key, Color::Black);
                    path.pop();
                }
            }
        }
    }
}
