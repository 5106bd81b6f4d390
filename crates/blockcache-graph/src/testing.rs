//! Shared fixtures for unit tests.

use std::collections::BTreeSet;

use proptest::prelude::*;
use proptest::sample::Index;

use crate::graph::BlockGraph;
use crate::structure::BlockStructure;

/// Edges of a DAG over `0..n` rooted at 0. Every node `i > 0` has one to
/// three parents drawn from `0..i`, so the whole graph is reachable.
pub fn arb_dag_edges() -> impl Strategy<Value = Vec<(u64, u64)>> {
    (2usize..14)
        .prop_flat_map(|n| {
            prop::collection::vec(prop::collection::vec(any::<Index>(), 1..4), n - 1)
        })
        .prop_map(|parent_picks| {
            let mut edges = Vec::new();
            for (offset, picks) in parent_picks.into_iter().enumerate() {
                let child = offset as u64 + 1;
                let parents: BTreeSet<u64> =
                    picks.iter().map(|p| p.index(child as usize) as u64).collect();
                edges.extend(parents.into_iter().map(|parent| (parent, child)));
            }
            edges
        })
}

/// Build a graph rooted at 0 from `(parent, child)` edges.
pub fn graph_from_edges(edges: &[(u64, u64)]) -> BlockGraph<u64> {
    let mut graph = BlockGraph::new(0);
    for (parent, child) in edges {
        graph.add_relation(parent, child);
    }
    graph
}

/// Build a structure rooted at 0 from `(parent, child)` edges.
pub fn structure_from_edges(edges: &[(u64, u64)]) -> BlockStructure<u64> {
    let mut structure = BlockStructure::new(0);
    for (parent, child) in edges {
        structure.add_relation(parent, child);
    }
    structure
}
