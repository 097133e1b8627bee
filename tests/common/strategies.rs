use proptest::prelude::*;
use schema_fixup::models::{ObjectKey, ObjectType};

/// Views `APP.N00 ..` so node names sort in index order
pub fn node(index: usize) -> ObjectKey {
    ObjectKey::new("APP", format!("N{index:02}"), ObjectType::View)
}

/// Like `node`, but cycling through object types so nodes spread across
/// execution layers
pub fn layered_node(index: usize) -> ObjectKey {
    const TYPES: [ObjectType; 5] = [
        ObjectType::Table,
        ObjectType::View,
        ObjectType::Function,
        ObjectType::PackageBody,
        ObjectType::Trigger,
    ];
    ObjectKey::new("APP", format!("N{index:02}"), TYPES[index % TYPES.len()])
}

/// Node count plus arbitrary edges between those nodes, cycles included
pub fn graph_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (1usize..12).prop_flat_map(|n| {
        let edges = prop::collection::vec((0..n, 0..n), 0..30);
        (Just(n), edges)
    })
}

/// Edges that only point from higher to lower indices, so always acyclic
pub fn acyclic_graph_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    graph_strategy().prop_map(|(n, edges)| {
        let edges = edges
            .into_iter()
            .filter(|(a, b)| a != b)
            .map(|(a, b)| if a > b { (a, b) } else { (b, a) })
            .collect();
        (n, edges)
    })
}

/// Blacklisted node indices
pub fn blacklist_strategy(n: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0..n, 0..4)
}
