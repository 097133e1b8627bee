//! Chain-specific sequencing for object families whose dependency depth is
//! unbounded (views on views). Layer boundaries are ignored: every family
//! member is ordered against every other member it reaches through the full
//! reference graph, including paths through non-family intermediates.

use super::topo::{self, SequenceResult};
use crate::dependency::DependencyGraph;
use crate::models::ObjectKey;
use std::collections::{BTreeSet, HashSet};
use tracing::info;

/// Member edges `(member, member)` induced by reference paths. A path stops
/// at the first member it reaches; anything else, including family objects
/// left out of `members`, is walked through. A member reaching itself yields
/// a self edge.
pub fn induced_edges(
    graph: &DependencyGraph,
    members: &BTreeSet<ObjectKey>,
) -> BTreeSet<(ObjectKey, ObjectKey)> {
    let mut edges = BTreeSet::new();
    for start in members {
        let mut visited: HashSet<&ObjectKey> = HashSet::new();
        let mut stack: Vec<&ObjectKey> = graph.dependencies_of(start).collect();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if members.contains(current) {
                edges.insert((start.clone(), current.clone()));
                continue;
            }
            stack.extend(graph.dependencies_of(current));
        }
    }
    edges
}

/// Order every family member found in `graph` (or only `restrict_to`, when
/// given) by the full reference graph.
pub fn order_chain<F>(
    graph: &DependencyGraph,
    in_family: F,
    restrict_to: Option<&BTreeSet<ObjectKey>>,
) -> SequenceResult<ObjectKey>
where
    F: Fn(&ObjectKey) -> bool,
{
    let members: BTreeSet<ObjectKey> = graph
        .nodes()
        .filter(|k| in_family(*k))
        .filter(|k| restrict_to.map_or(true, |r| r.contains(*k)))
        .cloned()
        .collect();

    let edges = induced_edges(graph, &members);
    let result = topo::order(members.iter().cloned(), edges);
    info!(
        members = members.len(),
        sequenced = result.sequence.len(),
        cycles = result.cycles.len(),
        "Chain ordering complete"
    );
    result
}

/// Chain ordering over views and materialized views
pub fn order_view_chain(
    graph: &DependencyGraph,
    restrict_to: Option<&BTreeSet<ObjectKey>>,
) -> SequenceResult<ObjectKey> {
    order_chain(graph, |k| k.object_type.is_view_family(), restrict_to)
}
