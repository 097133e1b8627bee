//! Kahn ordering with cycle grouping.
//!
//! Edges are `(dependent, dependency)` pairs. Ready nodes are released in
//! ascending `Ord` order so repeated runs over the same input give the same
//! sequence. Nodes still waiting when the queue drains are split into the
//! strongly connected components that actually form cycles and the nodes
//! that merely sit downstream of one.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceResult<N: Ord> {
    /// Linear order; every dependency precedes its dependents
    pub sequence: Vec<N>,
    /// Wave index per sequenced node; nodes in one wave share no edges
    pub depth: BTreeMap<N, usize>,
    /// Cycle members, each group sorted, groups sorted by first member
    pub cycles: Vec<Vec<N>>,
    /// Not in a cycle, but waiting on one
    pub blocked_by_cycle: Vec<N>,
}

impl<N: Ord + Clone> SequenceResult<N> {
    pub fn is_acyclic(&self) -> bool {
        self.cycles.is_empty()
    }

    /// Sequence grouped into dependency waves, preserving sequence order
    pub fn waves(&self) -> Vec<Vec<N>> {
        let mut waves: Vec<Vec<N>> = Vec::new();
        for node in &self.sequence {
            let depth = self.depth.get(node).copied().unwrap_or(0);
            if waves.len() <= depth {
                waves.resize_with(depth + 1, Vec::new);
            }
            waves[depth].push(node.clone());
        }
        waves
    }

    /// Every node kept out of the sequence
    pub fn unsequenced(&self) -> BTreeSet<N> {
        self.cycles
            .iter()
            .flatten()
            .chain(self.blocked_by_cycle.iter())
            .cloned()
            .collect()
    }
}

/// Order `nodes` so every dependency precedes its dependents. Edges with an
/// endpoint outside `nodes` are ignored.
pub fn order<N, I, E>(nodes: I, edges: E) -> SequenceResult<N>
where
    N: Ord + Clone,
    I: IntoIterator<Item = N>,
    E: IntoIterator<Item = (N, N)>,
{
    let node_set: BTreeSet<N> = nodes.into_iter().collect();
    let mut waiting_on: BTreeMap<N, usize> = node_set.iter().map(|n| (n.clone(), 0)).collect();
    let mut dependents: BTreeMap<N, BTreeSet<N>> = BTreeMap::new();
    let mut dependencies: BTreeMap<N, BTreeSet<N>> = BTreeMap::new();

    for (dependent, dependency) in edges {
        if !node_set.contains(&dependent) || !node_set.contains(&dependency) {
            continue;
        }
        if dependents
            .entry(dependency.clone())
            .or_default()
            .insert(dependent.clone())
        {
            if let Some(count) = waiting_on.get_mut(&dependent) {
                *count += 1;
            }
            dependencies.entry(dependent).or_default().insert(dependency);
        }
    }

    let mut ready: BinaryHeap<Reverse<N>> = waiting_on
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(n, _)| Reverse(n.clone()))
        .collect();
    let mut sequence = Vec::with_capacity(node_set.len());
    let mut depth: BTreeMap<N, usize> = BTreeMap::new();

    while let Some(Reverse(node)) = ready.pop() {
        let node_depth = dependencies
            .get(&node)
            .into_iter()
            .flatten()
            .filter_map(|dep| depth.get(dep))
            .map(|d| d + 1)
            .max()
            .unwrap_or(0);
        depth.insert(node.clone(), node_depth);

        for dependent in dependents.get(&node).into_iter().flatten() {
            if let Some(count) = waiting_on.get_mut(dependent) {
                *count -= 1;
                if *count == 0 {
                    ready.push(Reverse(dependent.clone()));
                }
            }
        }
        sequence.push(node);
    }

    let leftover: Vec<N> = waiting_on
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(n, _)| n)
        .collect();

    let (cycles, blocked_by_cycle) = if leftover.is_empty() {
        (Vec::new(), Vec::new())
    } else {
        split_cycles(&leftover, &dependencies)
    };

    SequenceResult {
        sequence,
        depth,
        cycles,
        blocked_by_cycle,
    }
}

/// Tarjan's SCC over the leftover subgraph, iterative so long view chains
/// cannot exhaust the stack.
fn split_cycles<N: Ord + Clone>(
    leftover: &[N],
    dependencies: &BTreeMap<N, BTreeSet<N>>,
) -> (Vec<Vec<N>>, Vec<N>) {
    let index_of: BTreeMap<&N, usize> = leftover.iter().enumerate().map(|(i, n)| (n, i)).collect();
    let successors: Vec<Vec<usize>> = leftover
        .iter()
        .map(|n| {
            dependencies
                .get(n)
                .into_iter()
                .flatten()
                .filter_map(|dep| index_of.get(dep).copied())
                .collect()
        })
        .collect();

    let count = leftover.len();
    let mut index: Vec<Option<usize>> = vec![None; count];
    let mut lowlink = vec![0usize; count];
    let mut on_stack = vec![false; count];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut components: Vec<Vec<usize>> = Vec::new();

    for start in 0..count {
        if index[start].is_some() {
            continue;
        }
        index[start] = Some(next_index);
        lowlink[start] = next_index;
        next_index += 1;
        stack.push(start);
        on_stack[start] = true;
        let mut frames: Vec<(usize, usize)> = vec![(start, 0)];

        while let Some(frame) = frames.last_mut() {
            let v = frame.0;
            if frame.1 < successors[v].len() {
                let w = successors[v][frame.1];
                frame.1 += 1;
                match index[w] {
                    None => {
                        index[w] = Some(next_index);
                        lowlink[w] = next_index;
                        next_index += 1;
                        stack.push(w);
                        on_stack[w] = true;
                        frames.push((w, 0));
                    }
                    Some(w_index) if on_stack[w] => {
                        lowlink[v] = lowlink[v].min(w_index);
                    }
                    Some(_) => {}
                }
            } else {
                frames.pop();
                if let Some(&(parent, _)) = frames.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }
                if index[v] == Some(lowlink[v]) {
                    let mut component = Vec::new();
                    while let Some(w) = stack.pop() {
                        on_stack[w] = false;
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    components.push(component);
                }
            }
        }
    }

    let mut cycles: Vec<Vec<N>> = Vec::new();
    let mut blocked: Vec<N> = Vec::new();
    for component in components {
        let is_cycle = component.len() > 1 || successors[component[0]].contains(&component[0]);
        let mut members: Vec<N> = component.into_iter().map(|i| leftover[i].clone()).collect();
        members.sort();
        if is_cycle {
            cycles.push(members);
        } else {
            blocked.extend(members);
        }
    }
    cycles.sort();
    blocked.sort();
    (cycles, blocked)
}
