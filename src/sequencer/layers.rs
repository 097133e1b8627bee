//! Generic layered sequencing.
//!
//! Objects fall into coarse execution layers by type. A node's effective
//! layer is raised to the highest layer of anything it depends on, so a
//! layer is never scheduled ahead of one it structurally needs; inside each
//! layer the within-layer edges are ordered with Kahn.

use super::topo::{self, SequenceResult};
use crate::dependency::DependencyGraph;
use crate::models::{ObjectKey, ObjectType, TaskKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Coarse execution phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    Sequences,
    /// User-defined types precede everything that can reference them
    Types,
    Tables,
    TableAlterations,
    Grants,
    ViewsAndSynonyms,
    MaterializedViews,
    Procedural,
    Bodies,
    ConstraintsAndIndexes,
    Triggers,
    Jobs,
    /// Unrecognized task directories, run last without ordering
    Unordered,
}

impl Layer {
    pub fn for_type(object_type: ObjectType) -> Self {
        match object_type {
            ObjectType::Sequence => Self::Sequences,
            ObjectType::Type => Self::Types,
            ObjectType::Table => Self::Tables,
            ObjectType::View | ObjectType::Synonym => Self::ViewsAndSynonyms,
            ObjectType::MaterializedView => Self::MaterializedViews,
            ObjectType::Procedure | ObjectType::Function | ObjectType::Package => Self::Procedural,
            ObjectType::PackageBody | ObjectType::TypeBody => Self::Bodies,
            ObjectType::Index | ObjectType::Constraint => Self::ConstraintsAndIndexes,
            ObjectType::Trigger => Self::Triggers,
            ObjectType::Job => Self::Jobs,
        }
    }

    pub fn for_kind(kind: &TaskKind) -> Self {
        match kind {
            TaskKind::Object(t) => Self::for_type(*t),
            TaskKind::TableAlter => Self::TableAlterations,
            TaskKind::Grant => Self::Grants,
            TaskKind::Unrecognized(_) => Self::Unordered,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Sequences => "sequences",
            Self::Types => "types",
            Self::Tables => "tables",
            Self::TableAlterations => "table_alterations",
            Self::Grants => "grants",
            Self::ViewsAndSynonyms => "views_and_synonyms",
            Self::MaterializedViews => "materialized_views",
            Self::Procedural => "procedural",
            Self::Bodies => "bodies",
            Self::ConstraintsAndIndexes => "constraints_and_indexes",
            Self::Triggers => "triggers",
            Self::Jobs => "jobs",
            Self::Unordered => "unordered",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedLayer {
    pub layer: Layer,
    pub ordering: SequenceResult<ObjectKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerPlan {
    pub layers: Vec<PlannedLayer>,
    pub assignments: BTreeMap<ObjectKey, Layer>,
}

impl LayerPlan {
    /// Flattened execution order across all layers
    pub fn sequence(&self) -> Vec<ObjectKey> {
        self.layers
            .iter()
            .flat_map(|l| l.ordering.sequence.iter().cloned())
            .collect()
    }

    pub fn cycles(&self) -> Vec<Vec<ObjectKey>> {
        self.layers
            .iter()
            .flat_map(|l| l.ordering.cycles.iter().cloned())
            .collect()
    }

    /// Cycle members plus everything waiting on a cycle
    pub fn unsequenced(&self) -> BTreeSet<ObjectKey> {
        self.layers
            .iter()
            .flat_map(|l| l.ordering.unsequenced())
            .collect()
    }

    pub fn layer_of(&self, key: &ObjectKey) -> Option<Layer> {
        self.assignments.get(key).copied()
    }
}

/// Raise every node to the highest layer among its dependencies. Each pass
/// only raises, and layers are bounded, so the loop terminates.
pub fn assign_layers(
    graph: &DependencyGraph,
    nodes: &BTreeSet<ObjectKey>,
) -> BTreeMap<ObjectKey, Layer> {
    let mut assignments: BTreeMap<ObjectKey, Layer> = nodes
        .iter()
        .map(|k| (k.clone(), Layer::for_type(k.object_type)))
        .collect();

    let edges: Vec<(&ObjectKey, &ObjectKey)> = graph
        .edges()
        .filter(|(d, r)| nodes.contains(*d) && nodes.contains(*r))
        .collect();

    loop {
        let mut changed = false;
        for (dependent, dependency) in &edges {
            let needed = assignments[*dependency];
            if let Some(current) = assignments.get_mut(*dependent) {
                if *current < needed {
                    debug!(
                        object = %dependent,
                        from = %current,
                        to = %needed,
                        "Raising layer to follow dependency"
                    );
                    *current = needed;
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
    assignments
}

/// Members of one layer that wait on `unresolved`, directly or through
/// other held members of the same layer.
fn held_back(
    graph: &DependencyGraph,
    members: &BTreeSet<ObjectKey>,
    unresolved: &BTreeSet<ObjectKey>,
) -> BTreeSet<ObjectKey> {
    let mut held: BTreeSet<ObjectKey> = BTreeSet::new();
    loop {
        let newly: Vec<ObjectKey> = members
            .iter()
            .filter(|key| !held.contains(*key))
            .filter(|key| {
                graph
                    .dependencies_of(key)
                    .any(|dep| unresolved.contains(dep) || held.contains(dep))
            })
            .cloned()
            .collect();
        if newly.is_empty() {
            return held;
        }
        held.extend(newly);
    }
}

/// Plan `nodes` in layer order. Nodes that transitively depend on an
/// unsequenced node in an earlier layer are held back as blocked by that
/// cycle.
pub fn plan_layers(graph: &DependencyGraph, nodes: &BTreeSet<ObjectKey>) -> LayerPlan {
    let assignments = assign_layers(graph, nodes);

    let mut by_layer: BTreeMap<Layer, BTreeSet<ObjectKey>> = BTreeMap::new();
    for (key, layer) in &assignments {
        by_layer.entry(*layer).or_default().insert(key.clone());
    }

    let mut unresolved: BTreeSet<ObjectKey> = BTreeSet::new();
    let mut layers = Vec::with_capacity(by_layer.len());

    for (layer, members) in by_layer {
        let held = held_back(graph, &members, &unresolved);
        let runnable: BTreeSet<ObjectKey> = members.difference(&held).cloned().collect();

        let edges = graph
            .edges()
            .filter(|(d, r)| runnable.contains(*d) && runnable.contains(*r))
            .map(|(d, r)| (d.clone(), r.clone()));
        let mut ordering = topo::order(runnable.iter().cloned(), edges);

        ordering.blocked_by_cycle.extend(held);
        ordering.blocked_by_cycle.sort();
        ordering.blocked_by_cycle.dedup();
        unresolved.extend(ordering.unsequenced());

        layers.push(PlannedLayer { layer, ordering });
    }

    LayerPlan {
        layers,
        assignments,
    }
}
