//! # Dependency Graph Builder
//!
//! Turns the flat "X references Y" relation plus schema remap rules into a
//! directed graph. Edges point from a dependent to the object it needs.
//! The builder is the only place edges are created; every consumer reads the
//! finished [`DependencyGraph`] through shared references.

use crate::models::{NamespaceClass, ObjectCatalog, ObjectKey, ObjectReference, ObjectType, RemapRule};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphError {
    #[error("Object {schema}.{name} declared as both {existing} and {incoming}")]
    ConflictingType {
        schema: String,
        name: String,
        existing: ObjectType,
        incoming: ObjectType,
    },
}

/// Target-side identity after remapping
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetIdentity {
    pub schema: String,
    pub name: String,
}

/// An object whose remap rules disagree about where it lands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapConflict {
    pub object: ObjectKey,
    pub candidates: Vec<TargetIdentity>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub nodes: usize,
    pub edges: usize,
    pub dangling_references: usize,
    pub self_references: usize,
    pub duplicate_references: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeSet<ObjectKey>,
    targets: BTreeMap<ObjectKey, TargetIdentity>,
    conflicts: BTreeMap<ObjectKey, RemapConflict>,
    /// dependent -> dependencies
    dependencies: BTreeMap<ObjectKey, BTreeSet<ObjectKey>>,
    /// dependency -> dependents
    dependents: BTreeMap<ObjectKey, BTreeSet<ObjectKey>>,
    stats: GraphStats,
}

impl DependencyGraph {
    /// Build the graph. Fails only on a node declared twice with
    /// conflicting types inside one name-resolution class.
    pub fn build(
        objects: &[ObjectKey],
        references: &[ObjectReference],
        remap_rules: &[RemapRule],
    ) -> Result<Self, GraphError> {
        let mut graph = DependencyGraph::default();
        let mut declared: HashMap<(&str, &str, NamespaceClass), ObjectType> = HashMap::new();

        for key in objects {
            let slot = (key.schema.as_str(), key.name.as_str(), key.object_type.namespace());
            match declared.get(&slot) {
                Some(existing) if *existing != key.object_type => {
                    return Err(GraphError::ConflictingType {
                        schema: key.schema.clone(),
                        name: key.name.clone(),
                        existing: *existing,
                        incoming: key.object_type,
                    });
                }
                Some(_) => continue,
                None => {
                    declared.insert(slot, key.object_type);
                    graph.nodes.insert(key.clone());
                }
            }
        }

        for key in &graph.nodes {
            match resolve_target(key, remap_rules) {
                Ok(target) => {
                    graph.targets.insert(key.clone(), target);
                }
                Err(conflict) => {
                    warn!(
                        object = %key,
                        candidates = conflict.candidates.len(),
                        "Remap rules map object to more than one target; manual resolution required"
                    );
                    graph.conflicts.insert(key.clone(), conflict);
                }
            }
        }

        for reference in references {
            let (dependent, dependency) = (&reference.dependent, &reference.referenced);
            if dependent == dependency {
                graph.stats.self_references += 1;
                continue;
            }
            if !graph.nodes.contains(dependent) || !graph.nodes.contains(dependency) {
                debug!(
                    dependent = %dependent,
                    referenced = %dependency,
                    "Dropping reference to untracked object"
                );
                graph.stats.dangling_references += 1;
                continue;
            }
            let inserted = graph
                .dependencies
                .entry(dependent.clone())
                .or_default()
                .insert(dependency.clone());
            if inserted {
                graph
                    .dependents
                    .entry(dependency.clone())
                    .or_default()
                    .insert(dependent.clone());
                graph.stats.edges += 1;
            } else {
                graph.stats.duplicate_references += 1;
            }
        }

        graph.stats.nodes = graph.nodes.len();
        info!(
            nodes = graph.stats.nodes,
            edges = graph.stats.edges,
            dangling = graph.stats.dangling_references,
            conflicts = graph.conflicts.len(),
            "Dependency graph built"
        );
        Ok(graph)
    }

    pub fn from_catalog(catalog: &ObjectCatalog) -> Result<Self, GraphError> {
        Self::build(&catalog.objects, &catalog.references, &catalog.remap_rules)
    }

    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.nodes.contains(key)
    }

    /// All nodes in stable `(schema, name, type)` order
    pub fn nodes(&self) -> impl Iterator<Item = &ObjectKey> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.stats.edges
    }

    /// Objects `key` needs before it can be created
    pub fn dependencies_of(&self, key: &ObjectKey) -> impl Iterator<Item = &ObjectKey> {
        self.dependencies.get(key).into_iter().flatten()
    }

    /// Objects that need `key`
    pub fn dependents_of(&self, key: &ObjectKey) -> impl Iterator<Item = &ObjectKey> {
        self.dependents.get(key).into_iter().flatten()
    }

    /// Every `(dependent, dependency)` edge
    pub fn edges(&self) -> impl Iterator<Item = (&ObjectKey, &ObjectKey)> {
        self.dependencies
            .iter()
            .flat_map(|(dependent, deps)| deps.iter().map(move |dep| (dependent, dep)))
    }

    /// Target identity, or `None` for unknown or remap-conflicted objects
    pub fn target_of(&self, key: &ObjectKey) -> Option<&TargetIdentity> {
        self.targets.get(key)
    }

    pub fn is_conflicted(&self, key: &ObjectKey) -> bool {
        self.conflicts.contains_key(key)
    }

    pub fn conflicts(&self) -> impl Iterator<Item = &RemapConflict> {
        self.conflicts.values()
    }

    pub fn stats(&self) -> &GraphStats {
        &self.stats
    }
}

/// Object-level rules win over schema-level rules; disagreement at the
/// winning level is a conflict.
fn resolve_target(key: &ObjectKey, rules: &[RemapRule]) -> Result<TargetIdentity, RemapConflict> {
    let (object_level, schema_level): (Vec<&RemapRule>, Vec<&RemapRule>) = rules
        .iter()
        .filter(|rule| rule.matches(key))
        .partition(|rule| rule.is_object_level());

    let winning = if object_level.is_empty() {
        schema_level
    } else {
        object_level
    };

    let candidates: BTreeSet<TargetIdentity> = winning
        .iter()
        .map(|rule| {
            let (schema, name) = rule.apply(key);
            TargetIdentity { schema, name }
        })
        .collect();

    let mut candidates = candidates.into_iter();
    match (candidates.next(), candidates.next()) {
        (None, _) => Ok(TargetIdentity {
            schema: key.schema.clone(),
            name: key.name.clone(),
        }),
        (Some(only), None) => Ok(only),
        (Some(first), Some(second)) => Err(RemapConflict {
            object: key.clone(),
            candidates: [first, second].into_iter().chain(candidates).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str) -> ObjectKey {
        ObjectKey::new("APP", name, ObjectType::Table)
    }

    fn view(name: &str) -> ObjectKey {
        ObjectKey::new("APP", name, ObjectType::View)
    }

    #[test]
    fn test_build_deduplicates_edges_and_drops_self_references() {
        let objects = vec![table("T"), view("V")];
        let refs = vec![
            ObjectReference::new(view("V"), table("T")),
            ObjectReference::new(view("V"), table("T")),
            ObjectReference::new(view("V"), view("V")),
        ];
        let graph = DependencyGraph::build(&objects, &refs, &[]).unwrap();

        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.stats().duplicate_references, 1);
        assert_eq!(graph.stats().self_references, 1);
        assert_eq!(graph.dependencies_of(&view("V")).collect::<Vec<_>>(), vec![&table("T")]);
        assert_eq!(graph.dependents_of(&table("T")).collect::<Vec<_>>(), vec![&view("V")]);
    }

    #[test]
    fn test_dangling_references_are_counted_not_fatal() {
        let objects = vec![view("V")];
        let refs = vec![ObjectReference::new(view("V"), table("GONE"))];
        let graph = DependencyGraph::build(&objects, &refs, &[]).unwrap();
        assert_eq!(graph.edge_count(), 0);
        assert_eq!(graph.stats().dangling_references, 1);
    }

    #[test]
    fn test_conflicting_type_is_structural_error() {
        let objects = vec![table("X"), view("X")];
        let err = DependencyGraph::build(&objects, &[], &[]).unwrap_err();
        assert!(matches!(err, GraphError::ConflictingType { .. }));
    }

    #[test]
    fn test_spec_and_body_may_share_a_name() {
        let objects = vec![
            ObjectKey::new("APP", "PKG", ObjectType::Package),
            ObjectKey::new("APP", "PKG", ObjectType::PackageBody),
            table("T"),
            table("T"),
        ];
        let graph = DependencyGraph::build(&objects, &[], &[]).unwrap();
        assert_eq!(graph.node_count(), 3);
    }

    #[test]
    fn test_object_rule_overrides_schema_rule() {
        let objects = vec![table("T"), table("U")];
        let rules = vec![
            RemapRule::schema("APP", "NEW_APP"),
            RemapRule::object(&table("T"), "SPECIAL", None),
        ];
        let graph = DependencyGraph::build(&objects, &[], &rules).unwrap();
        assert_eq!(graph.target_of(&table("T")).unwrap().schema, "SPECIAL");
        assert_eq!(graph.target_of(&table("U")).unwrap().schema, "NEW_APP");
    }

    #[test]
    fn test_ambiguous_remap_is_reported_as_conflict() {
        let objects = vec![table("T"), table("U")];
        let rules = vec![RemapRule::schema("APP", "ONE"), RemapRule::schema("APP", "TWO")];
        let graph = DependencyGraph::build(&objects, &[], &rules).unwrap();

        assert!(graph.is_conflicted(&table("T")));
        assert!(graph.target_of(&table("T")).is_none());
        assert_eq!(graph.conflicts().count(), 2);
        assert_eq!(graph.conflicts().next().unwrap().candidates.len(), 2);
    }
}
