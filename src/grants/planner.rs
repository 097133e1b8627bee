//! # Grant Planner
//!
//! Derives the cross-schema privileges implied by the dependency graph and
//! tracks which of them have been applied during the run. The applied set is
//! write-once per grant: a grant is claimed before it is executed, so two
//! concurrent permission failures cannot both apply it.

use super::requirement::{GrantRequirement, Privilege};
use crate::dependency::DependencyGraph;
use crate::models::ObjectKey;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GrantStatus {
    InFlight,
    Applied,
}

#[derive(Debug, Default)]
pub struct GrantPlanner {
    requirements: BTreeSet<GrantRequirement>,
    /// Source-side dependent -> grants it needs
    by_dependent: BTreeMap<ObjectKey, BTreeSet<GrantRequirement>>,
    /// Grant -> graph node it is granted on
    sources: BTreeMap<GrantRequirement, ObjectKey>,
    /// Target-side `(schema, name)` -> object, for diagnostic lookups
    known_targets: BTreeMap<(String, String), ObjectKey>,
    applied: DashMap<GrantRequirement, GrantStatus>,
}

impl GrantPlanner {
    /// Plan every grant implied by edges whose endpoints land in different
    /// target schemas. Remap-conflicted objects contribute nothing. One
    /// privilege on one object is planned once per grantee; when any
    /// dependent needs the grant option, every dependent shares that grant.
    pub fn from_graph(graph: &DependencyGraph) -> Self {
        let mut planner = GrantPlanner::default();

        for key in graph.nodes() {
            if let Some(target) = graph.target_of(key) {
                planner.known_targets.insert(
                    (target.schema.clone(), target.name.clone()),
                    ObjectKey::new(target.schema.clone(), target.name.clone(), key.object_type),
                );
            }
        }

        for (dependent, dependency) in graph.edges() {
            let (Some(grantee), Some(owner)) = (graph.target_of(dependent), graph.target_of(dependency))
            else {
                continue;
            };
            if grantee.schema == owner.schema {
                continue;
            }
            let Some(privilege) = Privilege::required(dependent.object_type, dependency.object_type)
            else {
                continue;
            };

            let target = ObjectKey::new(owner.schema.clone(), owner.name.clone(), dependency.object_type);
            let mut requirement = GrantRequirement::new(grantee.schema.clone(), privilege, target);
            if dependent.object_type.is_view_family()
                && Self::is_exposed_across_schemas(graph, dependent, &grantee.schema)
            {
                requirement = requirement.with_grant_option();
            }

            planner
                .by_dependent
                .entry(dependent.clone())
                .or_default()
                .insert(requirement.clone());
            planner
                .sources
                .entry(requirement.clone())
                .or_insert_with(|| dependency.clone());
            planner.requirements.insert(requirement);
        }
        planner.merge_grant_options();

        info!(
            grants = planner.requirements.len(),
            dependents = planner.by_dependent.len(),
            "Grant plan derived from dependency graph"
        );
        planner
    }

    /// Fold each plain requirement into its grant-option twin, if planned
    fn merge_grant_options(&mut self) {
        let with_option: BTreeSet<GrantRequirement> = self
            .requirements
            .iter()
            .filter(|r| r.requires_grant_option)
            .cloned()
            .collect();
        let upgrade = |r: GrantRequirement| {
            let upgraded = r.clone().with_grant_option();
            if with_option.contains(&upgraded) {
                upgraded
            } else {
                r
            }
        };

        self.requirements = std::mem::take(&mut self.requirements)
            .into_iter()
            .map(upgrade)
            .collect();
        for needed in self.by_dependent.values_mut() {
            *needed = std::mem::take(needed).into_iter().map(upgrade).collect();
        }
        let mut sources = BTreeMap::new();
        for (requirement, source) in std::mem::take(&mut self.sources) {
            sources.entry(upgrade(requirement)).or_insert(source);
        }
        self.sources = sources;
    }

    /// A view re-exposing another schema's data to a third schema needs the
    /// underlying grant with grant option.
    fn is_exposed_across_schemas(graph: &DependencyGraph, view: &ObjectKey, view_schema: &str) -> bool {
        graph
            .dependents_of(view)
            .filter_map(|d| graph.target_of(d))
            .any(|t| t.schema != view_schema)
    }

    pub fn requirements(&self) -> impl Iterator<Item = &GrantRequirement> {
        self.requirements.iter()
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Grants needed by one source-side object
    pub fn requirements_for(&self, dependent: &ObjectKey) -> impl Iterator<Item = &GrantRequirement> {
        self.by_dependent.get(dependent).into_iter().flatten()
    }

    /// Source-side object a planned grant is on
    pub fn source_of(&self, requirement: &GrantRequirement) -> Option<&ObjectKey> {
        self.sources.get(requirement)
    }

    /// Planned grants not yet applied or in flight
    pub fn pending(&self) -> Vec<GrantRequirement> {
        self.requirements
            .iter()
            .filter(|r| !self.applied.contains_key(*r))
            .cloned()
            .collect()
    }

    /// Grants to try after a permission failure of `subject`: its planned,
    /// unapplied grants, or, when the plan has none, the objects named in the
    /// diagnostic that belong to another schema.
    pub fn on_demand(
        &self,
        subject: Option<&ObjectKey>,
        grantee_schema: &str,
        diagnostic: &str,
    ) -> Vec<GrantRequirement> {
        let planned: Vec<GrantRequirement> = subject
            .into_iter()
            .flat_map(|s| self.requirements_for(s))
            .filter(|r| !self.applied.contains_key(*r))
            .cloned()
            .collect();
        if !planned.is_empty() {
            return planned;
        }

        let subject_type = subject.map(|s| s.object_type);
        let mut found: BTreeSet<GrantRequirement> = BTreeSet::new();
        for (schema, name) in qualified_names(diagnostic) {
            if schema == grantee_schema {
                continue;
            }
            let Some(target) = self.known_targets.get(&(schema, name)) else {
                continue;
            };
            let privilege = subject_type
                .and_then(|t| Privilege::required(t, target.object_type))
                .or_else(|| Privilege::required(target.object_type, target.object_type));
            if let Some(privilege) = privilege {
                let requirement = GrantRequirement::new(grantee_schema, privilege, target.clone());
                if !self.applied.contains_key(&requirement) {
                    found.insert(requirement);
                }
            }
        }
        debug!(
            grantee = grantee_schema,
            found = found.len(),
            "Derived on-demand grants from diagnostic"
        );
        found.into_iter().collect()
    }

    /// Reserve a grant for execution. Returns `false` when it is already
    /// applied or another worker holds it.
    pub fn try_claim(&self, requirement: &GrantRequirement) -> bool {
        match self.applied.entry(requirement.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(GrantStatus::InFlight);
                true
            }
        }
    }

    pub fn mark_applied(&self, requirement: &GrantRequirement) {
        self.applied.insert(requirement.clone(), GrantStatus::Applied);
    }

    /// Give a claimed grant back after a failed execution
    pub fn release(&self, requirement: &GrantRequirement) {
        self.applied
            .remove_if(requirement, |_, status| *status == GrantStatus::InFlight);
    }

    pub fn is_applied(&self, requirement: &GrantRequirement) -> bool {
        self.applied
            .get(requirement)
            .is_some_and(|s| *s == GrantStatus::Applied)
    }

    pub fn applied_count(&self) -> usize {
        self.applied
            .iter()
            .filter(|e| *e.value() == GrantStatus::Applied)
            .count()
    }
}

/// `SCHEMA.NAME` pairs mentioned in a diagnostic, quotes stripped
fn qualified_names(diagnostic: &str) -> Vec<(String, String)> {
    diagnostic
        .split(|c: char| !(c.is_alphanumeric() || matches!(c, '.' | '_' | '$' | '#' | '"')))
        .map(|token| token.replace('"', ""))
        .filter_map(|token| {
            let token = token.trim_matches('.');
            let mut parts = token.split('.');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(schema), Some(name), None) if !schema.is_empty() && !name.is_empty() => {
                    Some((schema.to_string(), name.to_string()))
                }
                _ => None,
            }
        })
        .collect()
}
