//! # Support-State Classifier
//!
//! Assigns every tracked object one of [`SupportState`] by seeding unsupported
//! roots from the blacklist and walking the reverse dependency graph
//! breadth-first. A multi-source BFS reaches each node first from its nearest
//! root, so the recorded root cause is always the closest unsupported ancestor.
//!
//! The classifier never mutates the graph; results live in a separate
//! [`ClassificationReport`].

use super::graph::{DependencyGraph, RemapConflict};
use crate::constants::reason_codes;
use crate::models::{BlacklistCategory, BlacklistEntry, ObjectCatalog, ObjectKey, ObjectType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupportState {
    /// Present on the target
    Supported,
    /// Absent from the target, can be created
    Missing,
    /// Independently diagnosed as impossible to represent on the target
    Unsupported,
    /// Otherwise fine, but depends on an unsupported object
    Blocked,
}

impl SupportState {
    /// Whether remediation may be attempted for an object in this state
    pub fn is_actionable(&self) -> bool {
        matches!(self, Self::Supported | Self::Missing)
    }
}

impl fmt::Display for SupportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Supported => write!(f, "SUPPORTED"),
            Self::Missing => write!(f, "MISSING"),
            Self::Unsupported => write!(f, "UNSUPPORTED"),
            Self::Blocked => write!(f, "BLOCKED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub state: SupportState,
    pub reason_code: String,
    /// Dependency through which the block arrived
    pub direct_dependency: Option<ObjectKey>,
    /// Nearest ancestor carrying the original unsupported diagnosis
    pub root_cause: Option<ObjectKey>,
    /// Edges between this object and its root cause
    pub distance: usize,
    /// Type-conversion root whose conversion is confirmed on the target
    pub propagation_suppressed: bool,
    /// Excluded from automated remediation (remap conflict)
    pub requires_manual_resolution: bool,
}

impl ClassificationResult {
    fn from_existence(present: bool) -> Self {
        let (state, reason) = if present {
            (SupportState::Supported, reason_codes::PRESENT_ON_TARGET)
        } else {
            (SupportState::Missing, reason_codes::MISSING_ON_TARGET)
        };
        Self {
            state,
            reason_code: reason.to_string(),
            direct_dependency: None,
            root_cause: None,
            distance: 0,
            propagation_suppressed: false,
            requires_manual_resolution: false,
        }
    }
}

/// Target-side facts the classifier consults
pub trait TargetStatus: Send + Sync {
    /// Plain existence check
    fn exists(&self, key: &ObjectKey) -> bool;

    /// Whether a type-conversion root has been converted on the target
    fn is_converted(&self, key: &ObjectKey) -> bool;
}

/// In-memory snapshot of target existence and conversion status
#[derive(Debug, Clone, Default)]
pub struct TargetSnapshot {
    present: HashSet<ObjectKey>,
    converted: HashSet<ObjectKey>,
}

impl TargetSnapshot {
    pub fn new(
        present: impl IntoIterator<Item = ObjectKey>,
        converted: impl IntoIterator<Item = ObjectKey>,
    ) -> Self {
        Self {
            present: present.into_iter().collect(),
            converted: converted.into_iter().collect(),
        }
    }

    pub fn from_catalog(catalog: &ObjectCatalog) -> Self {
        Self::new(
            catalog.target_objects.iter().cloned(),
            catalog.converted_objects.iter().cloned(),
        )
    }
}

impl TargetStatus for TargetSnapshot {
    fn exists(&self, key: &ObjectKey) -> bool {
        self.present.contains(key)
    }

    fn is_converted(&self, key: &ObjectKey) -> bool {
        self.converted.contains(key)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationReport {
    results: BTreeMap<ObjectKey, ClassificationResult>,
    conflicts: Vec<RemapConflict>,
}

impl ClassificationReport {
    pub fn get(&self, key: &ObjectKey) -> Option<&ClassificationResult> {
        self.results.get(key)
    }

    pub fn state_of(&self, key: &ObjectKey) -> Option<SupportState> {
        self.results.get(key).map(|r| r.state)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectKey, &ClassificationResult)> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn count(&self, state: SupportState) -> usize {
        self.results.values().filter(|r| r.state == state).count()
    }

    pub fn conflicts(&self) -> &[RemapConflict] {
        &self.conflicts
    }

    /// Objects whose root cause is `root`
    pub fn blocked_by<'a>(&'a self, root: &'a ObjectKey) -> impl Iterator<Item = &'a ObjectKey> {
        self.results
            .iter()
            .filter(move |(_, r)| r.root_cause.as_ref() == Some(root))
            .map(|(k, _)| k)
    }

    /// Blocking chain from `key` back to its root cause, `key` first
    pub fn chain_to_root(&self, key: &ObjectKey) -> Vec<ObjectKey> {
        let mut chain = vec![key.clone()];
        let mut current = key;
        while let Some(next) = self.results.get(current).and_then(|r| r.direct_dependency.as_ref()) {
            if chain.contains(next) {
                break;
            }
            chain.push(next.clone());
            current = next;
        }
        chain
    }

    /// Whether automated remediation may run for `key`. Objects outside the
    /// catalog are not restricted.
    pub fn is_dispatchable(&self, key: &ObjectKey) -> bool {
        self.results
            .get(key)
            .map_or(true, |r| r.state.is_actionable() && !r.requires_manual_resolution)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Classifier {
    excluded_types: HashSet<ObjectType>,
}

impl Classifier {
    pub fn new(excluded_types: impl IntoIterator<Item = ObjectType>) -> Self {
        Self {
            excluded_types: excluded_types.into_iter().collect(),
        }
    }

    fn is_tracked(&self, key: &ObjectKey) -> bool {
        !self.excluded_types.contains(&key.object_type)
    }

    /// Classify every tracked node. Pure: the same graph, blacklist, and
    /// target status always produce the same report.
    pub fn classify(
        &self,
        graph: &DependencyGraph,
        blacklist: &[BlacklistEntry],
        target: &dyn TargetStatus,
    ) -> ClassificationReport {
        let mut results: BTreeMap<ObjectKey, ClassificationResult> = graph
            .nodes()
            .filter(|key| self.is_tracked(key))
            .map(|key| (key.clone(), ClassificationResult::from_existence(target.exists(key))))
            .collect();

        // A strict diagnosis wins over a conditional one for the same object.
        let mut roots: BTreeMap<ObjectKey, BlacklistCategory> = BTreeMap::new();
        for entry in blacklist {
            if !results.contains_key(&entry.object) {
                debug!(object = %entry.object, "Ignoring blacklist entry for untracked object");
                continue;
            }
            roots
                .entry(entry.object.clone())
                .and_modify(|existing| {
                    if existing.is_type_conversion() {
                        *existing = entry.category;
                    }
                })
                .or_insert(entry.category);
        }

        let mut queue: VecDeque<(ObjectKey, ObjectKey, usize)> = VecDeque::new();
        let mut visited: HashSet<ObjectKey> = HashSet::new();

        for (key, category) in &roots {
            let suppressed = category.is_type_conversion() && target.is_converted(key);
            if let Some(result) = results.get_mut(key) {
                result.state = SupportState::Unsupported;
                result.reason_code = if suppressed {
                    reason_codes::TYPE_CONVERTED.to_string()
                } else {
                    category.reason_code().to_string()
                };
                result.root_cause = Some(key.clone());
                result.propagation_suppressed = suppressed;
            }
            if !suppressed {
                visited.insert(key.clone());
                queue.push_back((key.clone(), key.clone(), 0));
            }
        }

        while let Some((current, root, distance)) = queue.pop_front() {
            for dependent in graph.dependents_of(&current) {
                if !self.is_tracked(dependent) || !visited.insert(dependent.clone()) {
                    continue;
                }
                if let Some(result) = results.get_mut(dependent) {
                    if result.state != SupportState::Unsupported {
                        result.state = SupportState::Blocked;
                        result.reason_code = reason_codes::DEPENDS_ON_UNSUPPORTED.to_string();
                        result.direct_dependency = Some(current.clone());
                        result.root_cause = Some(root.clone());
                        result.distance = distance + 1;
                    }
                }
                queue.push_back((dependent.clone(), root.clone(), distance + 1));
            }
        }

        let conflicts: Vec<RemapConflict> = graph
            .conflicts()
            .filter(|c| self.is_tracked(&c.object))
            .cloned()
            .collect();
        for conflict in &conflicts {
            if let Some(result) = results.get_mut(&conflict.object) {
                result.requires_manual_resolution = true;
                if result.state.is_actionable() {
                    result.reason_code = reason_codes::REMAP_CONFLICT.to_string();
                }
            }
        }

        let report = ClassificationReport { results, conflicts };
        info!(
            total = report.len(),
            supported = report.count(SupportState::Supported),
            missing = report.count(SupportState::Missing),
            unsupported = report.count(SupportState::Unsupported),
            blocked = report.count(SupportState::Blocked),
            conflicts = report.conflicts.len(),
            "Classification complete"
        );
        report
    }
}
