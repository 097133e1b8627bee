//! # Dependency Analysis
//!
//! Graph construction over the object catalog and support-state
//! classification with transitive blocking.

pub mod classifier;
pub mod graph;

pub use classifier::{
    ClassificationReport, ClassificationResult, Classifier, SupportState, TargetSnapshot,
    TargetStatus,
};
pub use graph::{DependencyGraph, GraphError, GraphStats, RemapConflict, TargetIdentity};
