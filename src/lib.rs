#![allow(clippy::doc_markdown)] // Allow technical terms like PL/SQL, ORA-00942 in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Schema Fixup
//!
//! Dependency-aware classification, ordering, and execution engine for
//! schema migrations between database products.
//!
//! ## Overview
//!
//! Given an inventory of source objects, the references between them, and
//! what already exists on the target, the engine decides which objects are
//! missing, which cannot be represented on the target, and which are merely
//! blocked by something that cannot. It then orders remediation tasks so
//! that prerequisites always run first and executes them through an
//! external SQL client with retry rounds and privilege repair.
//!
//! ## Module Organization
//!
//! - [`models`] - Object identities, catalog input, remediation tasks
//! - [`dependency`] - Dependency graph and support-state classifier
//! - [`sequencer`] - Kahn ordering, layered mode, chain mode
//! - [`grants`] - Cross-schema grant planning
//! - [`state_machine`] - Per-task execution state
//! - [`orchestration`] - Task discovery, execution, and run summary
//! - [`config`] - Layered run configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use schema_fixup::dependency::{Classifier, DependencyGraph, TargetSnapshot};
//! use schema_fixup::models::ObjectCatalog;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = ObjectCatalog::from_path(Path::new("catalog.json"))?;
//! let graph = DependencyGraph::from_catalog(&catalog)?;
//! let report = Classifier::default().classify(
//!     &graph,
//!     &catalog.blacklist,
//!     &TargetSnapshot::from_catalog(&catalog),
//! );
//! println!("{} objects classified", report.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod dependency;
pub mod error;
pub mod grants;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod sequencer;
pub mod state_machine;

pub use config::{ConfigManager, FixupConfig};
pub use dependency::{ClassificationReport, Classifier, DependencyGraph, SupportState};
pub use error::{FixupError, FixupResult};
pub use grants::{GrantPlanner, GrantRequirement, Privilege};
pub use models::{ObjectKey, ObjectType, RemediationTask};
pub use orchestration::{FixupOrchestrator, RunOptions, RunSummary};
pub use state_machine::{TaskEvent, TaskState};
