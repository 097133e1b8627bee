//! # Fixup Orchestration
//!
//! Execution side of the engine: discovers remediation tasks on disk,
//! orders them into layers and batches, runs them through an external SQL
//! client on a bounded worker pool, classifies failures, and reports a
//! final outcome per task.
//!
//! ## Core Components
//!
//! - **FixupOrchestrator**: rounds, layers, batches, retry and grant repair
//! - **FailureClassifier**: diagnostic text to failure category
//! - **SqlClient**: seam to the external client program
//! - **ExistenceCache**: idempotent-mode existence checks
//! - **RunSummary**: final per-task outcomes and the `--report` document

pub mod error_classifier;
pub mod existence_cache;
pub mod fixup_orchestrator;
pub mod sql_client;
pub mod summary;
pub mod task_discovery;

pub use error_classifier::{FailureCategory, FailureClassifier, StandardFailureClassifier};
pub use existence_cache::ExistenceCache;
pub use fixup_orchestrator::{CatalogContext, FixupOrchestrator, RunOptions};
pub use sql_client::{ExecutionOutcome, ProcessSqlClient, SqlClient, SqlClientError};
pub use summary::{NotAttempted, NotAttemptedReason, PlannedBatch, RunSummary, TaskOutcome};
pub use task_discovery::{discover_tasks, DiscoveredTasks};
