//! # Data Model
//!
//! Object identities, the materialized catalog, and remediation tasks.

pub mod catalog;
pub mod object;
pub mod remediation_task;

pub use catalog::{BlacklistCategory, BlacklistEntry, ObjectCatalog, ObjectReference, RemapRule};
pub use object::{NamespaceClass, ObjectKey, ObjectType};
pub use remediation_task::{RemediationTask, TaskKind, TaskScript};
