//! Remediation units consumed by the fixup orchestrator.

use super::object::{ObjectKey, ObjectType};
use crate::constants::task_dirs;
use crate::sequencer::Layer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// What a task creates or repairs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TaskKind {
    Object(ObjectType),
    /// Post-creation alteration of an existing table
    TableAlter,
    Grant,
    /// Subdirectory the discovery walk did not recognize
    Unrecognized(String),
}

impl TaskKind {
    pub fn dir_name(&self) -> &str {
        match self {
            Self::Object(t) => t.dir_name(),
            Self::TableAlter => task_dirs::TABLE_ALTER,
            Self::Grant => task_dirs::GRANTS,
            Self::Unrecognized(dir) => dir,
        }
    }

    pub fn object_type(&self) -> Option<ObjectType> {
        match self {
            Self::Object(t) => Some(*t),
            _ => None,
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.dir_name())
    }
}

/// Where the statement text lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum TaskScript {
    File(PathBuf),
    Inline(String),
}

/// One unit of work: creates or repairs a single target-side object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationTask {
    /// Stable identifier, `<dir>/<file stem>`
    pub id: String,
    pub schema: String,
    pub name: String,
    /// Third name part for compiled/body objects (e.g. `BODY`)
    pub qualifier: Option<String>,
    pub kind: TaskKind,
    pub layer: Layer,
    pub script: TaskScript,
    pub dependencies: Vec<ObjectKey>,
}

impl RemediationTask {
    pub fn from_file(
        kind: TaskKind,
        schema: impl Into<String>,
        name: impl Into<String>,
        qualifier: Option<String>,
        path: PathBuf,
    ) -> Self {
        let schema = schema.into();
        let name = name.into();
        let stem = match (&qualifier, schema.is_empty()) {
            (Some(q), _) => format!("{schema}.{name}.{q}"),
            (None, true) => name.clone(),
            (None, false) => format!("{schema}.{name}"),
        };
        Self {
            id: format!("{}/{stem}", kind.dir_name()),
            layer: Layer::for_kind(&kind),
            schema,
            name,
            qualifier,
            kind,
            script: TaskScript::File(path),
            dependencies: Vec::new(),
        }
    }

    pub fn inline_grant(label: impl Into<String>, schema: impl Into<String>, sql: String) -> Self {
        let label = label.into();
        Self {
            id: format!("{}/{label}", task_dirs::GRANTS),
            schema: schema.into(),
            name: label,
            qualifier: None,
            kind: TaskKind::Grant,
            layer: Layer::Grants,
            script: TaskScript::Inline(sql),
            dependencies: Vec::new(),
        }
    }

    /// Identity of the object this task creates
    pub fn object_key(&self) -> Option<ObjectKey> {
        self.kind
            .object_type()
            .map(|t| ObjectKey::new(self.schema.clone(), self.name.clone(), t))
    }

    /// Catalog object the task acts on; alterations act on their table
    pub fn subject_key(&self) -> Option<ObjectKey> {
        match self.kind {
            TaskKind::TableAlter => Some(ObjectKey::new(
                self.schema.clone(),
                self.name.clone(),
                ObjectType::Table,
            )),
            _ => self.object_key(),
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<ObjectKey>) -> Self {
        self.dependencies = dependencies;
        self
    }
}
