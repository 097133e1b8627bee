//! Object identity shared by every component.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of tracked object types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    Table,
    View,
    #[serde(alias = "MATERIALIZED VIEW")]
    MaterializedView,
    Index,
    Constraint,
    Trigger,
    Sequence,
    Synonym,
    Procedure,
    Function,
    Package,
    #[serde(alias = "PACKAGE BODY")]
    PackageBody,
    Type,
    #[serde(alias = "TYPE BODY")]
    TypeBody,
    Job,
}

/// Name-resolution class; two objects of different types may not share a
/// name inside the same class and schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceClass {
    Shared,
    MaterializedView,
    Body,
    Index,
    Constraint,
    Trigger,
    Job,
}

impl ObjectType {
    pub const ALL: [ObjectType; 15] = [
        Self::Table,
        Self::View,
        Self::MaterializedView,
        Self::Index,
        Self::Constraint,
        Self::Trigger,
        Self::Sequence,
        Self::Synonym,
        Self::Procedure,
        Self::Function,
        Self::Package,
        Self::PackageBody,
        Self::Type,
        Self::TypeBody,
        Self::Job,
    ];

    /// Subdirectory name used in the remediation task tree
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
            Self::MaterializedView => "materialized_view",
            Self::Index => "index",
            Self::Constraint => "constraint",
            Self::Trigger => "trigger",
            Self::Sequence => "sequence",
            Self::Synonym => "synonym",
            Self::Procedure => "procedure",
            Self::Function => "function",
            Self::Package => "package",
            Self::PackageBody => "package_body",
            Self::Type => "type",
            Self::TypeBody => "type_body",
            Self::Job => "job",
        }
    }

    pub fn from_dir_name(dir: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.dir_name().eq_ignore_ascii_case(dir))
    }

    pub fn namespace(&self) -> NamespaceClass {
        match self {
            Self::MaterializedView => NamespaceClass::MaterializedView,
            Self::PackageBody | Self::TypeBody => NamespaceClass::Body,
            Self::Index => NamespaceClass::Index,
            Self::Constraint => NamespaceClass::Constraint,
            Self::Trigger => NamespaceClass::Trigger,
            Self::Job => NamespaceClass::Job,
            _ => NamespaceClass::Shared,
        }
    }

    /// Views and materialized views form unbounded-depth reference chains
    pub fn is_view_family(&self) -> bool {
        matches!(self, Self::View | Self::MaterializedView)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::MaterializedView => "MATERIALIZED VIEW",
            Self::PackageBody => "PACKAGE BODY",
            Self::TypeBody => "TYPE BODY",
            other => return write!(f, "{}", other.dir_name().to_ascii_uppercase()),
        };
        write!(f, "{label}")
    }
}

impl std::str::FromStr for ObjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace([' ', '-'], "_");
        Self::from_dir_name(&normalized).ok_or_else(|| format!("Invalid object type: {s}"))
    }
}

/// Identity of one tracked object: `(schema, name, type)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub schema: String,
    pub name: String,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
}

impl ObjectKey {
    pub fn new(schema: impl Into<String>, name: impl Into<String>, object_type: ObjectType) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            object_type,
        }
    }

    /// `SCHEMA.NAME`
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} ({})", self.schema, self.name, self.object_type)
    }
}
