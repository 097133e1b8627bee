//! Materialized metadata inventory consumed by the graph builder and classifier.

use super::object::{ObjectKey, ObjectType};
use crate::error::{FixupError, FixupResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// "dependent references referenced"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectReference {
    pub dependent: ObjectKey,
    pub referenced: ObjectKey,
}

impl ObjectReference {
    pub fn new(dependent: ObjectKey, referenced: ObjectKey) -> Self {
        Self {
            dependent,
            referenced,
        }
    }
}

/// Schema or object level mapping from a source identity to a target identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapRule {
    pub source_schema: String,
    /// Restricts the rule to one object; schema-wide when absent
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub object_type: Option<ObjectType>,
    pub target_schema: String,
    /// Renames the object; keeps the source name when absent
    #[serde(default)]
    pub target_name: Option<String>,
}

impl RemapRule {
    pub fn schema(source_schema: impl Into<String>, target_schema: impl Into<String>) -> Self {
        Self {
            source_schema: source_schema.into(),
            source_name: None,
            object_type: None,
            target_schema: target_schema.into(),
            target_name: None,
        }
    }

    pub fn object(
        source: &ObjectKey,
        target_schema: impl Into<String>,
        target_name: Option<String>,
    ) -> Self {
        Self {
            source_schema: source.schema.clone(),
            source_name: Some(source.name.clone()),
            object_type: Some(source.object_type),
            target_schema: target_schema.into(),
            target_name,
        }
    }

    pub fn is_object_level(&self) -> bool {
        self.source_name.is_some()
    }

    pub fn matches(&self, key: &ObjectKey) -> bool {
        self.source_schema == key.schema
            && self.source_name.as_ref().map_or(true, |n| *n == key.name)
            && self.object_type.map_or(true, |t| t == key.object_type)
    }

    /// Target `(schema, name)` for a matching key
    pub fn apply(&self, key: &ObjectKey) -> (String, String) {
        (
            self.target_schema.clone(),
            self.target_name.clone().unwrap_or_else(|| key.name.clone()),
        )
    }
}

/// Why an object was independently diagnosed as unsupported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlacklistCategory {
    /// Uses a column type the target cannot represent
    UnsupportedDataType,
    /// Uses a DDL feature the target lacks
    UnsupportedFeature,
    /// Belongs to a category never portable to the target
    NeverPortable,
    /// Unsupported in its current form; dependents are unblocked once the
    /// target-side conversion has happened
    TypeConversionPending,
}

impl BlacklistCategory {
    pub fn is_type_conversion(&self) -> bool {
        matches!(self, Self::TypeConversionPending)
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::UnsupportedDataType => "UNSUPPORTED_DATA_TYPE",
            Self::UnsupportedFeature => "UNSUPPORTED_FEATURE",
            Self::NeverPortable => "NEVER_PORTABLE",
            Self::TypeConversionPending => crate::constants::reason_codes::TYPE_CONVERSION_PENDING,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub object: ObjectKey,
    pub category: BlacklistCategory,
    #[serde(default)]
    pub detail: Option<String>,
}

impl BlacklistEntry {
    pub fn new(object: ObjectKey, category: BlacklistCategory) -> Self {
        Self {
            object,
            category,
            detail: None,
        }
    }
}

/// Per-run catalog snapshot of both sides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectCatalog {
    #[serde(default)]
    pub objects: Vec<ObjectKey>,
    #[serde(default)]
    pub references: Vec<ObjectReference>,
    #[serde(default)]
    pub remap_rules: Vec<RemapRule>,
    #[serde(default)]
    pub blacklist: Vec<BlacklistEntry>,
    /// Source objects already present on the target
    #[serde(default)]
    pub target_objects: Vec<ObjectKey>,
    /// Type-conversion roots whose conversion is confirmed on the target
    #[serde(default)]
    pub converted_objects: Vec<ObjectKey>,
}

impl ObjectCatalog {
    pub fn from_path(path: &Path) -> FixupResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FixupError::Catalog(format!("Failed to read catalog '{}': {e}", path.display()))
        })?;
        let catalog: ObjectCatalog = serde_json::from_str(&content)?;
        tracing::debug!(
            path = %path.display(),
            objects = catalog.objects.len(),
            references = catalog.references.len(),
            blacklist = catalog.blacklist.len(),
            "Loaded object catalog"
        );
        Ok(catalog)
    }
}
