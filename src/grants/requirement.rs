use crate::models::{ObjectKey, ObjectType};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Privilege {
    Select,
    References,
    Execute,
}

impl Privilege {
    /// Privilege a `dependent` needs on a `dependency` of the given type, if
    /// one can be granted at all
    pub fn required(dependent: ObjectType, dependency: ObjectType) -> Option<Self> {
        match dependency {
            ObjectType::Table
            | ObjectType::View
            | ObjectType::MaterializedView
            | ObjectType::Sequence
            | ObjectType::Synonym => {
                if dependent == ObjectType::Constraint {
                    Some(Self::References)
                } else {
                    Some(Self::Select)
                }
            }
            ObjectType::Procedure
            | ObjectType::Function
            | ObjectType::Package
            | ObjectType::PackageBody
            | ObjectType::Type
            | ObjectType::TypeBody => Some(Self::Execute),
            ObjectType::Index | ObjectType::Constraint | ObjectType::Trigger | ObjectType::Job => None,
        }
    }
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select => write!(f, "SELECT"),
            Self::References => write!(f, "REFERENCES"),
            Self::Execute => write!(f, "EXECUTE"),
        }
    }
}

/// One cross-schema privilege, expressed in target-side names
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GrantRequirement {
    pub grantee: String,
    pub privilege: Privilege,
    pub target: ObjectKey,
    pub requires_grant_option: bool,
}

impl GrantRequirement {
    pub fn new(grantee: impl Into<String>, privilege: Privilege, target: ObjectKey) -> Self {
        Self {
            grantee: grantee.into(),
            privilege,
            target: grantable_target(target),
            requires_grant_option: false,
        }
    }

    pub fn with_grant_option(mut self) -> Self {
        self.requires_grant_option = true;
        self
    }

    pub fn to_sql(&self) -> String {
        let option = if self.requires_grant_option {
            " WITH GRANT OPTION"
        } else {
            ""
        };
        format!(
            "GRANT {} ON {} TO {}{option};",
            self.privilege,
            self.target.qualified_name(),
            self.grantee
        )
    }

    /// Stable task label, `SCHEMA.NAME.PRIVILEGE.GRANTEE`
    pub fn label(&self) -> String {
        format!(
            "{}.{}.{}",
            self.target.qualified_name(),
            self.privilege,
            self.grantee
        )
    }
}

/// Privileges on bodies are granted on their specification
fn grantable_target(target: ObjectKey) -> ObjectKey {
    let object_type = match target.object_type {
        ObjectType::PackageBody => ObjectType::Package,
        ObjectType::TypeBody => ObjectType::Type,
        other => other,
    };
    ObjectKey { object_type, ..target }
}
