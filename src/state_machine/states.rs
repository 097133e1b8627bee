use serde::{Deserialize, Serialize};
use std::fmt;

/// Remediation task lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Waiting for dispatch
    #[default]
    Pending,
    /// Handed to the SQL client
    Running,
    /// Statement executed cleanly
    Success,
    /// Statement executed and the target rejected it
    Failed,
    /// The task could not be executed at all (unreadable script, client missing)
    Error,
    /// Object already present; nothing to do
    Skipped,
}

impl TaskState {
    /// Check if the task has reached an outcome for the current round
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Success | Self::Failed | Self::Error | Self::Skipped
        )
    }

    /// Outcomes that count toward a clean run
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Success | Self::Skipped)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
            Self::Error => write!(f, "ERROR"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(Self::Pending),
            "RUNNING" => Ok(Self::Running),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            "ERROR" => Ok(Self::Error),
            "SKIPPED" => Ok(Self::Skipped),
            _ => Err(format!("Invalid task state: {s}")),
        }
    }
}
