use serde::{Deserialize, Serialize};

/// Events that can trigger remediation task state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum TaskEvent {
    /// Dispatch the task to the SQL client
    Start,
    /// Statement executed cleanly
    Succeed,
    /// Target rejected the statement, with the diagnostic text
    Fail(String),
    /// Task could not be executed
    Error(String),
    /// Object already present, with the reason
    Skip(String),
    /// Put a failed task back in the queue for another attempt
    Retry,
}

impl TaskEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Succeed => "succeed",
            Self::Fail(_) => "fail",
            Self::Error(_) => "error",
            Self::Skip(_) => "skip",
            Self::Retry => "retry",
        }
    }

    pub fn fail_with_error(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
