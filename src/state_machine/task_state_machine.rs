use super::{
    errors::{StateMachineError, StateMachineResult},
    events::TaskEvent,
    states::TaskState,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One recorded transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: TaskState,
    pub to: TaskState,
    pub event: String,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

/// In-memory state machine for one remediation task. Owned by the
/// orchestrator; nothing else transitions tasks.
#[derive(Debug, Clone)]
pub struct TaskStateMachine {
    task_id: String,
    state: TaskState,
    attempts: u32,
    history: Vec<TransitionRecord>,
}

impl TaskStateMachine {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            state: TaskState::default(),
            attempts: 0,
            history: Vec::new(),
        }
    }

    pub fn current_state(&self) -> TaskState {
        self.state
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Number of times the task was started
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    /// Attempt to transition the task state
    pub fn transition(&mut self, event: TaskEvent) -> StateMachineResult<TaskState> {
        let current_state = self.state;
        let target_state = self.determine_target_state(current_state, &event)?;

        if matches!(event, TaskEvent::Start) {
            self.attempts += 1;
        }

        tracing::debug!(
            task_id = %self.task_id,
            from = %current_state,
            to = %target_state,
            event = event.event_type(),
            "Task transition"
        );

        self.history.push(TransitionRecord {
            from: current_state,
            to: target_state,
            event: event.event_type().to_string(),
            detail: match &event {
                TaskEvent::Fail(msg) | TaskEvent::Error(msg) | TaskEvent::Skip(msg) => {
                    Some(msg.clone())
                }
                _ => None,
            },
            at: Utc::now(),
        });
        self.state = target_state;
        Ok(target_state)
    }

    /// Determine the target state based on current state and event
    pub fn determine_target_state(
        &self,
        current_state: TaskState,
        event: &TaskEvent,
    ) -> StateMachineResult<TaskState> {
        let target = match (current_state, event) {
            (TaskState::Pending, TaskEvent::Start) => TaskState::Running,

            (TaskState::Running, TaskEvent::Succeed) => TaskState::Success,

            (TaskState::Running, TaskEvent::Fail(_)) => TaskState::Failed,

            // Errors may surface before the client is invoked
            (TaskState::Pending | TaskState::Running, TaskEvent::Error(_)) => TaskState::Error,

            // Existence check before dispatch, or duplicate-object soft success
            (TaskState::Pending | TaskState::Running, TaskEvent::Skip(_)) => TaskState::Skipped,

            (TaskState::Failed, TaskEvent::Retry) => TaskState::Pending,

            (from_state, _) => {
                return Err(StateMachineError::InvalidTransition {
                    task_id: self.task_id.clone(),
                    from: from_state.to_string(),
                    event: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
