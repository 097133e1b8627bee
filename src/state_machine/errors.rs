use thiserror::Error;

/// Errors raised by task state transitions
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateMachineError {
    #[error("Invalid state transition for {task_id} from {from} on {event}")]
    InvalidTransition {
        task_id: String,
        from: String,
        event: String,
    },
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
