// State machine module for remediation task execution
//
// Each task moves PENDING -> RUNNING -> {SUCCESS | FAILED | ERROR | SKIPPED};
// a FAILED task may be put back to PENDING for a later round.

pub mod errors;
pub mod events;
pub mod states;
pub mod task_state_machine;

pub use errors::{StateMachineError, StateMachineResult};
pub use events::TaskEvent;
pub use states::TaskState;
pub use task_state_machine::{TaskStateMachine, TransitionRecord};
