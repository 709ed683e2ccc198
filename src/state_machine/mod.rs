// Execution lifecycle state machine
//
// A strategy run moves Loaded -> (Resuming ->) Running -> {Completed, Failed, Cancelled}.
// Every transition is validated and recorded with its triggering event.

pub mod events;
pub mod execution_state_machine;
pub mod states;

pub use events::ExecutionEvent;
pub use execution_state_machine::{ExecutionStateMachine, StateTransition};
pub use states::ExecutionState;
