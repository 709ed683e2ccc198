use super::{events::ExecutionEvent, states::ExecutionState};
use crate::error::{MapperError, MapperResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One applied transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from_state: ExecutionState,
    pub to_state: ExecutionState,
    pub event: String,
    pub at: DateTime<Utc>,
}

/// In-memory state machine for a single execution
#[derive(Debug, Clone)]
pub struct ExecutionStateMachine {
    execution_id: String,
    state: ExecutionState,
    transitions: Vec<StateTransition>,
}

impl ExecutionStateMachine {
    pub fn new(execution_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            state: ExecutionState::Loaded,
            transitions: Vec::new(),
        }
    }

    pub fn current_state(&self) -> ExecutionState {
        self.state
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    /// Attempt to transition the execution state
    pub fn transition(&mut self, event: ExecutionEvent) -> MapperResult<ExecutionState> {
        let target = Self::determine_target_state(self.state, &event)?;

        debug!(
            execution_id = %self.execution_id,
            from_state = %self.state,
            to_state = %target,
            event = event.event_type(),
            "Execution state transition"
        );

        self.transitions.push(StateTransition {
            from_state: self.state,
            to_state: target,
            event: event.event_type().to_string(),
            at: Utc::now(),
        });
        self.state = target;
        Ok(target)
    }

    fn determine_target_state(
        current_state: ExecutionState,
        event: &ExecutionEvent,
    ) -> MapperResult<ExecutionState> {
        let target = match (current_state, event) {
            (ExecutionState::Loaded, ExecutionEvent::Resume) => ExecutionState::Resuming,
            (ExecutionState::Loaded, ExecutionEvent::Start) => ExecutionState::Running,
            (ExecutionState::Resuming, ExecutionEvent::Start) => ExecutionState::Running,

            (ExecutionState::Running, ExecutionEvent::Complete) => ExecutionState::Completed,
            (ExecutionState::Running, ExecutionEvent::Fail(_)) => ExecutionState::Failed,
            (ExecutionState::Running, ExecutionEvent::Cancel) => ExecutionState::Cancelled,

            (from_state, _) => {
                return Err(MapperError::InvalidStateTransition {
                    from: from_state.to_string(),
                    to: event.event_type().to_string(),
                })
            }
        };

        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_run_lifecycle() {
        let mut sm = ExecutionStateMachine::new("exec-1");
        assert_eq!(sm.transition(ExecutionEvent::Start).unwrap(), ExecutionState::Running);
        assert_eq!(
            sm.transition(ExecutionEvent::Complete).unwrap(),
            ExecutionState::Completed
        );
        assert_eq!(sm.transitions().len(), 2);
    }

    #[test]
    fn test_resume_passes_through_resuming() {
        let mut sm = ExecutionStateMachine::new("exec-1");
        sm.transition(ExecutionEvent::Resume).unwrap();
        assert_eq!(sm.current_state(), ExecutionState::Resuming);
        sm.transition(ExecutionEvent::Start).unwrap();
        sm.transition(ExecutionEvent::Cancel).unwrap();
        assert_eq!(sm.current_state(), ExecutionState::Cancelled);
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut sm = ExecutionStateMachine::new("exec-1");
        sm.transition(ExecutionEvent::Start).unwrap();
        sm.transition(ExecutionEvent::fail("boom")).unwrap();

        let err = sm.transition(ExecutionEvent::Start).unwrap_err();
        assert!(matches!(err, MapperError::InvalidStateTransition { .. }));
        assert_eq!(sm.current_state(), ExecutionState::Failed);
    }

    #[test]
    fn test_cannot_complete_before_running() {
        let mut sm = ExecutionStateMachine::new("exec-1");
        assert!(sm.transition(ExecutionEvent::Complete).is_err());
        assert!(sm.transitions().is_empty());
    }
}
