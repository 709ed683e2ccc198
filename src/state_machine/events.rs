use serde::{Deserialize, Serialize};

/// Events that can trigger execution state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ExecutionEvent {
    /// Begin restoring from a checkpoint
    Resume,
    /// Enter the step loop
    Start,
    /// All steps processed
    Complete,
    /// A required step failed with the given error
    Fail(String),
    /// Cancellation observed between steps
    Cancel,
}

impl ExecutionEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Resume => "resume",
            Self::Start => "start",
            Self::Complete => "complete",
            Self::Fail(_) => "fail",
            Self::Cancel => "cancel",
        }
    }

    /// Extract error message if this is a failure event
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Fail(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self::Fail(error.into())
    }
}
