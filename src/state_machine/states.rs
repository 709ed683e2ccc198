use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one strategy execution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Strategy fetched and validated, nothing executed yet
    #[default]
    Loaded,
    /// Restoring context and step index from a checkpoint
    Resuming,
    /// Step loop in progress
    Running,
    /// Every step processed
    Completed,
    /// A required step failed
    Failed,
    /// Stopped between steps on request; resumable from the checkpoint
    Cancelled,
}

impl ExecutionState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if this is an active state (steps may be executing)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Terminal states a caller can pick up again with the same execution id
    pub fn is_resumable(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded => write!(f, "loaded"),
            Self::Resuming => write!(f, "resuming"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ExecutionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loaded" => Ok(Self::Loaded),
            "resuming" => Ok(Self::Resuming),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid execution state: {s}")),
        }
    }
}
