use crate::context::ExecutionContext;
use crate::models::{ProvenanceRecord, StepOutcomeKind};
use crate::state_machine::ExecutionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

/// Everything needed to start or resume one strategy execution
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub strategy_name: String,
    pub identifiers: Vec<String>,
    pub source_type: String,
    /// Execution id to resume; also used as the id of a fresh run when no checkpoint exists
    pub resume_id: Option<String>,
    pub cancel: Option<CancellationToken>,
}

impl ExecutionRequest {
    pub fn new(
        strategy_name: impl Into<String>,
        identifiers: Vec<String>,
        source_type: impl Into<String>,
    ) -> Self {
        Self {
            strategy_name: strategy_name.into(),
            identifiers,
            source_type: source_type.into(),
            resume_id: None,
            cancel: None,
        }
    }

    pub fn with_resume_id(mut self, resume_id: impl Into<String>) -> Self {
        self.resume_id = Some(resume_id.into());
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }
}

/// Terminal status of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    /// `step_index`/`step_name` are absent when the run failed outside a step
    Failed {
        step_index: Option<usize>,
        step_name: Option<String>,
        error: String,
    },
    Cancelled {
        checkpoint_id: String,
        next_step_index: usize,
    },
}

impl ExecutionStatus {
    pub fn state(&self) -> ExecutionState {
        match self {
            Self::Completed => ExecutionState::Completed,
            Self::Failed { .. } => ExecutionState::Failed,
            Self::Cancelled { .. } => ExecutionState::Cancelled,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: String,
    pub strategy_name: String,
    pub status: ExecutionStatus,
    pub final_context: ExecutionContext,
    /// Full trail, including steps restored from a checkpoint
    pub provenance: Vec<ProvenanceRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    /// Completed, but at least one optional step failed along the way
    pub fn is_degraded(&self) -> bool {
        self.status.is_completed()
            && self
                .provenance
                .iter()
                .any(|record| record.outcome == StepOutcomeKind::SkippedOptional)
    }

    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
