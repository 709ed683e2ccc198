//! # Execution Trace
//!
//! Structured audit records of strategy runs: lifecycle events, per-step
//! outcomes with timings and counts, and checkpoint writes. The orchestrator
//! emits [`TraceEvent`]s to a [`TraceRecorder`]; the recorder decides where
//! they go.

pub mod recorder;

pub use recorder::{ExecutionMetrics, InMemoryTraceRecorder, TracingTraceRecorder};

use crate::models::ProvenanceRecord;
use crate::state_machine::ExecutionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TraceEvent {
    ExecutionStarted {
        execution_id: String,
        strategy_name: String,
        /// Step index restored from a checkpoint
        resumed_at_step: Option<usize>,
        at: DateTime<Utc>,
    },
    StepStarted {
        execution_id: String,
        step_index: usize,
        step_name: String,
        action: String,
        identifiers_in: usize,
    },
    StepFinished {
        execution_id: String,
        record: ProvenanceRecord,
    },
    CheckpointSaved {
        execution_id: String,
        /// Next step to run on resume
        step_index: usize,
    },
    ExecutionFinished {
        execution_id: String,
        strategy_name: String,
        state: ExecutionState,
        steps_executed: usize,
        duration_ms: i64,
    },
}

impl TraceEvent {
    pub fn execution_id(&self) -> &str {
        match self {
            Self::ExecutionStarted { execution_id, .. }
            | Self::StepStarted { execution_id, .. }
            | Self::StepFinished { execution_id, .. }
            | Self::CheckpointSaved { execution_id, .. }
            | Self::ExecutionFinished { execution_id, .. } => execution_id,
        }
    }
}

/// Sink for trace events; must not block the step loop
pub trait TraceRecorder: Send + Sync {
    fn record(&self, event: TraceEvent);
}
