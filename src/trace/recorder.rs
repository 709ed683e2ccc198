use super::{TraceEvent, TraceRecorder};
use crate::logging::{log_checkpoint_operation, log_step_operation, log_strategy_operation};
use crate::models::StepOutcomeKind;
use crate::state_machine::ExecutionState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aggregate counters over recorded events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub executions_started: u64,
    pub executions_resumed: u64,
    pub executions_completed: u64,
    pub executions_failed: u64,
    pub executions_cancelled: u64,
    pub steps_succeeded: u64,
    pub steps_failed: u64,
    pub steps_skipped_optional: u64,
    pub checkpoints_saved: u64,
    pub identifiers_in: u64,
    pub identifiers_out: u64,
    /// Total step time by action tag
    pub action_duration_ms: BTreeMap<String, i64>,
}

impl ExecutionMetrics {
    pub fn steps_executed(&self) -> u64 {
        self.steps_succeeded + self.steps_failed + self.steps_skipped_optional
    }

    fn apply(&mut self, event: &TraceEvent) {
        match event {
            TraceEvent::ExecutionStarted {
                resumed_at_step, ..
            } => {
                self.executions_started += 1;
                if resumed_at_step.is_some() {
                    self.executions_resumed += 1;
                }
            }
            TraceEvent::StepStarted { .. } => {}
            TraceEvent::StepFinished { record, .. } => {
                match record.outcome {
                    StepOutcomeKind::Success => self.steps_succeeded += 1,
                    StepOutcomeKind::Failed => self.steps_failed += 1,
                    StepOutcomeKind::SkippedOptional => self.steps_skipped_optional += 1,
                }
                self.identifiers_in += record.identifiers_in as u64;
                self.identifiers_out += record.identifiers_out as u64;
                *self
                    .action_duration_ms
                    .entry(record.action.clone())
                    .or_default() += record.duration_ms();
            }
            TraceEvent::CheckpointSaved { .. } => self.checkpoints_saved += 1,
            TraceEvent::ExecutionFinished { state, .. } => match state {
                ExecutionState::Completed => self.executions_completed += 1,
                ExecutionState::Failed => self.executions_failed += 1,
                ExecutionState::Cancelled => self.executions_cancelled += 1,
                _ => {}
            },
        }
    }
}

/// Keeps every event in memory, in arrival order
#[derive(Debug, Default)]
pub struct InMemoryTraceRecorder {
    events: Mutex<Vec<TraceEvent>>,
}

impl InMemoryTraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().clone()
    }

    pub fn events_for(&self, execution_id: &str) -> Vec<TraceEvent> {
        self.events
            .lock()
            .iter()
            .filter(|event| event.execution_id() == execution_id)
            .cloned()
            .collect()
    }

    pub fn summary(&self) -> ExecutionMetrics {
        let mut metrics = ExecutionMetrics::default();
        for event in self.events.lock().iter() {
            metrics.apply(event);
        }
        metrics
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl TraceRecorder for InMemoryTraceRecorder {
    fn record(&self, event: TraceEvent) {
        self.events.lock().push(event);
    }
}

/// Forwards events to `tracing` as structured log lines
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTraceRecorder;

impl TraceRecorder for TracingTraceRecorder {
    fn record(&self, event: TraceEvent) {
        match event {
            TraceEvent::ExecutionStarted {
                execution_id,
                strategy_name,
                resumed_at_step,
                ..
            } => {
                let details = resumed_at_step.map(|index| format!("resumed_at_step={index}"));
                log_strategy_operation(
                    "execution_started",
                    &execution_id,
                    &strategy_name,
                    "running",
                    details.as_deref(),
                );
            }
            TraceEvent::StepStarted {
                execution_id,
                step_index,
                step_name,
                action,
                identifiers_in,
            } => {
                let details = format!("action={action} identifiers_in={identifiers_in}");
                log_step_operation(
                    "step_started",
                    &execution_id,
                    step_index,
                    &step_name,
                    "running",
                    Some(&details),
                );
            }
            TraceEvent::StepFinished {
                execution_id,
                record,
            } => {
                let mut details = format!(
                    "action={} identifiers_in={} identifiers_out={} duration_ms={}",
                    record.action,
                    record.identifiers_in,
                    record.identifiers_out,
                    record.duration_ms()
                );
                if let Some(error) = &record.error {
                    details.push_str(&format!(" error={error}"));
                }
                log_step_operation(
                    "step_finished",
                    &execution_id,
                    record.step_index,
                    &record.step_name,
                    &record.outcome.to_string(),
                    Some(&details),
                );
            }
            TraceEvent::CheckpointSaved {
                execution_id,
                step_index,
            } => {
                log_checkpoint_operation("checkpoint_saved", &execution_id, Some(step_index), "saved", None);
            }
            TraceEvent::ExecutionFinished {
                execution_id,
                strategy_name,
                state,
                steps_executed,
                duration_ms,
            } => {
                let details = format!("steps_executed={steps_executed} duration_ms={duration_ms}");
                log_strategy_operation(
                    "execution_finished",
                    &execution_id,
                    &strategy_name,
                    &state.to_string(),
                    Some(&details),
                );
            }
        }
    }
}
