//! # Strategy Orchestrator
//!
//! Runs one strategy end to end: loads it from the metadata provider, builds
//! every step's action up front, then walks the steps strictly in order,
//! threading a single [`ExecutionContext`] through them.
//!
//! ## Failure policy
//!
//! - A failing required step stops the run with `Failed`. Context and
//!   provenance up to and including that step are returned.
//! - A failing optional step is recorded and its deltas are discarded; the
//!   next step sees the context from before the failed one.
//! - Configuration problems (unknown strategy or tag, malformed params) are
//!   returned as `Err` before any step runs.
//!
//! ## Checkpoints and cancellation
//!
//! A checkpoint is written after every `checkpoint_stride`-th completed step.
//! Cancellation is observed between steps only; a fresh checkpoint is then
//! written so the run can resume at the first unexecuted step. The checkpoint
//! is cleared once the run completes.

use super::checkpoint_writer::CheckpointWriter;
use super::types::{ExecutionRequest, ExecutionResult, ExecutionStatus};
use crate::actions::{Action, ActionServices, StepOutcome};
use crate::cache::ResolutionCache;
use crate::checkpoint::{build_checkpoint_store, Checkpoint, CheckpointStore};
use crate::config::MapperConfig;
use crate::context::ExecutionContext;
use crate::error::{MapperError, MapperResult};
use crate::external::ClientFactory;
use crate::logging::log_checkpoint_operation;
use crate::metadata::MetadataProvider;
use crate::models::{ProvenanceRecord, StepDefinition, StepOutcomeKind, Strategy};
use crate::orchestration::backoff_calculator::BackoffCalculator;
use crate::path_finder::PathFinder;
use crate::registry::ActionRegistry;
use crate::state_machine::{ExecutionEvent, ExecutionState, ExecutionStateMachine};
use crate::trace::{TraceEvent, TraceRecorder, TracingTraceRecorder};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Executes strategies against shared caches and collaborators
pub struct StrategyOrchestrator {
    metadata: Arc<dyn MetadataProvider>,
    registry: Arc<ActionRegistry>,
    checkpoints: Arc<dyn CheckpointStore>,
    services: ActionServices,
    trace: Arc<dyn TraceRecorder>,
    config: MapperConfig,
}

/// Builder for [`StrategyOrchestrator`]; unset parts are derived from the config
pub struct StrategyOrchestratorBuilder {
    metadata: Arc<dyn MetadataProvider>,
    clients: Arc<dyn ClientFactory>,
    config: MapperConfig,
    registry: Option<Arc<ActionRegistry>>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    trace: Option<Arc<dyn TraceRecorder>>,
    resolution_cache: Option<Arc<ResolutionCache>>,
    path_finder: Option<Arc<PathFinder>>,
}

impl StrategyOrchestratorBuilder {
    pub fn with_config(mut self, config: MapperConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_registry(mut self, registry: Arc<ActionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn with_trace_recorder(mut self, trace: Arc<dyn TraceRecorder>) -> Self {
        self.trace = Some(trace);
        self
    }

    /// Share a cache across orchestrators
    pub fn with_resolution_cache(mut self, cache: Arc<ResolutionCache>) -> Self {
        self.resolution_cache = Some(cache);
        self
    }

    pub fn with_path_finder(mut self, path_finder: Arc<PathFinder>) -> Self {
        self.path_finder = Some(path_finder);
        self
    }

    pub fn build(self) -> MapperResult<StrategyOrchestrator> {
        self.config.validate()?;

        let resolution_cache = self
            .resolution_cache
            .unwrap_or_else(|| Arc::new(ResolutionCache::from_config(&self.config.cache)));
        let path_finder = self.path_finder.unwrap_or_else(|| {
            Arc::new(PathFinder::new(
                self.metadata.clone(),
                self.config.path_finder.clone(),
            ))
        });
        let services = ActionServices::new(
            path_finder,
            resolution_cache,
            self.clients,
            self.metadata.clone(),
            BackoffCalculator::new(self.config.backoff.clone()),
        );

        Ok(StrategyOrchestrator {
            metadata: self.metadata,
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(ActionRegistry::with_builtin_actions())),
            checkpoints: self
                .checkpoints
                .unwrap_or_else(|| build_checkpoint_store(&self.config.checkpoint)),
            services,
            trace: self
                .trace
                .unwrap_or_else(|| Arc::new(TracingTraceRecorder)),
            config: self.config,
        })
    }
}

/// Where a run begins: fresh, or restored from a checkpoint
struct StartPoint {
    context: ExecutionContext,
    provenance: Vec<ProvenanceRecord>,
    next_index: usize,
    restored: bool,
}

/// Mutable state of one run, owned by the step loop
struct RunState {
    execution_id: String,
    strategy: Arc<Strategy>,
    state_machine: ExecutionStateMachine,
    context: ExecutionContext,
    provenance: Vec<ProvenanceRecord>,
    steps_executed: usize,
    started_at: DateTime<Utc>,
}

impl StrategyOrchestrator {
    pub fn builder(
        metadata: Arc<dyn MetadataProvider>,
        clients: Arc<dyn ClientFactory>,
    ) -> StrategyOrchestratorBuilder {
        StrategyOrchestratorBuilder {
            metadata,
            clients,
            config: MapperConfig::default(),
            registry: None,
            checkpoints: None,
            trace: None,
            resolution_cache: None,
            path_finder: None,
        }
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ActionRegistry> {
        &self.registry
    }

    pub fn services(&self) -> &ActionServices {
        &self.services
    }

    pub fn path_finder(&self) -> &Arc<PathFinder> {
        &self.services.path_finder
    }

    pub fn resolution_cache(&self) -> &Arc<ResolutionCache> {
        &self.services.resolution_cache
    }

    pub fn checkpoint_store(&self) -> &Arc<dyn CheckpointStore> {
        &self.checkpoints
    }

    /// Drop cached conversion paths and resolutions
    pub fn clear_caches(&self) {
        self.services.path_finder.clear();
        self.services.resolution_cache.clear();
    }

    /// Run (or resume) a strategy to a terminal status
    ///
    /// `Err` is returned only for problems detected before the first step:
    /// unknown strategy, unknown action tag, malformed params, or an
    /// unusable checkpoint. Everything after that is reported through
    /// [`ExecutionResult::status`].
    #[instrument(skip(self, request), fields(strategy = %request.strategy_name))]
    pub async fn run(&self, request: ExecutionRequest) -> MapperResult<ExecutionResult> {
        let started_at = Utc::now();
        let execution_id = request
            .resume_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut state_machine = ExecutionStateMachine::new(execution_id.clone());

        let strategy = self.metadata.get_strategy(&request.strategy_name).await?;
        strategy.validate()?;
        let steps: Vec<StepDefinition> = strategy.ordered_steps().into_iter().cloned().collect();
        let actions = steps
            .iter()
            .map(|step| self.registry.build(step, &self.config))
            .collect::<MapperResult<Vec<Box<dyn Action>>>>()?;

        let start = if request.resume_id.is_some() {
            state_machine.transition(ExecutionEvent::Resume)?;
            self.restore(&execution_id, &strategy, steps.len(), &request)
                .await?
        } else {
            StartPoint {
                context: ExecutionContext::new(
                    request.identifiers.clone(),
                    request.source_type.clone(),
                ),
                provenance: Vec::new(),
                next_index: 0,
                restored: false,
            }
        };

        state_machine.transition(ExecutionEvent::Start)?;
        self.trace.record(TraceEvent::ExecutionStarted {
            execution_id: execution_id.clone(),
            strategy_name: strategy.name.clone(),
            resumed_at_step: start.restored.then_some(start.next_index),
            at: started_at,
        });
        info!(
            execution_id = %execution_id,
            steps = steps.len(),
            next_step = start.next_index,
            "Strategy execution started"
        );

        let services = self.services.for_execution(&execution_id, &strategy.name);
        let mut writer = CheckpointWriter::new(
            &execution_id,
            self.checkpoints.clone(),
            self.config.engine.checkpoint_mode,
            self.trace.clone(),
            start.restored.then_some(start.next_index),
        );
        let mut run = RunState {
            execution_id,
            strategy,
            state_machine,
            context: start.context,
            provenance: start.provenance,
            steps_executed: 0,
            started_at,
        };

        for index in start.next_index..steps.len() {
            let step = &steps[index];

            if request.is_cancelled() {
                return self.cancel(run, &mut writer, index).await;
            }

            let record = self
                .run_step(&mut run, index, step, actions[index].as_ref(), &services)
                .await;
            let failed_required = record.outcome == StepOutcomeKind::Failed;
            let error = record.error.clone();
            run.provenance.push(record.clone());
            run.steps_executed += 1;
            self.trace.record(TraceEvent::StepFinished {
                execution_id: run.execution_id.clone(),
                record,
            });

            if failed_required {
                writer.flush().await;
                let status = ExecutionStatus::Failed {
                    step_index: Some(index),
                    step_name: Some(step.name.clone()),
                    error: error.unwrap_or_default(),
                };
                return self.finish(run, status);
            }

            let stride = self.config.engine.checkpoint_stride as usize;
            if stride > 0 && (index + 1) % stride == 0 {
                writer
                    .write(Checkpoint::new(
                        run.execution_id.clone(),
                        run.strategy.name.clone(),
                        index + 1,
                        &run.context,
                        &run.provenance,
                    ))
                    .await;
            }
        }

        writer.flush().await;
        if let Err(error) = self.checkpoints.clear(&run.execution_id).await {
            let status = ExecutionStatus::Failed {
                step_index: None,
                step_name: None,
                error: error.to_string(),
            };
            return self.finish(run, status);
        }
        log_checkpoint_operation("clear", &run.execution_id, None, "cleared", None);

        if run.context.current_identifier_type() != run.strategy.target_type {
            warn!(
                execution_id = %run.execution_id,
                identifier_type = run.context.current_identifier_type(),
                target_type = %run.strategy.target_type,
                "Strategy completed without reaching its target identifier type"
            );
        }
        self.finish(run, ExecutionStatus::Completed)
    }

    async fn restore(
        &self,
        execution_id: &str,
        strategy: &Strategy,
        step_count: usize,
        request: &ExecutionRequest,
    ) -> MapperResult<StartPoint> {
        let Some(checkpoint) = self.checkpoints.load(execution_id).await? else {
            info!(
                execution_id,
                "No checkpoint found, starting from the first step"
            );
            return Ok(StartPoint {
                context: ExecutionContext::new(
                    request.identifiers.clone(),
                    request.source_type.clone(),
                ),
                provenance: Vec::new(),
                next_index: 0,
                restored: false,
            });
        };

        if checkpoint.strategy_name != strategy.name {
            return Err(MapperError::ConfigurationError(format!(
                "checkpoint {execution_id} belongs to strategy '{}', not '{}'",
                checkpoint.strategy_name, strategy.name
            )));
        }
        if checkpoint.step_index > step_count {
            return Err(MapperError::ConfigurationError(format!(
                "checkpoint {execution_id} resumes at step {} but strategy '{}' has {step_count} steps",
                checkpoint.step_index, strategy.name
            )));
        }

        log_checkpoint_operation(
            "load",
            execution_id,
            Some(checkpoint.step_index),
            "restored",
            None,
        );
        Ok(StartPoint {
            context: checkpoint.context_snapshot,
            provenance: checkpoint.provenance,
            next_index: checkpoint.step_index,
            restored: true,
        })
    }

    async fn run_step(
        &self,
        run: &mut RunState,
        index: usize,
        step: &StepDefinition,
        action: &dyn Action,
        services: &ActionServices,
    ) -> ProvenanceRecord {
        let identifiers_in = run.context.current_identifiers().len();
        self.trace.record(TraceEvent::StepStarted {
            execution_id: run.execution_id.clone(),
            step_index: index,
            step_name: step.name.clone(),
            action: step.action.clone(),
            identifiers_in,
        });

        let started_at = Utc::now();
        let outcome = self.execute_action(step, action, &run.context, services).await;

        let (error, details) = match outcome {
            StepOutcome::Success { delta, details } => match run.context.apply(delta) {
                Ok(()) => (None, details),
                Err(error) => (Some(error), details),
            },
            StepOutcome::Failure { error } => (Some(error), Default::default()),
        };

        let outcome = match (&error, step.is_required) {
            (None, _) => StepOutcomeKind::Success,
            (Some(_), true) => StepOutcomeKind::Failed,
            (Some(_), false) => StepOutcomeKind::SkippedOptional,
        };
        if let Some(error) = &error {
            if step.is_required {
                warn!(execution_id = %run.execution_id, step = %step.name, error = %error, "Required step failed");
            } else {
                warn!(execution_id = %run.execution_id, step = %step.name, error = %error, "Optional step failed, continuing");
            }
        }

        ProvenanceRecord {
            step_index: index,
            step_name: step.name.clone(),
            action: step.action.clone(),
            started_at,
            finished_at: Utc::now(),
            outcome,
            identifiers_in,
            identifiers_out: run.context.current_identifiers().len(),
            error: error.map(|e| e.to_string()),
            details,
        }
    }

    /// Run one action with the configured timeout, containing panics
    async fn execute_action(
        &self,
        step: &StepDefinition,
        action: &dyn Action,
        context: &ExecutionContext,
        services: &ActionServices,
    ) -> StepOutcome {
        let guarded = AssertUnwindSafe(action.execute(context, services)).catch_unwind();

        let result = match self.config.engine.step_timeout() {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(result) => result,
                Err(_) => {
                    return StepOutcome::failure(MapperError::Timeout {
                        operation: format!("step '{}'", step.name),
                        timeout_ms: limit.as_millis() as u64,
                    })
                }
            },
            None => guarded.await,
        };

        result.unwrap_or_else(|panic| {
            StepOutcome::failure(MapperError::step(
                &step.name,
                format!("action panicked: {}", panic_message(panic.as_ref())),
            ))
        })
    }

    async fn cancel(
        &self,
        run: RunState,
        writer: &mut CheckpointWriter,
        next_index: usize,
    ) -> MapperResult<ExecutionResult> {
        writer.flush().await;
        if !writer.is_fresh(next_index) {
            let checkpoint = Checkpoint::new(
                run.execution_id.clone(),
                run.strategy.name.clone(),
                next_index,
                &run.context,
                &run.provenance,
            );
            if let Err(error) = writer.write_now(checkpoint).await {
                let status = ExecutionStatus::Failed {
                    step_index: None,
                    step_name: None,
                    error: format!("cancellation checkpoint not written: {error}"),
                };
                return self.finish(run, status);
            }
        }

        info!(
            execution_id = %run.execution_id,
            next_step = next_index,
            "Strategy execution cancelled"
        );
        let status = ExecutionStatus::Cancelled {
            checkpoint_id: run.execution_id.clone(),
            next_step_index: next_index,
        };
        self.finish(run, status)
    }

    fn finish(&self, mut run: RunState, status: ExecutionStatus) -> MapperResult<ExecutionResult> {
        let event = match &status {
            ExecutionStatus::Completed => ExecutionEvent::Complete,
            ExecutionStatus::Failed { error, .. } => ExecutionEvent::fail(error.clone()),
            ExecutionStatus::Cancelled { .. } => ExecutionEvent::Cancel,
        };
        let state = run.state_machine.transition(event)?;
        debug_assert_eq!(state, status.state());

        let finished_at = Utc::now();
        let duration_ms = (finished_at - run.started_at).num_milliseconds();
        self.trace.record(TraceEvent::ExecutionFinished {
            execution_id: run.execution_id.clone(),
            strategy_name: run.strategy.name.clone(),
            state,
            steps_executed: run.steps_executed,
            duration_ms,
        });

        // The trace recorder owns the STRATEGY_OPERATION line for this event
        if state == ExecutionState::Failed {
            debug!(execution_id = %run.execution_id, status = ?status, "Strategy execution failed");
        }

        Ok(ExecutionResult {
            execution_id: run.execution_id,
            strategy_name: run.strategy.name.clone(),
            status,
            final_context: run.context,
            provenance: run.provenance,
            started_at: run.started_at,
            finished_at,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
