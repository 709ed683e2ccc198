//! # Orchestration Engine
//!
//! Drives strategy executions step by step.
//!
//! ## Core Components
//!
//! - **StrategyOrchestrator**: runs or resumes a strategy and reports a terminal status
//! - **CheckpointWriter**: sync or background checkpoint writes issued from the step loop
//! - **BackoffCalculator**: exponential retry delays for transient external failures
//!
//! The orchestrator owns the execution context for the lifetime of a run;
//! actions only ever see it by shared reference.

pub mod backoff_calculator;
mod checkpoint_writer;
pub mod strategy_orchestrator;
pub mod types;

pub use backoff_calculator::{retry_with_backoff, BackoffCalculator, BackoffDecision, BackoffType};
pub use strategy_orchestrator::{StrategyOrchestrator, StrategyOrchestratorBuilder};
pub use types::{ExecutionRequest, ExecutionResult, ExecutionStatus};
