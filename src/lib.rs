#![allow(clippy::doc_markdown)] // Allow technical terms like UniProt, HGNC in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Mapper Core
//!
//! Strategy execution engine for resolving and harmonizing identifiers across
//! heterogeneous datasets.
//!
//! ## Overview
//!
//! A **strategy** is a named, ordered list of steps. Each step names an action
//! tag and a parameter bag. The orchestrator resolves every tag through the
//! [`registry`], then runs the steps in order against one shared
//! [`context::ExecutionContext`], recording a provenance record per step and
//! checkpointing progress so interrupted runs can resume.
//!
//! Actions reach the outside world only through [`actions::ActionServices`]:
//! the [`path_finder`] for conversion routes between identifier types, the
//! [`cache`] for single-flight external resolutions, and a client factory for
//! resolvers and result sinks.
//!
//! ## Module Organization
//!
//! - [`orchestration`] - Strategy orchestrator, checkpoint writes, retry backoff
//! - [`actions`] - Built-in action kinds and the action contract
//! - [`registry`] - Tag to action factory registry
//! - [`cache`] - Resolution cache with TTL and per-key single flight
//! - [`path_finder`] - Best conversion path between identifier types
//! - [`checkpoint`] - Memory and file checkpoint stores
//! - [`state_machine`] - Execution lifecycle states and transitions
//! - [`trace`] - Execution trace events and metrics
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mapper_core::external::StaticClientFactory;
//! use mapper_core::metadata::InMemoryMetadataProvider;
//! use mapper_core::orchestration::{ExecutionRequest, StrategyOrchestrator};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let metadata = InMemoryMetadataProvider::from_json_file("metadata.json").await?;
//! let orchestrator =
//!     StrategyOrchestrator::builder(Arc::new(metadata), Arc::new(StaticClientFactory::new()))
//!         .build()?;
//!
//! let request = ExecutionRequest::new("protein_harmonization", vec!["P12345".into()], "uniprot");
//! let result = orchestrator.run(request).await?;
//! println!("{:?} -> {:?}", result.status, result.final_context.current_identifiers());
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod cache;
pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod external;
pub mod logging;
pub mod metadata;
pub mod models;
pub mod orchestration;
pub mod path_finder;
pub mod registry;
pub mod state_machine;
pub mod trace;

pub use actions::{Action, ActionFactory, ActionServices, StepOutcome};
pub use cache::{CacheEntry, Fingerprint, ResolutionCache};
pub use checkpoint::{Checkpoint, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
pub use config::{ConfigManager, MapperConfig};
pub use context::{ContextDelta, ContextValue, ExecutionContext, LookupTable};
pub use error::{MapperError, MapperResult};
pub use external::{ClientFactory, ExternalCallError, ExternalResolver, ResultSink};
pub use metadata::{InMemoryMetadataProvider, MetadataProvider};
pub use models::{
    ConversionEdge, MappingPath, ProvenanceRecord, StepDefinition, StepOutcomeKind, Strategy,
};
pub use orchestration::{
    ExecutionRequest, ExecutionResult, ExecutionStatus, StrategyOrchestrator,
};
pub use path_finder::{PathFinder, PathFinderConfig};
pub use registry::ActionRegistry;
pub use state_machine::{ExecutionEvent, ExecutionState};
pub use trace::{InMemoryTraceRecorder, TraceEvent, TraceRecorder};
