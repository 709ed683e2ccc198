//! # Checkpoint Store
//!
//! Persists the progress of an in-flight execution so it can be resumed. A
//! checkpoint holds the index of the next step to run, an owned snapshot of the
//! execution context and the provenance trail so far.
//!
//! The store is agnostic to its medium behind [`CheckpointStore`]. Failures
//! surface as [`MapperError::CacheStorage`](crate::error::MapperError::CacheStorage).

pub mod file;
pub mod memory;

pub use file::FileCheckpointStore;
pub use memory::MemoryCheckpointStore;

use crate::config::{CheckpointBackend, CheckpointConfig};
use crate::context::ExecutionContext;
use crate::error::MapperResult;
use crate::models::ProvenanceRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub execution_id: String,
    pub strategy_name: String,
    /// Index of the next step to run
    pub step_index: usize,
    pub context_snapshot: ExecutionContext,
    #[serde(default)]
    pub provenance: Vec<ProvenanceRecord>,
    pub saved_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        execution_id: impl Into<String>,
        strategy_name: impl Into<String>,
        step_index: usize,
        context: &ExecutionContext,
        provenance: &[ProvenanceRecord],
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            strategy_name: strategy_name.into(),
            step_index,
            context_snapshot: context.snapshot(),
            provenance: provenance.to_vec(),
            saved_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Create or overwrite the checkpoint for `checkpoint.execution_id`
    async fn save(&self, checkpoint: &Checkpoint) -> MapperResult<()>;

    async fn load(&self, execution_id: &str) -> MapperResult<Option<Checkpoint>>;

    /// Removing a missing checkpoint is not an error
    async fn clear(&self, execution_id: &str) -> MapperResult<()>;
}

/// Build the store selected by configuration
pub fn build_checkpoint_store(config: &CheckpointConfig) -> Arc<dyn CheckpointStore> {
    match config.backend {
        CheckpointBackend::Memory => Arc::new(MemoryCheckpointStore::new()),
        CheckpointBackend::File => Arc::new(FileCheckpointStore::new(config.directory.clone())),
    }
}
