use super::{Checkpoint, CheckpointStore};
use crate::error::MapperResult;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Process-local checkpoint store
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    checkpoints: RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.read().is_empty()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> MapperResult<()> {
        self.checkpoints
            .write()
            .insert(checkpoint.execution_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, execution_id: &str) -> MapperResult<Option<Checkpoint>> {
        Ok(self.checkpoints.read().get(execution_id).cloned())
    }

    async fn clear(&self, execution_id: &str) -> MapperResult<()> {
        self.checkpoints.write().remove(execution_id);
        Ok(())
    }
}
