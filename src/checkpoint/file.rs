use super::{Checkpoint, CheckpointStore};
use crate::error::{MapperError, MapperResult};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// One JSON document per execution id under a directory
///
/// Writes go to a temporary sibling file first and are renamed into place, so
/// a crash mid-write never leaves a truncated checkpoint behind.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    directory: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, execution_id: &str) -> MapperResult<PathBuf> {
        if !is_safe_file_component(execution_id) {
            return Err(MapperError::CacheStorage(format!(
                "execution id '{execution_id}' is not usable as a checkpoint file name"
            )));
        }
        Ok(self.directory.join(format!("{execution_id}.json")))
    }
}

/// Non-empty, no leading dot, only `[A-Za-z0-9._-]`, so it cannot leave its directory
pub(crate) fn is_safe_file_component(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with('.')
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn storage_error(action: &str, path: &Path, error: impl std::fmt::Display) -> MapperError {
    MapperError::CacheStorage(format!("failed to {action} {}: {error}", path.display()))
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> MapperResult<()> {
        let path = self.path_for(&checkpoint.execution_id)?;
        let body = serde_json::to_vec_pretty(checkpoint)?;

        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| storage_error("create", &self.directory, e))?;

        let temp = path.with_extension("json.tmp");
        tokio::fs::write(&temp, body)
            .await
            .map_err(|e| storage_error("write", &temp, e))?;
        tokio::fs::rename(&temp, &path)
            .await
            .map_err(|e| storage_error("rename", &path, e))?;

        debug!(path = %path.display(), step_index = checkpoint.step_index, "Checkpoint written");
        Ok(())
    }

    async fn load(&self, execution_id: &str) -> MapperResult<Option<Checkpoint>> {
        let path = self.path_for(execution_id)?;
        match tokio::fs::read(&path).await {
            Ok(body) => Ok(Some(serde_json::from_slice(&body)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(storage_error("read", &path, e)),
        }
    }

    async fn clear(&self, execution_id: &str) -> MapperResult<()> {
        let path = self.path_for(execution_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(storage_error("remove", &path, e)),
        }
    }
}
