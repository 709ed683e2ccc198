//! Checkpoint writes issued from the step loop.
//!
//! In `sync` mode a write completes before the next step starts. In
//! `background` mode the write is spawned and at most one is in flight: the
//! previous write is awaited before the next is spawned, so checkpoints land in
//! step order. [`CheckpointWriter::flush`] must run before any terminal state
//! is reported.
//!
//! Intermediate write failures are logged and tolerated; the run continues
//! with the last checkpoint that did land.

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::CheckpointMode;
use crate::error::MapperResult;
use crate::trace::{TraceEvent, TraceRecorder};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub(crate) struct CheckpointWriter {
    execution_id: String,
    store: Arc<dyn CheckpointStore>,
    mode: CheckpointMode,
    trace: Arc<dyn TraceRecorder>,
    pending: Option<JoinHandle<MapperResult<usize>>>,
    latest_saved: Option<usize>,
}

impl CheckpointWriter {
    pub(crate) fn new(
        execution_id: &str,
        store: Arc<dyn CheckpointStore>,
        mode: CheckpointMode,
        trace: Arc<dyn TraceRecorder>,
        latest_saved: Option<usize>,
    ) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            store,
            mode,
            trace,
            pending: None,
            latest_saved,
        }
    }

    /// Write according to the configured mode
    pub(crate) async fn write(&mut self, checkpoint: Checkpoint) {
        match self.mode {
            CheckpointMode::Sync => {
                let result = self.save_now(checkpoint).await;
                self.on_result(result);
            }
            CheckpointMode::Background => {
                self.flush().await;
                let store = self.store.clone();
                self.pending = Some(tokio::spawn(async move {
                    let step_index = checkpoint.step_index;
                    store.save(&checkpoint).await.map(|()| step_index)
                }));
            }
        }
    }

    /// Write and wait regardless of mode; the caller decides how to treat failure
    pub(crate) async fn write_now(&mut self, checkpoint: Checkpoint) -> MapperResult<()> {
        self.flush().await;
        let result = self.save_now(checkpoint).await;
        let outcome = result.as_ref().map(|_| ()).map_err(Clone::clone);
        self.on_result(result);
        outcome
    }

    /// Wait for the in-flight background write, if any
    pub(crate) async fn flush(&mut self) {
        if let Some(handle) = self.pending.take() {
            match handle.await {
                Ok(result) => self.on_result(result),
                Err(join_error) => warn!(
                    execution_id = %self.execution_id,
                    error = %join_error,
                    "Background checkpoint task did not finish"
                ),
            }
        }
    }

    /// True when the store already holds a checkpoint resuming at `step_index`
    pub(crate) fn is_fresh(&self, step_index: usize) -> bool {
        self.latest_saved == Some(step_index)
    }

    async fn save_now(&self, checkpoint: Checkpoint) -> MapperResult<usize> {
        self.store
            .save(&checkpoint)
            .await
            .map(|()| checkpoint.step_index)
    }

    fn on_result(&mut self, result: MapperResult<usize>) {
        match result {
            Ok(step_index) => {
                self.latest_saved = Some(step_index);
                debug!(execution_id = %self.execution_id, step_index, "Checkpoint saved");
                self.trace.record(TraceEvent::CheckpointSaved {
                    execution_id: self.execution_id.clone(),
                    step_index,
                });
            }
            Err(error) => {
                warn!(
                    execution_id = %self.execution_id,
                    error = %error,
                    "Checkpoint write failed, continuing without it"
                );
            }
        }
    }
}
