//! Result sinks used by the persistence action.

use crate::checkpoint::file::is_safe_file_component;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// One persisted execution output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub execution_id: String,
    pub strategy_name: String,
    pub step_name: String,
    pub identifier_type: String,
    pub payload: serde_json::Value,
    pub written_at: chrono::DateTime<chrono::Utc>,
}

/// Destination for step results outside the execution context
#[async_trait]
pub trait ResultSink: Send + Sync {
    fn name(&self) -> &str;

    async fn write(&self, record: &ResultRecord) -> anyhow::Result<()>;
}

/// Keeps written records in memory
#[derive(Debug, Default)]
pub struct InMemorySink {
    name: String,
    records: Mutex<Vec<ResultRecord>>,
}

impl InMemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: Mutex::new(Vec::new()),
        }
    }

    pub fn records(&self) -> Vec<ResultRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl ResultSink for InMemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, record: &ResultRecord) -> anyhow::Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}

/// Writes each record as `<directory>/<execution_id>.<step_name>.json`
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    name: String,
    directory: PathBuf,
}

impl JsonFileSink {
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
        }
    }

    /// Rejects execution ids and step names that are not plain file name parts
    pub fn path_for(&self, record: &ResultRecord) -> anyhow::Result<PathBuf> {
        for (field, value) in [
            ("execution id", &record.execution_id),
            ("step name", &record.step_name),
        ] {
            if !is_safe_file_component(value) {
                anyhow::bail!("{field} '{value}' is not usable in a result file name");
            }
        }
        Ok(self
            .directory
            .join(format!("{}.{}.json", record.execution_id, record.step_name)))
    }
}

#[async_trait]
impl ResultSink for JsonFileSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, record: &ResultRecord) -> anyhow::Result<()> {
        use anyhow::Context;

        let path = self.path_for(record)?;
        tokio::fs::create_dir_all(&self.directory)
            .await
            .with_context(|| format!("creating sink directory {}", self.directory.display()))?;

        let body = serde_json::to_vec_pretty(record).context("serializing result record")?;
        tokio::fs::write(&path, body)
            .await
            .with_context(|| format!("writing result record {}", path.display()))?;

        debug!(sink = %self.name, path = %path.display(), "Result record written");
        Ok(())
    }
}
