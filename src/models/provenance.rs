use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How a single step execution ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcomeKind {
    Success,
    /// A required step failed; the run stopped here
    Failed,
    /// An optional step failed; its changes were discarded and the run continued
    SkippedOptional,
}

impl fmt::Display for StepOutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::SkippedOptional => write!(f, "skipped_optional"),
        }
    }
}

/// ProvenanceRecord is the immutable audit entry for one step execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub step_index: usize,
    pub step_name: String,
    pub action: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: StepOutcomeKind,
    pub identifiers_in: usize,
    pub identifiers_out: usize,
    pub error: Option<String>,
    /// Action-reported counters (resolved, failed, lineage entries, ...)
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
}

impl ProvenanceRecord {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    pub fn is_success(&self) -> bool {
        self.outcome == StepOutcomeKind::Success
    }
}
