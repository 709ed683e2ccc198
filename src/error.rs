//! Error types for the mapper engine.
//!
//! `MapperError` is the crate-wide taxonomy. Step-level failures carry one of
//! these as their cause; configuration errors abort a run before any step
//! executes.

use crate::config::ConfigurationError;
use crate::external::ExternalCallError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MapperError {
    /// Unknown action tag, malformed params, or an invalid strategy definition
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// No conversion route between two identifier types
    #[error("No conversion path from '{source_type}' to '{target_type}'")]
    PathNotFound {
        source_type: String,
        target_type: String,
    },

    /// An external resolution call failed
    #[error("External call error: {0}")]
    ExternalCall(#[from] ExternalCallError),

    /// An action failed unexpectedly
    #[error("Step execution error in '{step_name}': {reason}")]
    StepExecution { step_name: String, reason: String },

    /// Checkpoint or cache backing store unavailable
    #[error("Cache storage error: {0}")]
    CacheStorage(String),

    /// The metadata provider could not supply a strategy or edges
    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Timeout error for operation {operation}: {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

impl MapperError {
    /// Shorthand for a step execution failure
    pub fn step(step_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StepExecution {
            step_name: step_name.into(),
            reason: reason.into(),
        }
    }

    /// Configuration errors abort the whole run
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::ConfigurationError(_))
    }
}

impl From<serde_json::Error> for MapperError {
    fn from(error: serde_json::Error) -> Self {
        MapperError::Serialization(format!("JSON serialization error: {error}"))
    }
}

impl From<ConfigurationError> for MapperError {
    fn from(error: ConfigurationError) -> Self {
        MapperError::ConfigurationError(error.to_string())
    }
}

pub type MapperResult<T> = std::result::Result<T, MapperError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_not_found_display() {
        let err = MapperError::PathNotFound {
            source_type: "gene_symbol".to_string(),
            target_type: "uniprot".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "No conversion path from 'gene_symbol' to 'uniprot'"
        );
    }

    #[test]
    fn test_external_call_conversion() {
        let err: MapperError = ExternalCallError::Timeout {
            resolver: "uniprot_history".to_string(),
        }
        .into();
        assert!(matches!(err, MapperError::ExternalCall(_)));
        assert!(!err.is_configuration());
    }
}
