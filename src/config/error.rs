//! Configuration Error Types
//!
//! Errors raised while loading and validating engine configuration.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    /// Failed to read or parse a configuration source
    #[error("Failed to load configuration from {source_name}: {error}")]
    LoadError { source_name: String, error: String },

    /// Configuration sources parsed but did not match the expected shape
    #[error("Failed to deserialize configuration: {error}")]
    DeserializeError { error: String },

    /// Invalid configuration value
    #[error("Invalid value '{value}' for field '{field}': {context}")]
    InvalidValue {
        field: String,
        value: String,
        context: String,
    },
}

impl ConfigurationError {
    pub fn load_error(source_name: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self::LoadError {
            source_name: source_name.into(),
            error: error.to_string(),
        }
    }

    pub fn invalid_value(
        field: impl Into<String>,
        value: impl std::fmt::Display,
        context: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            value: value.to_string(),
            context: context.into(),
        }
    }
}

impl From<config::ConfigError> for ConfigurationError {
    fn from(error: config::ConfigError) -> Self {
        Self::DeserializeError {
            error: error.to_string(),
        }
    }
}

pub type ConfigResult<T> = Result<T, ConfigurationError>;
