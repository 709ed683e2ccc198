//! # Engine Configuration
//!
//! Layered configuration for the strategy engine: built-in defaults, an
//! optional TOML file, then `MAPPER__SECTION__KEY` environment overrides.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use mapper_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load_from_file("config/mapper.toml")?;
//! let stride = manager.config().engine.checkpoint_stride;
//! let ttl = manager.config().cache.success_ttl();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration structure mirroring mapper.toml
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Step loop behavior
    pub engine: EngineConfig,

    /// Resolution cache lifetimes
    pub cache: CacheConfig,

    /// Defaults for external resolution actions
    pub resolution: ResolutionConfig,

    /// Retry backoff for transient external failures
    pub backoff: BackoffConfig,

    /// Checkpoint store selection
    pub checkpoint: CheckpointConfig,

    /// Conversion path ranking
    pub path_finder: PathFinderConfig,

    pub logging: LoggingConfig,
}

/// How checkpoint writes relate to the step loop
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointMode {
    /// Each write completes before the next step starts
    #[default]
    Sync,
    /// Writes run off the step loop; flushed before FAILED/CANCELLED is reported
    Background,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Write a checkpoint after every N completed steps (0 disables)
    pub checkpoint_stride: u32,
    pub checkpoint_mode: CheckpointMode,
    /// Upper bound on a single action execution
    pub step_timeout_ms: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            checkpoint_stride: 1,
            checkpoint_mode: CheckpointMode::Sync,
            step_timeout_ms: None,
        }
    }
}

impl EngineConfig {
    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub success_ttl_seconds: u64,
    pub failure_ttl_seconds: u64,
    /// Upper bound on cached resolutions
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            success_ttl_seconds: 3600,
            failure_ttl_seconds: 60,
            max_entries: 100_000,
        }
    }
}

impl CacheConfig {
    pub fn success_ttl(&self) -> Duration {
        Duration::from_secs(self.success_ttl_seconds)
    }

    pub fn failure_ttl(&self) -> Duration {
        Duration::from_secs(self.failure_ttl_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Simultaneous in-flight external calls per action instance
    pub max_concurrency: usize,
    pub batch_size: usize,
    pub max_attempts: u32,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            batch_size: 100,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter_enabled: bool,
    /// Maximum jitter as a fraction of the delay (0.0 to 1.0)
    pub max_jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 200,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter_enabled: true,
            max_jitter: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointBackend {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CheckpointConfig {
    pub backend: CheckpointBackend,
    /// Directory for the file backend
    pub directory: PathBuf,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            backend: CheckpointBackend::Memory,
            directory: PathBuf::from("checkpoints"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PathFinderConfig {
    /// Replaces the provider priority of every edge using this resolver
    pub priority_overrides: HashMap<String, i32>,
}

impl PathFinderConfig {
    pub fn with_override(mut self, resolver_ref: impl Into<String>, priority: i32) -> Self {
        self.priority_overrides.insert(resolver_ref.into(), priority);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive; falls back to an environment-derived level when empty
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: String::new(),
            json: false,
        }
    }
}

impl MapperConfig {
    /// Reject values that would stall or misbehave at runtime
    pub fn validate(&self) -> ConfigResult<()> {
        if self.resolution.max_concurrency == 0 {
            return Err(ConfigurationError::invalid_value(
                "resolution.max_concurrency",
                0,
                "concurrency limit must be greater than 0",
            ));
        }

        if self.resolution.batch_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "resolution.batch_size",
                0,
                "batch size must be greater than 0",
            ));
        }

        if self.resolution.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "resolution.max_attempts",
                0,
                "at least one attempt is required",
            ));
        }

        if self.backoff.multiplier <= 0.0 {
            return Err(ConfigurationError::invalid_value(
                "backoff.multiplier",
                self.backoff.multiplier,
                "multiplier must be positive",
            ));
        }

        if !(0.0..=1.0).contains(&self.backoff.max_jitter) {
            return Err(ConfigurationError::invalid_value(
                "backoff.max_jitter",
                self.backoff.max_jitter,
                "jitter must be between 0.0 and 1.0",
            ));
        }

        if self.backoff.max_delay_ms < self.backoff.base_delay_ms {
            return Err(ConfigurationError::invalid_value(
                "backoff.max_delay_ms",
                self.backoff.max_delay_ms,
                "max delay must not be below base delay",
            ));
        }

        Ok(())
    }
}
