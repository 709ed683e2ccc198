//! Configuration Loader
//!
//! Merges built-in defaults, an optional TOML file and environment overrides
//! into a validated [`MapperConfig`].

use super::error::{ConfigResult, ConfigurationError};
use super::MapperConfig;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Environment variable prefix for overrides (`MAPPER__ENGINE__CHECKPOINT_STRIDE`)
pub const ENV_PREFIX: &str = "MAPPER";

/// Loaded, validated configuration plus where it came from
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: MapperConfig,
    source_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Defaults plus environment overrides
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_sources(None, ENV_PREFIX)
    }

    /// Defaults, then the given file, then environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_sources(Some(path.as_ref()), ENV_PREFIX)
    }

    /// Load with an explicit environment prefix
    /// This is useful for testing without clobbering the real prefix
    pub fn load_from_sources(
        path: Option<&Path>,
        env_prefix: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let defaults = config::Config::try_from(&MapperConfig::default())
            .map_err(|e| ConfigurationError::load_error("defaults", e))?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            debug!(path = %path.display(), "Adding configuration file source");
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let merged = builder.build().map_err(|e| {
            ConfigurationError::load_error(
                path.map(|p| p.display().to_string())
                    .unwrap_or_else(|| "environment".to_string()),
                e,
            )
        })?;

        let config: MapperConfig = merged.try_deserialize()?;
        config.validate()?;

        info!(
            source_file = ?path.map(|p| p.display().to_string()),
            checkpoint_stride = config.engine.checkpoint_stride,
            checkpoint_backend = ?config.checkpoint.backend,
            max_concurrency = config.resolution.max_concurrency,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            source_file: path.map(Path::to_path_buf),
        }))
    }

    /// Wrap an already-built configuration (tests, embedding callers)
    pub fn from_config(config: MapperConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            source_file: None,
        }))
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CheckpointBackend, CheckpointMode};
    use std::io::Write;

    #[test]
    fn test_load_without_file_uses_defaults() {
        let manager = ConfigManager::load_from_sources(None, "MAPPER_TEST_DEFAULTS").unwrap();
        assert_eq!(manager.config(), &MapperConfig::default());
        assert!(manager.source_file().is_none());
    }

    #[test]
    fn test_load_from_toml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[engine]
checkpoint_stride = 3
checkpoint_mode = "background"

[resolution]
max_concurrency = 2

[checkpoint]
backend = "file"
directory = "/tmp/mapper-checkpoints"
"#
        )
        .unwrap();

        let manager =
            ConfigManager::load_from_sources(Some(file.path()), "MAPPER_TEST_FILE").unwrap();
        let config = manager.config();
        assert_eq!(config.engine.checkpoint_stride, 3);
        assert_eq!(config.engine.checkpoint_mode, CheckpointMode::Background);
        assert_eq!(config.resolution.max_concurrency, 2);
        assert_eq!(config.resolution.batch_size, 100);
        assert_eq!(config.checkpoint.backend, CheckpointBackend::File);
    }

    #[test]
    fn test_environment_overrides_file() {
        std::env::set_var("MAPPER_TEST_ENV__CACHE__FAILURE_TTL_SECONDS", "5");
        let manager = ConfigManager::load_from_sources(None, "MAPPER_TEST_ENV").unwrap();
        std::env::remove_var("MAPPER_TEST_ENV__CACHE__FAILURE_TTL_SECONDS");

        assert_eq!(manager.config().cache.failure_ttl_seconds, 5);
    }

    #[test]
    fn test_invalid_file_values_fail_validation() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[resolution]\nbatch_size = 0").unwrap();

        let result = ConfigManager::load_from_sources(Some(file.path()), "MAPPER_TEST_INVALID");
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = ConfigManager::load_from_sources(
            Some(Path::new("/nonexistent/mapper.toml")),
            "MAPPER_TEST_MISSING",
        );
        assert!(matches!(result, Err(ConfigurationError::LoadError { .. })));
    }
}
