//! # Structured Logging Module
//!
//! Environment-aware structured logging for strategy executions. Console
//! output is human readable by default and switches to JSON lines when
//! `logging.json` is set.

use crate::config::LoggingConfig;
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = if config.level.is_empty() {
            get_log_level(&environment)
        } else {
            config.level.clone()
        };

        let console_layer = if config.json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .json()
                .with_filter(EnvFilter::new(log_level.clone()))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_ansi(true)
                .with_filter(EnvFilter::new(log_level.clone()))
                .boxed()
        };

        // An embedding application may already own the global subscriber
        if tracing_subscriber::registry()
            .with(console_layer)
            .try_init()
            .is_err()
        {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            environment = %environment,
            level = %log_level,
            json = config.json,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("MAPPER_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for strategy-level operations
pub fn log_strategy_operation(
    operation: &str,
    execution_id: &str,
    strategy_name: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        execution_id = %execution_id,
        strategy_name = %strategy_name,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "STRATEGY_OPERATION"
    );
}

/// Log structured data for step operations
pub fn log_step_operation(
    operation: &str,
    execution_id: &str,
    step_index: usize,
    step_name: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        execution_id = %execution_id,
        step_index = step_index,
        step_name = %step_name,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "STEP_OPERATION"
    );
}

/// Log structured data for checkpoint operations
pub fn log_checkpoint_operation(
    operation: &str,
    execution_id: &str,
    step_index: Option<usize>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        execution_id = %execution_id,
        step_index = step_index,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "CHECKPOINT_OPERATION"
    );
}
