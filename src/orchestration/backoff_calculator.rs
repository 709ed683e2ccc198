//! # Backoff Calculator
//!
//! Delay computation and the retry loop for external resolution calls.
//!
//! ## Overview
//!
//! A failed call is retried only when its error is transient. The delay before
//! the next attempt is either the server-requested `retry_after` of a
//! rate-limit response or an exponential delay `base * multiplier^(attempt-1)`.
//! Both are capped at `max_delay`; the exponential form gets optional jitter to
//! spread out retries from concurrent workers.

use crate::config::BackoffConfig;
use crate::external::ExternalCallError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Where a delay came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    Exponential,
    ServerRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffDecision {
    pub delay: Duration,
    pub backoff_type: BackoffType,
}

#[derive(Debug, Clone, Default)]
pub struct BackoffCalculator {
    config: BackoffConfig,
}

impl BackoffCalculator {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackoffConfig {
        &self.config
    }

    fn max_delay(&self) -> Duration {
        Duration::from_millis(self.config.max_delay_ms)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32, error: &ExternalCallError) -> BackoffDecision {
        if let Some(retry_after) = error.retry_after() {
            return BackoffDecision {
                delay: retry_after.min(self.max_delay()),
                backoff_type: BackoffType::ServerRequested,
            };
        }

        let mut delay_ms = self.exponential_delay(attempt).as_millis() as u64;
        if self.config.jitter_enabled {
            delay_ms = self.apply_jitter(delay_ms);
        }
        BackoffDecision {
            delay: Duration::from_millis(delay_ms),
            backoff_type: BackoffType::Exponential,
        }
    }

    /// Capped exponential delay without jitter
    pub fn exponential_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = self.config.base_delay_ms as f64 * self.config.multiplier.powi(exponent);
        let capped = delay.min(self.config.max_delay_ms as f64);
        Duration::from_millis(capped as u64)
    }

    fn apply_jitter(&self, delay_ms: u64) -> u64 {
        use rand::Rng;

        let jitter_range = (delay_ms as f64 * self.config.max_jitter) as u64;
        if jitter_range == 0 {
            return delay_ms;
        }

        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(0..=jitter_range);

        if rng.gen_bool(0.5) {
            delay_ms.saturating_add(jitter).min(self.config.max_delay_ms)
        } else {
            delay_ms.saturating_sub(jitter)
        }
    }
}

/// Run `operation` until it succeeds, fails terminally, or `max_attempts` is spent
///
/// The closure receives the 1-based attempt number. The last error is returned
/// when every attempt failed.
pub async fn retry_with_backoff<T, F, Fut>(
    calculator: &BackoffCalculator,
    max_attempts: u32,
    mut operation: F,
) -> Result<T, ExternalCallError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ExternalCallError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt < max_attempts => {
                let decision = calculator.delay_for(attempt, &error);
                debug!(
                    resolver = error.resolver(),
                    attempt,
                    max_attempts,
                    delay_ms = decision.delay.as_millis() as u64,
                    backoff_type = ?decision.backoff_type,
                    error = %error,
                    "Transient resolution failure, backing off"
                );
                tokio::time::sleep(decision.delay).await;
                attempt += 1;
            }
            Err(error) => {
                if error.is_transient() {
                    warn!(
                        resolver = error.resolver(),
                        attempts = attempt,
                        error = %error,
                        "Retry attempts exhausted"
                    );
                }
                return Err(error);
            }
        }
    }
}
