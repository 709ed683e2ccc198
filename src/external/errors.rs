//! External call error classification.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single call to an external resolution service.
///
/// Transient variants are retried with backoff and never cached. Terminal
/// variants are cached as failure entries and reported per identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExternalCallError {
    #[error("Call to {resolver} timed out")]
    Timeout { resolver: String },

    #[error("Call to {resolver} was rate limited")]
    RateLimited {
        resolver: String,
        retry_after_ms: Option<u64>,
    },

    #[error("Call to {resolver} failed with server status {status}")]
    ServerError { resolver: String, status: u16 },

    #[error("Connection to {resolver} failed: {reason}")]
    Connection { resolver: String, reason: String },

    #[error("Call to {resolver} rejected with client status {status}")]
    ClientError { resolver: String, status: u16 },

    #[error("Malformed response from {resolver}: {reason}")]
    MalformedResponse { resolver: String, reason: String },
}

impl ExternalCallError {
    /// Classify an HTTP-style status code returned by a resolver
    pub fn from_status(resolver: impl Into<String>, status: u16) -> Self {
        let resolver = resolver.into();
        match status {
            429 => Self::RateLimited {
                resolver,
                retry_after_ms: None,
            },
            408 | 504 => Self::Timeout { resolver },
            500..=599 => Self::ServerError { resolver, status },
            _ => Self::ClientError { resolver, status },
        }
    }

    /// Whether the failure class is worth retrying
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::RateLimited { .. }
                | Self::ServerError { .. }
                | Self::Connection { .. }
        )
    }

    /// Server-requested delay before the next attempt, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited {
                retry_after_ms: Some(ms),
                ..
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }

    pub fn resolver(&self) -> &str {
        match self {
            Self::Timeout { resolver }
            | Self::RateLimited { resolver, .. }
            | Self::ServerError { resolver, .. }
            | Self::Connection { resolver, .. }
            | Self::ClientError { resolver, .. }
            | Self::MalformedResponse { resolver, .. } => resolver,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(ExternalCallError::from_status("r", 503).is_transient());
        assert!(ExternalCallError::from_status("r", 429).is_transient());
        assert!(ExternalCallError::from_status("r", 504).is_transient());
        assert!(!ExternalCallError::from_status("r", 404).is_transient());
        assert!(!ExternalCallError::from_status("r", 400).is_transient());
    }

    #[test]
    fn test_malformed_response_is_terminal() {
        let err = ExternalCallError::MalformedResponse {
            resolver: "r".to_string(),
            reason: "missing field".to_string(),
        };
        assert!(!err.is_transient());
        assert_eq!(err.resolver(), "r");
    }

    #[test]
    fn test_retry_after() {
        let err = ExternalCallError::RateLimited {
            resolver: "r".to_string(),
            retry_after_ms: Some(1500),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_millis(1500)));
        assert_eq!(
            ExternalCallError::from_status("r", 429).retry_after(),
            None
        );
    }
}
