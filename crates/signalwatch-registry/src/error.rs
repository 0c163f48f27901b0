//! Error types for registry access.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to the registry.
#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    /// Transient transport failure, timeout, HTTP 5xx/429 after retries, or an open circuit
    #[error("network error: {0}")]
    Network(String),

    /// Rate budget exhausted and the caller asked not to block
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimitExceeded {
        /// Time until the oldest call in the window expires
        retry_after: Duration,
    },

    /// Invalid or expired API key
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Company, filing or document absent
    #[error("not found: {0}")]
    NotFound(String),

    /// Non-retryable HTTP status other than auth/not-found
    #[error("registry returned status {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response excerpt
        message: String,
    },

    /// Response body could not be decoded
    #[error("failed to decode registry response: {0}")]
    Decode(String),

    /// Client could not be constructed
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl RegistryError {
    /// Whether the call may succeed if retried after a delay.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimitExceeded { .. })
    }

    /// Whether the error invalidates the whole scan rather than one company.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth(_) | Self::Config(_))
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(RegistryError::Network("reset".to_string()).is_retryable());
        assert!(!RegistryError::Auth("bad key".to_string()).is_retryable());
        assert!(RegistryError::Auth("bad key".to_string()).is_fatal());
        assert!(!RegistryError::NotFound("/company/00000000".to_string()).is_fatal());
        assert!(!RegistryError::RateLimitExceeded {
            retry_after: Duration::from_secs(1)
        }
        .is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = RegistryError::Http {
            status: 400,
            message: "bad query".to_string(),
        };
        assert_eq!(err.to_string(), "registry returned status 400: bad query");
    }
}
