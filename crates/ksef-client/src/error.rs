//! Client error types

use crate::rate_limit::RateWindowKind;
use crate::types::KeyUsage;
use std::time::Duration;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success response from the platform
    #[error("API error ({status}): {body}")]
    Api {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    /// No published certificate advertises the requested usage
    #[error("no public key certificate for usage {0}")]
    KeyNotFound(KeyUsage),

    /// A rate window is exhausted
    #[error("rate limit exceeded for the {window} window, retry after {retry_after:?}")]
    RateLimitExceeded {
        window: RateWindowKind,
        retry_after: Duration,
    },

    /// Too many sessions are open at once
    #[error("concurrent session limit of {max} reached")]
    ConcurrencySessionLimitExceeded { max: u32 },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid response
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Cryptographic failure
    #[error("Crypto error: {0}")]
    Crypto(#[from] ksef_crypto::CryptoError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether the transport should try the request again
    ///
    /// Network failures, 5xx and 429 are retryable; any other 4xx is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }

    /// How long the caller should wait before trying again, when known
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Api { retry_after, .. } => *retry_after,
            Self::RateLimitExceeded { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Check if this is a local rate or session limit rejection
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. } | Self::ConcurrencySessionLimitExceeded { .. }
        ) || matches!(self, Self::Api { status, .. } if *status == 429)
    }

    /// Check if this is an authentication or authorization failure
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status == 401 || *status == 403)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16) -> ClientError {
        ClientError::Api {
            status,
            body: String::new(),
            retry_after: None,
        }
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(api(429).is_retryable());
        assert!(api(500).is_retryable());
        assert!(api(503).is_retryable());
        assert!(!api(400).is_retryable());
        assert!(!api(401).is_retryable());
        assert!(!api(404).is_retryable());
    }

    #[test]
    fn test_local_preconditions_not_retryable() {
        assert!(!ClientError::KeyNotFound(KeyUsage::SymmetricKeyEncryption).is_retryable());
        let missing = ksef_crypto::CryptoError::MissingCertificateForOfflineSigning;
        assert!(!ClientError::Crypto(missing).is_retryable());
    }

    #[test]
    fn test_retry_after() {
        let err = ClientError::RateLimitExceeded {
            window: RateWindowKind::Second,
            retry_after: Duration::from_millis(250),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_millis(250)));
        assert!(err.is_rate_limited());
        assert!(ClientError::ConcurrencySessionLimitExceeded { max: 2 }.is_rate_limited());
        assert!(api(403).is_unauthorized());
    }
}
