//! Client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Client configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// API endpoint URL
    pub endpoint: String,
    /// Base URL of verification-code links
    pub verification_base_url: String,
    /// Access token (JWT)
    pub access_token: Option<String>,
    /// Request timeout
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
    /// Maximum retry attempts
    pub max_retries: u32,
    /// First retry delay; doubled on every further attempt
    #[serde(with = "duration_millis")]
    pub retry_base_delay: Duration,
    /// Longest server-requested `Retry-After` the transport waits out
    #[serde(with = "duration_millis")]
    pub max_retry_after: Duration,
    /// Cached public keys are refetched this long before they expire
    #[serde(with = "duration_millis")]
    pub public_key_refresh_margin: Duration,
    /// Batch part size (bytes)
    pub batch_part_size: usize,
    /// Request admission limits
    pub rate_limits: RateLimitConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "https://ksef-test.mf.gov.pl/api/v2".to_string(),
            verification_base_url: "https://qr-test.ksef.mf.gov.pl".to_string(),
            access_token: None,
            timeout: Duration::from_secs(30),
            user_agent: format!("ksef-client/{}", env!("CARGO_PKG_VERSION")),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            max_retry_after: Duration::from_secs(60),
            public_key_refresh_margin: Duration::from_secs(300),
            batch_part_size: ksef_crypto::DEFAULT_PART_SIZE,
            rate_limits: RateLimitConfig::default(),
        }
    }
}

impl Config {
    /// Create a new config with the given endpoint
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Set the access token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry policy
    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_base_delay = base_delay;
        self
    }

    /// Set the longest `Retry-After` honoured before giving up
    pub fn with_max_retry_after(mut self, max: Duration) -> Self {
        self.max_retry_after = max;
        self
    }

    /// Set the verification link base URL
    pub fn with_verification_base_url(mut self, url: impl Into<String>) -> Self {
        self.verification_base_url = url.into();
        self
    }

    /// Set how early cached public keys are refreshed
    pub fn with_public_key_refresh_margin(mut self, margin: Duration) -> Self {
        self.public_key_refresh_margin = margin;
        self
    }

    /// Set the batch part size
    pub fn with_batch_part_size(mut self, size: usize) -> Self {
        self.batch_part_size = size;
        self
    }

    /// Set the rate limits
    pub fn with_rate_limits(mut self, limits: RateLimitConfig) -> Self {
        self.rate_limits = limits;
        self
    }

    /// Build the base URL for API requests
    pub fn base_url(&self) -> &str {
        self.endpoint.trim_end_matches('/')
    }
}

/// Request admission limits
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitConfig {
    /// When false every request and session is admitted
    pub enabled: bool,
    pub requests_per_second: u32,
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub max_concurrent_sessions: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 10,
            requests_per_minute: 100,
            requests_per_hour: 1000,
            max_concurrent_sessions: 5,
        }
    }
}

impl RateLimitConfig {
    /// Limits that admit everything
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
