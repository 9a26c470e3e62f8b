//! HTTP transport with retry
//!
//! Network failures, 5xx and 429 responses are retried with exponential
//! backoff (`retry_base_delay * 2^attempt`). A 429 carrying a `Retry-After`
//! header in seconds waits that long instead, up to `max_retry_after`;
//! a longer wait is handed back to the caller. Any other 4xx is returned at
//! once.
//!
//! With a [`RateLimiter`] attached, every attempt (retries included) takes a
//! token before it goes on the wire.

use crate::rate_limit::RateLimiter;
use crate::types::{ApiRequest, ApiResponse};
use crate::{ClientError, Config, Result};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// How the first attempt of a request is admitted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Admission {
    /// Sleep until the limiter has capacity
    Wait,
    /// Return `RateLimitExceeded` when the limiter is saturated
    FailFast,
}

/// HTTP transport bound to one endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    base_url: String,
    access_token: Option<String>,
    max_retries: u32,
    retry_base_delay: Duration,
    max_retry_after: Duration,
    limiter: Option<Arc<RateLimiter>>,
}

impl HttpTransport {
    /// Create a transport from the client configuration
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| ClientError::Config(format!("invalid user agent: {}", e)))?,
        );

        let http = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers)
            .build()
            .map_err(ClientError::Http)?;

        Ok(Self {
            http,
            base_url: config.base_url().to_string(),
            access_token: config.access_token.clone(),
            max_retries: config.max_retries,
            retry_base_delay: config.retry_base_delay,
            max_retry_after: config.max_retry_after,
            limiter: None,
        })
    }

    /// Admit every attempt through `limiter`
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.limiter.as_deref()
    }

    /// Base URL requests are resolved against
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send a request, waiting for rate limit capacity before every attempt
    pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.execute(request, Admission::Wait).await
    }

    /// Send a request, failing with `RateLimitExceeded` if it cannot be
    /// admitted right away
    ///
    /// Retries of an admitted request still wait for capacity.
    pub async fn try_request(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.execute(request, Admission::FailFast).await
    }

    #[instrument(skip(self, request), fields(method = %request.method, path = %request.path))]
    async fn execute(&self, request: ApiRequest, admission: Admission) -> Result<ApiResponse> {
        let mut attempt = 0u32;
        loop {
            let admission = if attempt == 0 { admission } else { Admission::Wait };
            self.admit(admission).await?;
            match self.send_once(&request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = match e.retry_after() {
                        Some(requested) if requested > self.max_retry_after => {
                            warn!(
                                ?requested,
                                max = ?self.max_retry_after,
                                "server asked to wait too long, giving up"
                            );
                            return Err(e);
                        }
                        Some(requested) => requested,
                        None => self.backoff(attempt),
                    };
                    warn!(attempt = attempt + 1, ?delay, error = %e, "retrying request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// GET `path` and deserialize the JSON body
    pub async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(ApiRequest::get(path)).await?.json()
    }

    async fn admit(&self, admission: Admission) -> Result<()> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };
        match admission {
            Admission::Wait => limiter.acquire_token_wait().await,
            Admission::FailFast => limiter.acquire_token()?,
        }
        Ok(())
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    async fn send_once(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, request.path);

        let mut req = self
            .http
            .request(request.method.clone(), &url)
            .headers(request.headers.clone());

        // Add authorization
        if let Some(token) = &self.access_token {
            req = req.bearer_auth(token);
        }

        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }

        debug!("Sending {} request to {}", request.method, url);
        let response = req.send().await?;

        let status = response.status();
        let headers = response.headers().clone();
        if !status.is_success() {
            let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
                parse_retry_after(&headers)
            } else {
                None
            };
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                body,
                retry_after,
            });
        }

        let body = response.bytes().await?;
        Ok(ApiResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
