//! Rate-limited HTTP client with retry and exponential backoff.
//!
//! The rate limiter gates admission of each logical call; the retry loop then
//! governs the resilience of that admitted call.

use std::sync::{Arc, LazyLock};
use std::thread;
use std::time::Duration;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;

use crate::config::{
    DEFAULT_BACKOFF_FACTOR, DEFAULT_CALLS_PER_SECOND, DEFAULT_MAX_RETRIES, HTTP_TIMEOUT_SECS,
};
use crate::error::{InventoryError, Result};
use crate::rate_limit::RateLimiter;

/// User agent string identifying this tool.
const USER_AGENT: &str = concat!("open-data-inventory/", env!("CARGO_PKG_VERSION"));

/// Status reported for map-service links whose HEAD status is unreliable.
pub const MAP_SERVICE_STATUS: i32 = 300;

/// Map services answer HEAD with 400/405/500 although the link works.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static MAP_SERVICE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"atlas/rest|atlas/services").expect("valid regex"));

/// When and how often to retry a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before retry `n` is `backoff_factor * 2^(n - 1)`.
    pub backoff_factor: Duration,
    /// Response statuses that trigger a retry.
    pub retry_statuses: Vec<u16>,
}

impl RetryPolicy {
    /// Policy for catalogue API requests: also retries 429 and 500.
    pub fn catalogue() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            retry_statuses: vec![429, 500, 502, 503, 504],
        }
    }

    /// Policy for resource link checks: gateway errors only.
    pub fn liveness() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
            retry_statuses: vec![502, 503, 504],
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff_factor(mut self, backoff_factor: Duration) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    /// Whether `status` should be retried.
    pub fn is_retryable(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Delay before the given (1-based) retry.
    pub fn delay(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.backoff_factor * (1u32 << exponent)
    }
}

/// Construction settings for [`RetryingHttpClient`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    /// Calls per second shared by all clones of the client; `None` disables limiting.
    pub calls_per_second: Option<u32>,
    /// Accept invalid TLS certificates.
    pub skip_tls_verify: bool,
    pub follow_redirects: bool,
    pub retry: RetryPolicy,
}

impl HttpConfig {
    /// Settings for catalogue API access.
    pub fn catalogue() -> Self {
        Self {
            timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            calls_per_second: Some(DEFAULT_CALLS_PER_SECOND),
            skip_tls_verify: false,
            follow_redirects: true,
            retry: RetryPolicy::catalogue(),
        }
    }

    /// Settings for resource link checks: no TLS verification, redirects
    /// reported as-is.
    pub fn liveness() -> Self {
        Self {
            timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            calls_per_second: None,
            skip_tls_verify: true,
            follow_redirects: false,
            retry: RetryPolicy::liveness(),
        }
    }

    pub fn with_calls_per_second(mut self, calls_per_second: Option<u32>) -> Self {
        self.calls_per_second = calls_per_second;
        self
    }

    pub fn with_skip_tls_verify(mut self, skip: bool) -> Self {
        self.skip_tls_verify = skip;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Anything that can report the HTTP status of a URL.
pub trait StatusProbe: Send + Sync {
    /// Status code of `url`, after map-service correction.
    fn status_code(&self, url: &str) -> Result<i32>;
}

/// Blocking HTTP client with retry, backoff and a shared rate limiter.
///
/// Clones share the underlying connection pool and rate limiter.
#[derive(Debug, Clone)]
pub struct RetryingHttpClient {
    client: Client,
    retry: RetryPolicy,
    limiter: Option<Arc<RateLimiter>>,
}

impl RetryingHttpClient {
    /// Build a client from the given settings.
    pub fn new(config: HttpConfig) -> Result<Self> {
        let redirect = if config.follow_redirects {
            Policy::default()
        } else {
            Policy::none()
        };
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .redirect(redirect)
            .danger_accept_invalid_certs(config.skip_tls_verify)
            .build()?;

        Ok(Self {
            client,
            retry: config.retry,
            limiter: config
                .calls_per_second
                .map(|calls| Arc::new(RateLimiter::per_second(calls))),
        })
    }

    /// Client configured for catalogue API access.
    pub fn catalogue() -> Result<Self> {
        Self::new(HttpConfig::catalogue())
    }

    /// Client configured for resource link checks.
    pub fn liveness() -> Result<Self> {
        Self::new(HttpConfig::liveness())
    }

    fn admit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.acquire();
        }
    }

    fn backoff(&self, retry: u32) {
        let delay = self.retry.delay(retry);
        tracing::debug!(retry, delay_ms = delay.as_millis() as u64, "Retrying after delay");
        thread::sleep(delay);
    }

    /// GET `url` and return the body.
    ///
    /// Retryable statuses and connection/timeout errors are retried with
    /// backoff; other error statuses fail immediately.
    pub fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.admit();
        let mut last_error: Option<String> = None;

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                self.backoff(attempt);
            }

            match self.client.get(url).send() {
                Ok(response) => {
                    let status = response.status();

                    if self.retry.is_retryable(status.as_u16()) {
                        tracing::warn!(
                            status = %status,
                            url,
                            attempt = attempt + 1,
                            max_attempts = self.retry.max_attempts,
                            "Retryable status, will retry"
                        );
                        last_error = Some(format!("Server error: {status}"));
                        continue;
                    }

                    if !status.is_success() {
                        return Err(InventoryError::HttpStatus {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }

                    return Ok(response.bytes()?.to_vec());
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    tracing::warn!(
                        error = %e,
                        url,
                        attempt = attempt + 1,
                        max_attempts = self.retry.max_attempts,
                        "Connection error, will retry"
                    );
                    last_error = Some(e.to_string());
                }
                Err(e) => return Err(InventoryError::Http(e)),
            }
        }

        Err(InventoryError::RetriesExhausted {
            attempts: self.retry.max_attempts,
            message: last_error.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }

    /// HEAD `url` and return its status code.
    ///
    /// Fails with [`InventoryError::RetriesExhausted`] when every attempt
    /// ends in a connection error or a retryable status.
    pub fn head(&self, url: &str) -> Result<u16> {
        self.admit();
        let mut last_error: Option<String> = None;

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                self.backoff(attempt);
            }

            match self.client.head(url).send() {
                Ok(response) => {
                    let status = response.status().as_u16();
                    if !self.retry.is_retryable(status) {
                        return Ok(status);
                    }
                    last_error = Some(format!("Server error: {status}"));
                }
                Err(e) if e.is_connect() || e.is_timeout() => {
                    last_error = Some(e.to_string());
                }
                Err(e) => return Err(InventoryError::Http(e)),
            }
        }

        Err(InventoryError::RetriesExhausted {
            attempts: self.retry.max_attempts,
            message: last_error.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }

    /// HEAD `url` and correct the status of map-service links.
    pub fn get_status_code(&self, url: &str) -> Result<i32> {
        let status = i32::from(self.head(url)?);
        Ok(correct_status_code(url, status))
    }
}

impl StatusProbe for RetryingHttpClient {
    fn status_code(&self, url: &str) -> Result<i32> {
        self.get_status_code(url)
    }
}

/// Map-service URLs report [`MAP_SERVICE_STATUS`] unless truly missing.
pub fn correct_status_code(url: &str, status: i32) -> i32 {
    if status != 404 && MAP_SERVICE_PATTERN.is_match(url) {
        MAP_SERVICE_STATUS
    } else {
        status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_clients() {
        assert!(RetryingHttpClient::catalogue().is_ok());
        assert!(RetryingHttpClient::liveness().is_ok());
    }

    #[test]
    fn test_retry_policies() {
        let catalogue = RetryPolicy::catalogue();
        assert!(catalogue.is_retryable(429));
        assert!(catalogue.is_retryable(500));
        assert!(catalogue.is_retryable(503));
        assert!(!catalogue.is_retryable(404));

        let liveness = RetryPolicy::liveness();
        assert!(!liveness.is_retryable(429));
        assert!(!liveness.is_retryable(500));
        assert!(liveness.is_retryable(502));
    }

    #[test]
    fn test_backoff_is_exponential() {
        let policy = RetryPolicy::catalogue().with_backoff_factor(Duration::from_millis(500));
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(1000));
        assert_eq!(policy.delay(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_correct_status_code() {
        let atlas = "https://agriculture.canada.ca/atlas/rest/services/mapservices/x/MapServer";
        assert_eq!(correct_status_code(atlas, 405), MAP_SERVICE_STATUS);
        assert_eq!(correct_status_code(atlas, 500), MAP_SERVICE_STATUS);
        assert_eq!(correct_status_code(atlas, 404), 404);
        assert_eq!(correct_status_code("https://example.org/data.csv", 405), 405);
    }
}
