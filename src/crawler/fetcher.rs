//! HTTP fetcher implementation
//!
//! Every network access of the crawl goes through [`Fetcher::fetch`]. It
//! handles:
//! - Building the HTTP client with the crawler's user agent and timeouts
//! - Classifying each failed attempt as transient or permanent
//! - Retrying transient failures with exponential backoff
//! - Stopping retries once the run is cancelled
//!
//! Failures leave this module only as a terminal [`FetchError`].

use crate::config::{CrawlerConfig, UserAgentConfig};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Longest delay between two attempts regardless of the attempt count
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// A fetch that could not be completed
///
/// Either every attempt failed transiently, or one attempt failed in a way
/// retrying cannot fix (e.g. HTTP 404).
#[derive(Debug, Clone, Error)]
#[error("fetch of {url} failed after {attempts} attempt(s): {last_cause}")]
pub struct FetchError {
    pub url: String,
    pub last_cause: String,
    /// HTTP status of the last response, if one was received
    pub status: Option<u16>,
    pub attempts: u32,
}

impl FetchError {
    /// True if the server answered 404, i.e. the page does not exist
    pub fn is_not_found(&self) -> bool {
        self.status == Some(StatusCode::NOT_FOUND.as_u16())
    }
}

/// Whether a failed attempt is worth repeating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Timeouts, connection errors, 5xx, 408, 429
    Transient,
    /// Everything else
    Permanent,
}

/// Outcome of a single failed request attempt
#[derive(Debug, Clone)]
struct AttemptFailure {
    kind: FailureKind,
    cause: String,
    status: Option<u16>,
}

/// Retry settings for the fetcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per URL, including the first
    pub max_attempts: u32,

    /// Delay after the first failed attempt; doubled for each later one
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(MAX_BACKOFF)
    }
}

/// Classifies an HTTP status that is not a success
pub fn classify_status(status: StatusCode) -> FailureKind {
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        FailureKind::Transient
    } else {
        FailureKind::Permanent
    }
}

fn classify_reqwest_error(error: &reqwest::Error) -> FailureKind {
    if error.is_builder() || error.is_redirect() {
        FailureKind::Permanent
    } else {
        FailureKind::Transient
    }
}

/// Builds an HTTP client with the configured identity and timeouts
///
/// # Example
///
/// ```no_run
/// use shelf_harvest::config::{CrawlerConfig, UserAgentConfig};
/// use shelf_harvest::crawler::build_http_client;
///
/// let agent = UserAgentConfig {
///     crawler_name: "ShelfHarvest".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "ops@example.com".to_string(),
/// };
///
/// let client = build_http_client(&agent, &CrawlerConfig::default()).unwrap();
/// ```
pub fn build_http_client(
    agent: &UserAgentConfig,
    crawler: &CrawlerConfig,
) -> Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL; ContactEmail)
    let user_agent = format!(
        "{}/{} (+{}; {})",
        agent.crawler_name, agent.crawler_version, agent.contact_url, agent.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(crawler.request_timeout_secs))
        .connect_timeout(Duration::from_secs(crawler.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches documents with bounded retry
///
/// Cheap to clone; clones share the connection pool and cancellation token.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl Fetcher {
    pub fn new(client: Client, policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self {
            client,
            policy,
            cancel,
        }
    }

    /// Fetches `url` and returns the response body
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | 2xx | Return body |
    /// | 5xx, 408, 429 | Retry after backoff |
    /// | Timeout, connection error | Retry after backoff |
    /// | Other 4xx (404, 403, ...) | Fail immediately |
    /// | Attempts exhausted | Fail with the last cause |
    /// | Run cancelled during backoff | Fail without another attempt |
    pub async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            tracing::trace!("GET {} (attempt {})", url, attempt);

            let failure = match self.attempt(url).await {
                Ok(body) => return Ok(body),
                Err(failure) => failure,
            };

            let terminal = |last_cause: String| FetchError {
                url: url.to_string(),
                last_cause,
                status: failure.status,
                attempts: attempt,
            };

            if failure.kind == FailureKind::Permanent {
                tracing::debug!("Permanent failure for {}: {}", url, failure.cause);
                return Err(terminal(failure.cause.clone()));
            }

            if attempt >= self.policy.max_attempts {
                tracing::warn!(
                    "Giving up on {} after {} attempts: {}",
                    url,
                    attempt,
                    failure.cause
                );
                return Err(terminal(failure.cause.clone()));
            }

            let delay = self.policy.delay_after(attempt);
            tracing::debug!(
                "Transient failure for {} ({}), retrying in {:?}",
                url,
                failure.cause,
                delay
            );

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return Err(terminal(format!("cancelled after: {}", failure.cause)));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn attempt(&self, url: &str) -> Result<String, AttemptFailure> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AttemptFailure {
                kind: classify_reqwest_error(&e),
                cause: describe_error(&e),
                status: None,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AttemptFailure {
                kind: classify_status(status),
                cause: format!("HTTP {}", status.as_u16()),
                status: Some(status.as_u16()),
            });
        }

        response.text().await.map_err(|e| AttemptFailure {
            kind: FailureKind::Transient,
            cause: format!("failed reading body: {}", describe_error(&e)),
            status: Some(status.as_u16()),
        })
    }
}

fn describe_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "request timeout".to_string()
    } else if error.is_connect() {
        "connection failed".to_string()
    } else {
        error.to_string()
    }
}
