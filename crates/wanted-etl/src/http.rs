//! HTTP sessions with a bounded retry policy.
//!
//! A [`SessionFactory`] holds the static request headers and the retry
//! policy. Every [`Session`] it opens owns a fresh `reqwest::Client`, and
//! with it a private connection pool that is released when the session is
//! dropped. Sessions never share state.
//!
//! Only statuses in the policy's forcelist are retried, with exponential
//! backoff. Transport failures, other non-2xx statuses and undecodable
//! bodies fail immediately.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde_json::Value;

use crate::error::{PipelineError, PipelineResult};

/// Statuses treated as transient by default.
pub const DEFAULT_STATUS_FORCELIST: [u16; 5] = [429, 500, 502, 503, 504];

/// Statuses whose `Retry-After` header is honored.
const RETRY_AFTER_STATUSES: [u16; 3] = [413, 429, 503];

/// Retry behavior for a session.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries per request (not counting the first try).
    pub total: u32,
    /// Backoff multiplier in seconds; retry `n` sleeps `factor * 2^(n-1)`.
    pub backoff_factor: f64,
    /// Upper bound for any single sleep.
    pub backoff_max: Duration,
    pub status_forcelist: Vec<u16>,
    pub respect_retry_after: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            total: 5,
            backoff_factor: 2.0,
            backoff_max: Duration::from_secs(120),
            status_forcelist: DEFAULT_STATUS_FORCELIST.to_vec(),
            respect_retry_after: true,
        }
    }
}

impl RetryPolicy {
    /// Policy with no sleeping between retries.
    pub fn immediate(total: u32) -> Self {
        Self {
            total,
            backoff_factor: 0.0,
            ..Self::default()
        }
    }

    pub fn is_retryable(&self, status: u16) -> bool {
        self.status_forcelist.contains(&status)
    }

    /// Sleep before the `retry`-th retry (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        if retry == 0 || self.backoff_factor <= 0.0 {
            return Duration::ZERO;
        }
        let exp = retry.saturating_sub(1).min(62) as i32;
        let secs = (self.backoff_factor * 2f64.powi(exp)).min(self.backoff_max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }
}

/// A request that could not produce a page payload.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("page {page}: request failed: {source}")]
    Transport {
        page: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("page {page}: HTTP {status}")]
    Status { page: u32, status: u16 },

    #[error("page {page}: HTTP {status} still failing after {retries} retries")]
    RetriesExhausted { page: u32, status: u16, retries: u32 },

    #[error("page {page}: invalid JSON body: {message}")]
    Decode { page: u32, message: String },

    #[error("page {page}: could not open session: {message}")]
    Client { page: u32, message: String },
}

impl FetchError {
    pub fn page(&self) -> u32 {
        match self {
            FetchError::Transport { page, .. }
            | FetchError::Status { page, .. }
            | FetchError::RetriesExhausted { page, .. }
            | FetchError::Decode { page, .. }
            | FetchError::Client { page, .. } => *page,
        }
    }
}

/// Builds independent sessions sharing headers and retry policy.
#[derive(Debug, Clone)]
pub struct SessionFactory {
    headers: HeaderMap,
    policy: RetryPolicy,
    timeout: Duration,
}

impl SessionFactory {
    /// Validate the static headers once; every session reuses them.
    pub fn new(
        headers: &HashMap<String, String>,
        policy: RetryPolicy,
        timeout: Duration,
    ) -> PipelineResult<Self> {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| PipelineError::Config(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                PipelineError::Config(format!("invalid value for header '{name}': {e}"))
            })?;
            map.insert(name, value);
        }

        Ok(Self {
            headers: map,
            policy,
            timeout,
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Open a session with its own connection pool.
    pub fn open(&self) -> PipelineResult<Session> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .default_headers(self.headers.clone())
            .build()
            .map_err(|e| PipelineError::Http(format!("failed to build client: {e}")))?;

        Ok(Session {
            client,
            policy: self.policy.clone(),
        })
    }
}

/// Hands out fresh sessions to the fetcher.
pub trait SessionSource {
    fn open(&self) -> PipelineResult<Session>;
}

impl SessionSource for SessionFactory {
    fn open(&self) -> PipelineResult<Session> {
        SessionFactory::open(self)
    }
}

/// One HTTP client instance. Dropping it closes its pool.
pub struct Session {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl Session {
    /// GET `url?page=<page>` and decode the body as JSON, retrying
    /// transient statuses per the session's policy.
    pub async fn get_json(&self, url: &str, page: u32) -> Result<Value, FetchError> {
        let mut retries = 0u32;

        loop {
            let resp = self
                .client
                .get(url)
                .query(&[("page", page)])
                .send()
                .await
                .map_err(|source| FetchError::Transport { page, source })?;

            let status = resp.status().as_u16();

            if self.policy.is_retryable(status) {
                if retries >= self.policy.total {
                    return Err(FetchError::RetriesExhausted {
                        page,
                        status,
                        retries,
                    });
                }
                retries += 1;
                let delay = self.retry_delay(&resp, status, retries);
                tracing::warn!(
                    page,
                    status,
                    retry = retries,
                    delay_ms = delay.as_millis() as u64,
                    "transient status, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if !resp.status().is_success() {
                return Err(FetchError::Status { page, status });
            }

            let body = resp
                .bytes()
                .await
                .map_err(|source| FetchError::Transport { page, source })?;

            return serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
                page,
                message: e.to_string(),
            });
        }
    }

    fn retry_delay(&self, resp: &reqwest::Response, status: u16, retry: u32) -> Duration {
        if self.policy.respect_retry_after && RETRY_AFTER_STATUSES.contains(&status) {
            let header_secs = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok());
            if let Some(secs) = header_secs {
                return Duration::from_secs(secs).min(self.policy.backoff_max);
            }
        }
        self.policy.backoff(retry)
    }
}
