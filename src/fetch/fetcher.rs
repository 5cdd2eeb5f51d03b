//! Rate-bounded page fetcher
//!
//! Wraps a `Transport` with per-call timeouts, outcome classification and an
//! exponential backoff schedule. Transient failures never escape this module
//! except as a final `RetriesExhausted` once the attempt ceiling is hit.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::classify::{classify, Outcome, Verdict};
use super::transport::{PageRequest, Transport, TransportError, TransportResponse};
use crate::config::{CollectionConfig, RetryConfig};
use crate::pipeline::{EventBus, PipelineEvent, RunStats};
use crate::types::Page;
use crate::util::truncate_str;

/// Longest response body excerpt kept in error messages
const ERROR_BODY_EXCERPT: usize = 200;

/// Fatal fetch failures
#[derive(Debug, Error)]
pub enum FetchError {
    /// The remote refused the request; retrying cannot help
    #[error("request rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },
    /// Transient failures persisted through every allowed attempt
    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
    /// A 2xx response whose body is not a page
    #[error("malformed page body: {0}")]
    MalformedBody(String),
}

/// Attempt ceiling and exponential backoff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay to wait after failed attempt `attempt` (counted from 1): `base * 2^(attempt-1)`.
    ///
    /// Bounded only by the attempt ceiling; there is no separate clamp.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Delays before attempts 2..=max_attempts
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts).map(|a| self.delay_after(a)).collect()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay())
    }
}

/// Result of one attempt, before classification
enum Attempt {
    Response(TransportResponse),
    Failed(TransportError),
}

impl Attempt {
    fn outcome(&self) -> Outcome {
        match self {
            Attempt::Response(response) => Outcome::Status(response.status),
            Attempt::Failed(_) => Outcome::TransportFailure,
        }
    }

    fn describe(&self) -> String {
        match self {
            Attempt::Response(response) => format!(
                "HTTP {}: {}",
                response.status,
                truncate_str(response.body.trim(), ERROR_BODY_EXCERPT)
            ),
            Attempt::Failed(e) => e.to_string(),
        }
    }
}

/// Fetches pages with timeout, retry and backoff
pub struct PageFetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    timeout: Duration,
    fields: Vec<String>,
    stats: Arc<RunStats>,
    events: EventBus,
}

impl PageFetcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
        timeout: Duration,
        fields: Vec<String>,
        stats: Arc<RunStats>,
        events: EventBus,
    ) -> Self {
        Self {
            transport,
            policy,
            timeout,
            fields,
            stats,
            events,
        }
    }

    /// Fetch the page of `collection` starting at `start_at`.
    ///
    /// Always requests `page_size` records; the caller must advance by the
    /// number actually returned.
    pub async fn fetch_page(
        &self,
        collection: &CollectionConfig,
        start_at: u64,
        page_size: u64,
    ) -> Result<Page, FetchError> {
        let request = PageRequest {
            collection_id: collection.id.clone(),
            jql: collection.query(),
            start_at,
            max_results: page_size,
            fields: self.fields.clone(),
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            debug!(
                collection = %collection.id,
                start_at,
                attempt,
                transport = self.transport.name(),
                "Fetching page"
            );

            let result = match tokio::time::timeout(self.timeout, self.transport.send(&request)).await {
                Ok(Ok(response)) => Attempt::Response(response),
                Ok(Err(e)) => Attempt::Failed(e),
                Err(_) => Attempt::Failed(TransportError::Timeout(self.timeout)),
            };

            match (classify(result.outcome()), result) {
                (Verdict::Success, Attempt::Response(response)) => {
                    return decode_page(&response);
                }
                (Verdict::Fatal, Attempt::Response(response)) => {
                    return Err(FetchError::Rejected {
                        status: response.status,
                        body: truncate_str(response.body.trim(), ERROR_BODY_EXCERPT),
                    });
                }
                // Everything else is retryable; transport failures only ever land here
                (_, result) => {
                    let error = result.describe();
                    if attempt >= self.policy.max_attempts {
                        return Err(FetchError::RetriesExhausted {
                            attempts: attempt,
                            last_error: error,
                        });
                    }

                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        collection = %collection.id,
                        start_at,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying page fetch: {}",
                        error
                    );
                    self.stats.record_retry();
                    self.events.emit(PipelineEvent::RetryScheduled {
                        collection: collection.id.clone(),
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        error,
                    });

                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn decode_page(response: &TransportResponse) -> Result<Page, FetchError> {
    serde_json::from_str(&response.body).map_err(|e| {
        FetchError::MalformedBody(format!(
            "{} (body: {})",
            e,
            truncate_str(response.body.trim(), ERROR_BODY_EXCERPT)
        ))
    })
}
