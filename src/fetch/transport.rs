//! Transport seam between the fetcher and the network
//!
//! The fetcher only needs "send a page request, get status + body or an
//! error". `HttpTransport` is the reqwest implementation; tests substitute
//! scripted transports.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::ApiConfig;

/// Errors raised below the HTTP status layer
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Timeout after {0:?}")]
    Timeout(Duration),
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

/// Parameters of one page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Collection this request belongs to (for logging and test doubles)
    pub collection_id: String,
    /// Search query
    pub jql: String,
    /// Offset of the first record
    pub start_at: u64,
    /// Requested page size
    pub max_results: u64,
    /// Field-selection list
    pub fields: Vec<String>,
}

/// Raw response: status plus body text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// A way of executing page requests
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one request. Non-2xx statuses are returned as responses, not errors.
    async fn send(&self, request: &PageRequest) -> Result<TransportResponse, TransportError>;

    /// Transport name for logs
    fn name(&self) -> &str {
        "transport"
    }
}

/// reqwest-backed transport for Jira-style search endpoints
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
    credentials: Option<(String, String)>,
}

impl HttpTransport {
    /// Build a transport for `api`, with `timeout` applied to every request
    pub fn new(api: &ApiConfig, timeout: Duration) -> Result<Self, TransportError> {
        let endpoint = Self::endpoint(&api.base_url, &api.search_path)?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .user_agent(&api.user_agent)
            .default_headers(headers)
            .gzip(true)
            .build()?;

        let credentials = api
            .credentials()
            .map(|(email, token)| (email.to_string(), token.to_string()));
        if credentials.is_none() {
            tracing::debug!("No credentials configured; requests to {} are anonymous", endpoint);
        }

        Ok(Self {
            client,
            endpoint,
            credentials,
        })
    }

    /// Resolve the search endpoint against the base URL.
    ///
    /// The base is treated as a directory so "https://host/jira" keeps its path.
    fn endpoint(base_url: &str, search_path: &str) -> Result<Url, TransportError> {
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base = Url::parse(&base).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        base.join(search_path.trim_start_matches('/'))
            .map_err(|e| TransportError::InvalidUrl(e.to_string()))
    }

    /// The resolved search endpoint
    pub fn endpoint_url(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &PageRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self.client.get(self.endpoint.clone()).query(&[
            ("jql", request.jql.clone()),
            ("startAt", request.start_at.to_string()),
            ("maxResults", request.max_results.to_string()),
            ("fields", request.fields.join(",")),
        ]);

        if let Some((email, token)) = &self.credentials {
            builder = builder.basic_auth(email, Some(token));
        }

        let response = builder.send().await.map_err(classify_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify_reqwest_error)?;

        Ok(TransportResponse { status, body })
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_connect() {
        TransportError::Connection(e.to_string())
    } else {
        TransportError::Http(e)
    }
}
