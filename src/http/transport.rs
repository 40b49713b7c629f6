//! Raw transport and outcome classification
//!
//! A `Transport` performs exactly one request/response cycle and never
//! retries. Retrying is the job of [`BackoffPolicy`](super::BackoffPolicy).

use crate::error::{Error, Result};
use crate::types::Method;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// Classified result of one HTTP exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// HTTP 200
    Success,
    /// HTTP 429
    RateLimited,
    /// HTTP 504
    UpstreamTimeout,
    /// Any other status
    Fatal(u16),
}

impl Outcome {
    /// Classify an HTTP status code
    pub fn classify(status: u16) -> Self {
        match status {
            200 => Self::Success,
            429 => Self::RateLimited,
            504 => Self::UpstreamTimeout,
            other => Self::Fatal(other),
        }
    }

    /// Whether the backoff policy should sleep and try again
    pub fn is_retriable(self) -> bool {
        matches!(self, Self::RateLimited | Self::UpstreamTimeout)
    }
}

/// Status and body of a completed exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body text
    pub body: String,
}

impl RawResponse {
    /// Create a raw response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Classify this response
    pub fn outcome(&self) -> Outcome {
        Outcome::classify(self.status)
    }
}

/// One request/response cycle against the remote API
///
/// Implementations must be safe to call concurrently from every worker.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one request and return the raw status and body
    async fn send(&self, method: Method, endpoint: &str, body: Option<&Value>)
        -> Result<RawResponse>;
}

/// `reqwest`-backed transport
pub struct ReqwestTransport {
    client: Client,
    base_url: Option<String>,
    headers: HashMap<String, String>,
}

impl ReqwestTransport {
    /// Build a transport with the given timeout and user agent
    pub fn new(
        base_url: Option<String>,
        headers: HashMap<String, String>,
        timeout: Duration,
        user_agent: &str,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url,
            headers,
        })
    }

    /// Build full URL from path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }

        match &self.base_url {
            Some(base) => {
                let base = base.trim_end_matches('/');
                let path = path.trim_start_matches('/');
                format!("{base}/{path}")
            }
            None => path.to_string(),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse> {
        let url = self.build_url(endpoint);
        let mut req = self.client.request(method.into(), &url);

        for (key, value) in &self.headers {
            req = req.header(key.as_str(), value.as_str());
        }

        if let Some(body) = body {
            req = req.json(body);
        }

        let response = req.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        debug!("{method} {url} -> {status}");

        Ok(RawResponse::new(status, text))
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // header values carry the auth token
        f.debug_struct("ReqwestTransport")
            .field("base_url", &self.base_url)
            .field("header_names", &self.headers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Check that a configured host parses as an absolute URL
pub(crate) fn validate_base_url(base_url: &str) -> Result<()> {
    url::Url::parse(base_url).map(|_| ()).map_err(Error::from)
}
