//! HTTP client with backoff and pacing
//!
//! `HttpClient::execute` serializes a request body once, drives the transport
//! through the backoff policy, and deserializes a 200 body into the caller's
//! response shape. It holds no mutable state and is shared across workers
//! behind an `Arc`.

use super::backoff::BackoffPolicy;
use super::rate_limit::{RateLimiter, RateLimiterConfig};
use super::transport::{validate_base_url, RawResponse, ReqwestTransport, Transport};
use crate::error::{Error, Result};
use crate::types::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

/// Default header carrying the auth token
pub const DEFAULT_AUTH_HEADER: &str = "authToken";

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL for all requests
    pub base_url: Option<String>,
    /// Auth token attached to every request
    pub token: Option<String>,
    /// Header name for the auth token
    pub auth_header: String,
    /// Request timeout
    pub timeout: Duration,
    /// Retry schedule for 429 and 504
    pub backoff: BackoffPolicy,
    /// Rate limiter configuration
    pub rate_limit: Option<RateLimiterConfig>,
    /// Default headers for all requests
    pub default_headers: HashMap<String, String>,
    /// User agent string
    pub user_agent: String,
    /// Log request and response bodies at trace level
    pub log_bodies: bool,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            token: None,
            auth_header: DEFAULT_AUTH_HEADER.to_string(),
            timeout: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
            rate_limit: None,
            default_headers: HashMap::new(),
            user_agent: format!("engage-harvest/{}", env!("CARGO_PKG_VERSION")),
            log_bodies: false,
        }
    }
}

impl HttpClientConfig {
    /// Create a new config builder
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for HTTP client config
#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Set the auth token
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.config.token = Some(token.into());
        self
    }

    /// Set the auth header name
    pub fn auth_header(mut self, name: impl Into<String>) -> Self {
        self.config.auth_header = name.into();
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the backoff policy
    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.config.backoff = backoff;
        self
    }

    /// Set rate limiter
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Disable rate limiting
    pub fn no_rate_limit(mut self) -> Self {
        self.config.rate_limit = None;
        self
    }

    /// Add a default header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Log bodies at trace level
    pub fn log_bodies(mut self, enabled: bool) -> Self {
        self.config.log_bodies = enabled;
        self
    }

    /// Build the config
    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// HTTP client with backoff and optional pacing
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    backoff: BackoffPolicy,
    rate_limiter: Option<RateLimiter>,
    log_bodies: bool,
}

impl HttpClient {
    /// Create a `reqwest`-backed client from configuration
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        if let Some(base) = &config.base_url {
            validate_base_url(base)?;
        }

        let mut headers = config.default_headers.clone();
        if let Some(token) = &config.token {
            headers.insert(config.auth_header.clone(), token.clone());
        }

        let transport =
            ReqwestTransport::new(config.base_url.clone(), headers, config.timeout, &config.user_agent)?;

        Ok(Self {
            transport: Arc::new(transport),
            backoff: config.backoff,
            rate_limiter: config.rate_limit.as_ref().map(RateLimiter::new),
            log_bodies: config.log_bodies,
        })
    }

    /// Create a client over any transport
    pub fn with_transport(transport: Arc<dyn Transport>, backoff: BackoffPolicy) -> Self {
        Self {
            transport,
            backoff,
            rate_limiter: None,
            log_bodies: false,
        }
    }

    /// Pace every attempt through a client-side limiter
    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Enable or disable body logging
    #[must_use]
    pub fn with_body_logging(mut self, enabled: bool) -> Self {
        self.log_bodies = enabled;
        self
    }

    /// The active backoff policy
    pub fn backoff(&self) -> &BackoffPolicy {
        &self.backoff
    }

    /// Check if rate limiting is enabled
    pub fn has_rate_limiter(&self) -> bool {
        self.rate_limiter.is_some()
    }

    /// Execute a request and deserialize the 200 body
    pub async fn execute<Req, Resp>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Req>,
    ) -> Result<Resp>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        let body = body.map(serde_json::to_value).transpose()?;
        let response = self.execute_raw(method, endpoint, body.as_ref()).await?;
        serde_json::from_str(&response.body).map_err(|e| Error::decode(endpoint, e.to_string()))
    }

    /// Execute a request and return the raw 200 response
    pub async fn execute_raw(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
    ) -> Result<RawResponse> {
        if self.log_bodies {
            if let Some(body) = body {
                trace!(target: "engage_harvest::bodies", %method, endpoint, request = %body);
            }
        }

        let response = self
            .backoff
            .run(endpoint, move |_| async move {
                if let Some(limiter) = &self.rate_limiter {
                    limiter.wait().await;
                }
                self.transport.send(method, endpoint, body).await
            })
            .await?;

        if self.log_bodies {
            trace!(target: "engage_harvest::bodies", %method, endpoint, response = %response.body);
        }

        Ok(response)
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("backoff", &self.backoff)
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .field("log_bodies", &self.log_bodies)
            .finish_non_exhaustive()
    }
}
