//! Quota metrics endpoint

use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::quota::{QuotaMetrics, QuotaSource};
use crate::types::Method;
use async_trait::async_trait;
use serde_json::Value;

/// Default metrics endpoint path
pub const DEFAULT_METRICS_ENDPOINT: &str = "/api/integration/ext/v1/metrics";

/// `QuotaSource` that polls the metrics endpoint
#[derive(Debug, Clone)]
pub struct MetricsSource {
    client: HttpClient,
    endpoint: String,
}

impl MetricsSource {
    /// Poll `endpoint` through `client`
    pub fn new(client: HttpClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl QuotaSource for MetricsSource {
    async fn fetch_quota(&self) -> Result<QuotaMetrics> {
        let mut response: Value = self
            .client
            .execute::<Value, _>(Method::GET, &self.endpoint, None)
            .await?;

        let payload = match response.get_mut("payload") {
            Some(payload) => payload.take(),
            None => return Err(Error::decode(&self.endpoint, "response has no payload")),
        };
        serde_json::from_value(payload).map_err(|e| Error::decode(&self.endpoint, e.to_string()))
    }
}
