//! Paginated JSON collection guide

use super::types::{field_at, CollectionConfig, JsonRecord, RecordFilterConfig};
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::pagination::{PageRequest, PageResult, PageSource};
use crate::pipeline::Guide;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

/// Guide over a search endpoint shaped
/// `{payload: {offset, count, total, <records_key>: [...]}}`
#[derive(Debug, Clone)]
pub struct CollectionGuide {
    client: HttpClient,
    config: CollectionConfig,
    filter: Option<RecordFilterConfig>,
}

impl CollectionGuide {
    /// Create a guide over `config.endpoint`
    pub fn new(client: HttpClient, config: CollectionConfig) -> Self {
        Self {
            client,
            config,
            filter: None,
        }
    }

    /// Keep only records matching `filter`
    #[must_use]
    pub fn with_filter(mut self, filter: Option<RecordFilterConfig>) -> Self {
        self.filter = filter;
        self
    }

    /// Collection settings
    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Request body for one page; criteria keys are merged into `payload`
    pub fn request_body(request: &PageRequest) -> Value {
        let mut payload = match &request.criteria {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        payload.insert("offset".to_string(), json!(request.offset));
        payload.insert("count".to_string(), json!(request.page_size));
        json!({ "payload": payload })
    }

    fn parse_page(&self, response: Value) -> Result<PageResult<Value>> {
        let endpoint = &self.config.endpoint;
        let mut payload = match response {
            Value::Object(mut map) => match map.remove("payload") {
                Some(Value::Object(payload)) => payload,
                _ => return Err(Error::decode(endpoint, "response has no payload object")),
            },
            _ => return Err(Error::decode(endpoint, "response is not a JSON object")),
        };

        let total = payload
            .get("total")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::decode(endpoint, "payload.total missing or not a count"))?;

        let records = match payload.remove(&self.config.records_key) {
            Some(Value::Array(records)) => records,
            None | Some(Value::Null) => Vec::new(),
            Some(_) => {
                return Err(Error::decode(
                    endpoint,
                    format!("payload.{} is not an array", self.config.records_key),
                ))
            }
        };

        Ok(PageResult::new(records, total))
    }
}

#[async_trait]
impl PageSource for CollectionGuide {
    type Record = Value;

    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult<Value>> {
        let body = Self::request_body(request);
        let response: Value = self
            .client
            .execute(self.config.method, &self.config.endpoint, Some(&body))
            .await?;

        let page = self.parse_page(response)?;
        debug!(
            "Page at {} returned {} of {} total",
            request.offset, page.returned_count, page.total_count
        );
        Ok(page)
    }
}

impl Guide for CollectionGuide {
    type Output = JsonRecord;

    fn filter(&self, record: &Value) -> bool {
        self.filter.as_ref().map_or(true, |f| f.matches(record))
    }

    fn transform(&self, record: Value) -> JsonRecord {
        JsonRecord::new(record, &self.config.id_field)
    }
}

/// Read a string field of a result item, accepting numbers too
pub(crate) fn item_field(item: &Value, path: &str) -> Option<String> {
    field_at(item, path)
        .filter(|v| !v.is_null())
        .map(super::types::scalar_to_string)
}
