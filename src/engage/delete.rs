//! Bulk delete endpoint

use super::collection::item_field;
use super::types::CollectionConfig;
use crate::error::{Error, Result};
use crate::http::HttpClient;
use crate::mutation::{ItemCode, ItemResult, Mutator};
use crate::types::Method;
use async_trait::async_trait;
use serde_json::{json, Value};

/// `Mutator` that deletes records by id
///
/// Sends `{payload: {<records_key>: [{<id_field>: id}, ...]}}` and reads a
/// `result` per item back from the same shape.
#[derive(Debug, Clone)]
pub struct DeleteMutator {
    client: HttpClient,
    endpoint: String,
    records_key: String,
    id_field: String,
}

impl DeleteMutator {
    /// Delete through `endpoint`, using the collection's keys
    pub fn new(client: HttpClient, endpoint: impl Into<String>, collection: &CollectionConfig) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            records_key: collection.records_key.clone(),
            id_field: collection.id_field.clone(),
        }
    }

    /// Request body for a batch
    pub fn request_body(&self, ids: &[String]) -> Value {
        let items: Vec<Value> = ids
            .iter()
            .map(|id| {
                let mut item = serde_json::Map::new();
                item.insert(self.id_field.clone(), json!(id));
                Value::Object(item)
            })
            .collect();

        let mut payload = serde_json::Map::new();
        payload.insert(self.records_key.clone(), Value::Array(items));
        json!({ "payload": payload })
    }

    fn parse_results(&self, response: &Value) -> Result<Vec<ItemResult>> {
        let items = response
            .get("payload")
            .and_then(|p| p.get(&self.records_key))
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::decode(
                    &self.endpoint,
                    format!("payload.{} missing from delete response", self.records_key),
                )
            })?;

        Ok(items
            .iter()
            .filter_map(|item| {
                let id = item_field(item, &self.id_field)?;
                let result = item_field(item, "result").unwrap_or_default();
                Some(ItemResult::new(id, item_code(&result)))
            })
            .collect())
    }
}

/// Map the server's per-item result string
pub fn item_code(result: &str) -> ItemCode {
    match result.to_ascii_uppercase().as_str() {
        "DELETED" | "SUCCESS" => ItemCode::Applied,
        "NOT_FOUND" => ItemCode::NotFound,
        "" => ItemCode::Failed("no result reported".to_string()),
        other => ItemCode::Failed(other.to_string()),
    }
}

#[async_trait]
impl Mutator for DeleteMutator {
    async fn apply(&self, ids: &[String]) -> Result<Vec<ItemResult>> {
        let body = self.request_body(ids);
        let response: Value = self
            .client
            .execute(Method::DELETE, &self.endpoint, Some(&body))
            .await?;
        self.parse_results(&response)
    }
}
