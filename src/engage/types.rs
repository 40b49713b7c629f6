//! Engage collaborator types

use crate::mutation::Identified;
use crate::types::Method;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Paginated collection endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Search endpoint path
    pub endpoint: String,

    /// Method the search endpoint expects
    #[serde(default = "default_collection_method")]
    pub method: Method,

    /// Key of the record array inside `payload`
    #[serde(default = "default_records_key")]
    pub records_key: String,

    /// Dotted path of each record's identifier
    #[serde(default = "default_id_field")]
    pub id_field: String,
}

fn default_collection_method() -> Method {
    Method::POST
}

fn default_records_key() -> String {
    "supporters".to_string()
}

fn default_id_field() -> String {
    "supporterId".to_string()
}

impl CollectionConfig {
    /// Collection at `endpoint` with default keys
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: default_collection_method(),
            records_key: default_records_key(),
            id_field: default_id_field(),
        }
    }

    /// Set the record array key
    #[must_use]
    pub fn with_records_key(mut self, key: impl Into<String>) -> Self {
        self.records_key = key.into();
        self
    }

    /// Set the identifier path
    #[must_use]
    pub fn with_id_field(mut self, field: impl Into<String>) -> Self {
        self.id_field = field.into();
        self
    }
}

/// Keep only records whose `field` equals `equals`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordFilterConfig {
    /// Dotted path into the record
    pub field: String,
    /// Value the field must hold
    pub equals: Value,
}

impl RecordFilterConfig {
    /// Whether `record` passes
    pub fn matches(&self, record: &Value) -> bool {
        field_at(record, &self.field) == Some(&self.equals)
    }
}

/// A harvested JSON record with its resolved identifier
///
/// Serializes as the bare record.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRecord {
    /// Identifier, empty when the record carried none
    pub id: String,
    /// Record as returned by the server
    pub body: Value,
}

impl JsonRecord {
    /// Wrap `body`, reading its id from `id_field`
    pub fn new(body: Value, id_field: &str) -> Self {
        let id = field_at(&body, id_field).map(scalar_to_string).unwrap_or_default();
        Self { id, body }
    }
}

impl Identified for JsonRecord {
    fn id(&self) -> String {
        self.id.clone()
    }
}

impl Serialize for JsonRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.body.serialize(serializer)
    }
}

/// Look up a dotted path (`a.b.c`) inside a JSON value
pub fn field_at<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Render a scalar as a plain string; objects and arrays become JSON text
pub(crate) fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
