//! Mutation types

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A record with a stable identity
pub trait Identified {
    /// Identifier the mutating endpoint understands
    fn id(&self) -> String;
}

impl Identified for String {
    fn id(&self) -> String {
        self.clone()
    }
}

impl Identified for u64 {
    fn id(&self) -> String {
        self.to_string()
    }
}

/// Per-item outcome of a mutating call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemCode {
    /// The mutation took effect
    Applied,
    /// The server did not know this identifier
    NotFound,
    /// Rejected, with the server's reason
    Failed(String),
}

/// Result for one identifier in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    /// Identifier
    pub id: String,
    /// Outcome
    pub code: ItemCode,
}

impl ItemResult {
    /// Create an item result
    pub fn new(id: impl Into<String>, code: ItemCode) -> Self {
        Self {
            id: id.into(),
            code,
        }
    }
}

/// A batch mutating endpoint (delete, upsert)
#[async_trait]
pub trait Mutator: Send + Sync {
    /// Apply the mutation to every identifier in `ids`
    async fn apply(&self, ids: &[String]) -> Result<Vec<ItemResult>>;
}

/// Outcome of a mutating run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MutationReport {
    /// Items the server applied
    pub applied: usize,
    /// Items the server did not find
    pub not_found: usize,
    /// Items rejected, with reasons
    pub failed: Vec<ItemResult>,
    /// Items sent without a per-item result coming back
    pub unreported: usize,
    /// Records dropped because their id was already queued
    pub duplicates: usize,
    /// Mutating calls issued
    pub batches: usize,
    /// Items a dry run would have sent
    pub dry_run_items: usize,
}

impl MutationReport {
    /// Whether every item that was sent came back applied or not found
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.unreported == 0
    }
}
