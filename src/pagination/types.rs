//! Pagination types and traits

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// One page to fetch
///
/// Produced by the offset generator and consumed by exactly one worker.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    /// Zero-based index of the first record
    pub offset: u64,
    /// Records requested; zero only for the total probe
    pub page_size: u32,
    /// Opaque filter forwarded to the endpoint
    pub criteria: Value,
}

impl PageRequest {
    /// Create a page request
    pub fn new(offset: u64, page_size: u32, criteria: Value) -> Self {
        Self {
            offset,
            page_size,
            criteria,
        }
    }

    /// Zero-count request whose only purpose is reading the total
    pub fn probe(criteria: Value) -> Self {
        Self::new(0, 0, criteria)
    }

    /// Whether this is the total probe
    pub fn is_probe(&self) -> bool {
        self.page_size == 0
    }
}

/// One fetched page
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult<T> {
    /// Records in server order
    pub records: Vec<T>,
    /// Number of records the server returned
    pub returned_count: usize,
    /// Collection total as reported with this page
    pub total_count: u64,
}

impl<T> PageResult<T> {
    /// Create a page from its records and the reported total
    pub fn new(records: Vec<T>, total_count: u64) -> Self {
        Self {
            returned_count: records.len(),
            records,
            total_count,
        }
    }

    /// Empty page reporting only a total
    pub fn empty(total_count: u64) -> Self {
        Self::new(Vec::new(), total_count)
    }

    /// An empty page means the collection ended before this offset
    pub fn is_empty(&self) -> bool {
        self.returned_count == 0
    }

    /// Fewer records than requested
    pub fn is_short(&self, page_size: u32) -> bool {
        self.returned_count < page_size as usize
    }
}

/// A remote collection that can be read one page at a time
#[async_trait]
pub trait PageSource: Send + Sync + 'static {
    /// Record type the endpoint returns
    type Record: Send + 'static;

    /// Fetch one page
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult<Self::Record>>;
}
