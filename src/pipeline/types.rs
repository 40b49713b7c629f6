//! Pipeline types
//!
//! The `Guide` capability set, run configuration, and run statistics.

use crate::error::{Error, Result};
use crate::pagination::{PageRequest, PageResult, PageSource};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

/// Per-entity behaviour plugged into the generic pipeline
///
/// `fetch_page` comes from [`PageSource`]. Records that pass `filter` are
/// handed to `transform` in server order and the result goes to the sink.
pub trait Guide: PageSource {
    /// What the sink receives
    type Output: Send + 'static;

    /// Keep this record?
    fn filter(&self, _record: &Self::Record) -> bool {
        true
    }

    /// Turn a kept record into sink output
    fn transform(&self, record: Self::Record) -> Self::Output;
}

/// Guide that forwards every record unchanged
#[derive(Debug, Clone)]
pub struct Passthrough<S>(pub S);

#[async_trait]
impl<S: PageSource> PageSource for Passthrough<S> {
    type Record = S::Record;

    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult<Self::Record>> {
        self.0.fetch_page(request).await
    }
}

impl<S: PageSource> Guide for Passthrough<S> {
    type Output = S::Record;

    fn transform(&self, record: Self::Record) -> Self::Output {
        record
    }
}

/// Unit signal a worker emits exactly once when it stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerTermination;

/// Configuration for a pipeline run
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Concurrent workers
    pub workers: usize,
    /// Records per page
    pub page_size: u32,
    /// First offset to visit (resume point)
    pub start_offset: u64,
    /// Output queue capacity; the only backpressure in the pipeline
    pub queue_capacity: usize,
    /// Offset queue capacity
    pub offset_capacity: usize,
    /// Opaque filter forwarded with every page request
    pub criteria: Value,
    /// Skip a page whose retries were exhausted instead of failing the run
    pub skip_failed_pages: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            page_size: 20,
            start_offset: 0,
            queue_capacity: 1000,
            offset_capacity: 16,
            criteria: Value::Null,
            skip_failed_pages: false,
        }
    }
}

impl PipelineConfig {
    /// Create a new pipeline config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set worker count
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set page size
    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the resume offset
    #[must_use]
    pub fn with_start_offset(mut self, offset: u64) -> Self {
        self.start_offset = offset;
        self
    }

    /// Set output queue capacity
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Set filter criteria
    #[must_use]
    pub fn with_criteria(mut self, criteria: Value) -> Self {
        self.criteria = criteria;
        self
    }

    /// Skip pages whose retries were exhausted
    #[must_use]
    pub fn with_skip_failed_pages(mut self, skip: bool) -> Self {
        self.skip_failed_pages = skip;
        self
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::invalid_value("workers", "must be at least 1"));
        }
        if self.page_size == 0 {
            return Err(Error::invalid_value("page_size", "must be greater than zero"));
        }
        if self.queue_capacity == 0 {
            return Err(Error::invalid_value("queue_capacity", "must be greater than zero"));
        }
        if self.offset_capacity == 0 {
            return Err(Error::invalid_value("offset_capacity", "must be greater than zero"));
        }
        Ok(())
    }
}

/// What one worker did before it stopped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    /// Pages fetched
    pub pages_fetched: usize,
    /// Records returned by the server
    pub records_seen: usize,
    /// Records forwarded to the output queue
    pub records_delivered: usize,
    /// Offsets skipped after exhausted retries
    pub skipped_offsets: Vec<u64>,
}

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Total reported by the probe
    pub total_count: u64,
    /// Offsets the generator planned
    pub offsets_planned: usize,
    /// Offsets actually fed to workers
    pub offsets_fed: usize,
    /// Pages fetched across all workers
    pub pages_fetched: usize,
    /// Records returned by the server
    pub records_seen: usize,
    /// Records delivered to the sink
    pub records_delivered: usize,
    /// Termination signals the barrier counted
    pub workers_terminated: usize,
    /// Offsets skipped after exhausted retries, ascending
    pub skipped_offsets: Vec<u64>,
    /// Wall-clock duration
    pub duration: Duration,
}

impl RunReport {
    /// Fold one worker's summary into the report
    pub fn absorb(&mut self, summary: WorkerSummary) {
        self.pages_fetched += summary.pages_fetched;
        self.records_seen += summary.records_seen;
        self.records_delivered += summary.records_delivered;
        self.skipped_offsets.extend(summary.skipped_offsets);
    }
}
