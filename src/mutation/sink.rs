//! Throttled batch mutating sink

use super::types::{Identified, ItemCode, MutationReport, Mutator};
use crate::error::{Error, Result};
use crate::pipeline::RecordSink;
use crate::quota::RateGovernor;
use async_trait::async_trait;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sink that mutates harvested records in governed batches
///
/// Records are deduplicated by id and held until the harvest finishes.
/// Mutating while workers still page through the collection would shift
/// unread records below offsets already visited, so nothing is sent before
/// [`RecordSink::finish`]. Batches are then cut at the batch size (capped by
/// the server's reported maximum) and sent only after the governor grants
/// budget. Per-item outcomes are tallied, never retried.
pub struct MutationSink<M> {
    mutator: M,
    governor: RateGovernor,
    batch_size: u32,
    dry_run: bool,
    cancel: CancellationToken,
    limits_known: bool,
    buffer: Vec<String>,
    seen: HashSet<String>,
    report: MutationReport,
}

impl<M: Mutator> MutationSink<M> {
    /// Create a sink. `batch_size` is raised to at least one.
    pub fn new(mutator: M, governor: RateGovernor, batch_size: u32) -> Self {
        Self {
            mutator,
            governor,
            batch_size: batch_size.max(1),
            dry_run: false,
            cancel: CancellationToken::new(),
            limits_known: false,
            buffer: Vec::new(),
            seen: HashSet::new(),
            report: MutationReport::default(),
        }
    }

    /// Count what would be sent without calling the mutator
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Stop sending batches once `token` is cancelled
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Ids waiting to be sent
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Report so far
    pub fn report(&self) -> &MutationReport {
        &self.report
    }

    /// Take the report
    pub fn into_report(self) -> MutationReport {
        self.report
    }

    /// Send everything buffered
    ///
    /// Ids of batches not sent because of cancellation stay buffered.
    pub async fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        if self.dry_run {
            self.report.dry_run_items += self.buffer.len();
            self.buffer.clear();
            return Ok(());
        }

        if !self.limits_known {
            self.governor.refresh().await?;
            self.limits_known = true;
        }

        while !self.buffer.is_empty() {
            let cap = self
                .governor
                .max_batch_size()
                .await
                .map_or(self.batch_size, |max| self.batch_size.min(max.max(1)));
            let n = (cap as usize).min(self.buffer.len());
            self.apply_batch(n).await?;
        }

        Ok(())
    }

    /// Send the first `n` buffered ids as one batch
    async fn apply_batch(&mut self, n: usize) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        let Some(permit) = self.governor.acquire(n as u32).await? else {
            return Ok(());
        };
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let batch: Vec<String> = self.buffer.drain(..n).collect();
        let results = match self.mutator.apply(&batch).await {
            Ok(results) => results,
            Err(e) => {
                if e.status() == Some(429) {
                    self.governor.mark_throttled();
                }
                return Err(e);
            }
        };
        self.report.batches += 1;

        let mut reported = HashSet::with_capacity(results.len());
        for result in results {
            reported.insert(result.id.clone());
            match result.code {
                ItemCode::Applied => self.report.applied += 1,
                ItemCode::NotFound => self.report.not_found += 1,
                ItemCode::Failed(ref reason) => {
                    warn!("Mutation failed for {}: {reason}", result.id);
                    self.report.failed.push(result);
                }
            }
        }
        let unreported = batch.iter().filter(|id| !reported.contains(*id)).count();
        self.report.unreported += unreported;

        debug!(
            "Batch of {} applied, {} left in window, {unreported} unreported",
            batch.len(),
            permit.remaining_after
        );
        Ok(())
    }
}

#[async_trait]
impl<T, M> RecordSink<T> for MutationSink<M>
where
    T: Identified + Send + 'static,
    M: Mutator,
{
    async fn consume(&mut self, record: T) -> Result<()> {
        let id = record.id();
        if id.is_empty() {
            return Err(Error::sink("record has no identifier"));
        }
        if !self.seen.insert(id.clone()) {
            self.report.duplicates += 1;
            return Ok(());
        }

        self.buffer.push(id);
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        info!("Harvest done, mutating {} records", self.buffer.len());
        self.flush().await?;
        info!(
            "Mutation complete: {} applied, {} not found, {} failed, {} duplicates in {} batches",
            self.report.applied,
            self.report.not_found,
            self.report.failed.len(),
            self.report.duplicates,
            self.report.batches
        );
        Ok(())
    }
}
