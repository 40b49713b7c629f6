//! Offset generation and feeding

use super::types::{PageRequest, PageSource};
use crate::error::{Error, Result};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Offsets `start, start + page, start + 2 * page, ...` strictly below the total
///
/// Resuming a partial run is caller-driven: pass the offset to resume from
/// as `start_offset`. Nothing about visited offsets is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetGenerator {
    next: u64,
    total_count: u64,
    page_size: u32,
}

impl OffsetGenerator {
    /// Create a generator. A zero page size is rejected.
    pub fn new(total_count: u64, page_size: u32, start_offset: u64) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::invalid_value("page_size", "must be greater than zero"));
        }

        Ok(Self {
            next: start_offset,
            total_count,
            page_size,
        })
    }

    /// Page size every emitted request carries
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Push one `PageRequest` per remaining offset into `tx`
    ///
    /// Stops early when `cancel` fires or every receiver is gone. The sender
    /// is dropped on return, which is how workers learn there is no more work.
    /// Returns the number of requests delivered.
    pub async fn feed(
        self,
        tx: mpsc::Sender<PageRequest>,
        criteria: Value,
        cancel: CancellationToken,
    ) -> usize {
        let page_size = self.page_size;
        let mut fed = 0;

        for offset in self {
            let request = PageRequest::new(offset, page_size, criteria.clone());
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("Offset feed cancelled after {fed} offsets");
                    break;
                }
                sent = tx.send(request) => {
                    if sent.is_err() {
                        debug!("Offset queue closed after {fed} offsets");
                        break;
                    }
                    fed += 1;
                }
            }
        }

        fed
    }
}

impl Iterator for OffsetGenerator {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.next >= self.total_count {
            return None;
        }
        let offset = self.next;
        self.next = self.next.saturating_add(u64::from(self.page_size));
        Some(offset)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total_count.saturating_sub(self.next);
        let n = remaining.div_ceil(u64::from(self.page_size)) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for OffsetGenerator {}

/// Read the collection total with one zero-count request
pub async fn probe_total<S>(source: &S, criteria: &Value) -> Result<u64>
where
    S: PageSource + ?Sized,
{
    let page = source.fetch_page(&PageRequest::probe(criteria.clone())).await?;
    debug!("Probe reported total of {}", page.total_count);
    Ok(page.total_count)
}
