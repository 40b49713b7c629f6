//! Tests for the pipeline module

use super::*;
use crate::error::Error;
use crate::pagination::{PageRequest, PageResult, PageSource};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Test Collection
// ============================================================================

#[derive(Clone, Copy)]
enum Failure {
    Fatal,
    Exhausted,
}

/// In-memory collection of ids `0..len`
struct MemoryCollection {
    len: u64,
    reported_total: u64,
    failures: HashMap<u64, Failure>,
    delays: HashMap<u64, Duration>,
    fetched: Mutex<Vec<u64>>,
    probes: AtomicUsize,
}

impl MemoryCollection {
    fn new(len: u64) -> Self {
        Self {
            len,
            reported_total: len,
            failures: HashMap::new(),
            delays: HashMap::new(),
            fetched: Mutex::new(Vec::new()),
            probes: AtomicUsize::new(0),
        }
    }

    fn reporting_total(mut self, total: u64) -> Self {
        self.reported_total = total;
        self
    }

    fn failing_at(mut self, offset: u64, failure: Failure) -> Self {
        self.failures.insert(offset, failure);
        self
    }

    fn slow_at(mut self, offset: u64, delay: Duration) -> Self {
        self.delays.insert(offset, delay);
        self
    }

    fn fetched_offsets(&self) -> Vec<u64> {
        let mut offsets = self.fetched.lock().unwrap().clone();
        offsets.sort_unstable();
        offsets
    }
}

#[async_trait]
impl PageSource for MemoryCollection {
    type Record = u64;

    async fn fetch_page(&self, request: &PageRequest) -> crate::Result<PageResult<u64>> {
        if request.is_probe() {
            self.probes.fetch_add(1, Ordering::SeqCst);
            return Ok(PageResult::empty(self.reported_total));
        }

        if let Some(delay) = self.delays.get(&request.offset) {
            tokio::time::sleep(*delay).await;
        }

        match self.failures.get(&request.offset) {
            Some(Failure::Fatal) => {
                return Err(Error::http_status(403, "/api/supporters/search", "Forbidden"));
            }
            Some(Failure::Exhausted) => {
                return Err(Error::RetriesExhausted {
                    endpoint: "/api/supporters/search".to_string(),
                    status: 429,
                    attempts: 5,
                });
            }
            None => {}
        }

        self.fetched.lock().unwrap().push(request.offset);
        let end = (request.offset + u64::from(request.page_size)).min(self.len);
        let records: Vec<u64> = (request.offset.min(end)..end).collect();
        Ok(PageResult::new(records, self.reported_total))
    }
}

/// Keeps even ids and renders them as strings
struct EvensAsText(MemoryCollection);

#[async_trait]
impl PageSource for EvensAsText {
    type Record = u64;

    async fn fetch_page(&self, request: &PageRequest) -> crate::Result<PageResult<u64>> {
        self.0.fetch_page(request).await
    }
}

impl Guide for EvensAsText {
    type Output = String;

    fn filter(&self, record: &u64) -> bool {
        record % 2 == 0
    }

    fn transform(&self, record: u64) -> String {
        format!("id-{record}")
    }
}

fn config(workers: usize, page_size: u32) -> PipelineConfig {
    PipelineConfig::new()
        .with_workers(workers)
        .with_page_size(page_size)
}

async fn within_deadline<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), future)
        .await
        .expect("pipeline hung")
}

// ============================================================================
// Pipeline Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_end_to_end_250_records_three_workers() {
    let source = Arc::new(Passthrough(MemoryCollection::new(250)));
    let pipeline = Pipeline::from_arc(Arc::clone(&source), config(3, 100));
    let mut sink = VecSink::new();

    let report = within_deadline(pipeline.run(&mut sink)).await.unwrap();

    assert_eq!(source.0.fetched_offsets(), vec![0, 100, 200]);
    assert_eq!(source.0.probes.load(Ordering::SeqCst), 1);
    assert_eq!(report.total_count, 250);
    assert_eq!(report.offsets_planned, 3);
    assert_eq!(report.offsets_fed, 3);
    assert_eq!(report.pages_fetched, 3);
    assert_eq!(report.records_delivered, 250);
    assert_eq!(report.workers_terminated, 3);

    let records = sink.into_records();
    assert_eq!(records.len(), 250);
    let unique: HashSet<u64> = records.iter().copied().collect();
    assert_eq!(unique.len(), 250);

    // within one page, server order is preserved
    for page_start in [0_u64, 100, 200] {
        let page: Vec<u64> = records
            .iter()
            .copied()
            .filter(|r| (page_start..page_start + 100).contains(r))
            .collect();
        assert!(page.windows(2).all(|w| w[0] < w[1]));
    }
}

#[tokio::test]
async fn test_empty_collection_completes_immediately() {
    let source = Arc::new(Passthrough(MemoryCollection::new(0)));
    let pipeline = Pipeline::from_arc(Arc::clone(&source), config(4, 100));
    let mut sink = VecSink::new();

    let report = within_deadline(pipeline.run(&mut sink)).await.unwrap();

    assert_eq!(report.offsets_planned, 0);
    assert_eq!(report.pages_fetched, 0);
    assert_eq!(report.workers_terminated, 4);
    assert!(sink.records.is_empty());
    assert!(source.0.fetched_offsets().is_empty());
}

#[tokio::test]
async fn test_filter_and_transform_applied() {
    let pipeline = Pipeline::new(EvensAsText(MemoryCollection::new(10)), config(2, 3));
    let mut sink = VecSink::new();

    let report = within_deadline(pipeline.run(&mut sink)).await.unwrap();

    let mut records = sink.into_records();
    records.sort();
    assert_eq!(records, vec!["id-0", "id-2", "id-4", "id-6", "id-8"]);
    assert_eq!(report.records_seen, 10);
    assert_eq!(report.records_delivered, 5);
}

#[tokio::test]
async fn test_resume_from_start_offset() {
    let source = Arc::new(Passthrough(MemoryCollection::new(250)));
    let pipeline = Pipeline::from_arc(
        Arc::clone(&source),
        config(2, 100).with_start_offset(100),
    );
    let mut sink = VecSink::new();

    let report = within_deadline(pipeline.run(&mut sink)).await.unwrap();

    assert_eq!(source.0.fetched_offsets(), vec![100, 200]);
    assert_eq!(report.records_delivered, 150);
    assert!(sink.records.iter().all(|r| *r >= 100));
}

#[tokio::test]
async fn test_shrunken_collection_empty_pages_are_not_errors() {
    let source = MemoryCollection::new(250).reporting_total(1000);
    let pipeline = Pipeline::new(Passthrough(source), config(1, 100));
    let mut sink = VecSink::new();

    let report = within_deadline(pipeline.run(&mut sink)).await.unwrap();

    assert_eq!(report.records_delivered, 250);
    assert_eq!(report.offsets_planned, 10);
    // one worker: the first empty page marks the end, later offsets are not fetched
    assert_eq!(report.pages_fetched, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fatal_error_cancels_siblings_and_surfaces() {
    let source = MemoryCollection::new(10_000)
        .failing_at(300, Failure::Fatal)
        .slow_at(0, Duration::from_millis(50));
    let pipeline = Pipeline::new(Passthrough(source), config(3, 100));
    let mut sink = VecSink::new();

    let err = within_deadline(pipeline.run(&mut sink)).await.unwrap_err();

    match err {
        Error::HttpStatus {
            status, endpoint, ..
        } => {
            assert_eq!(status, 403);
            assert_eq!(endpoint, "/api/supporters/search");
        }
        other => panic!("expected HttpStatus, got {other:?}"),
    }
    assert!(sink.records.len() < 10_000);
}

#[tokio::test]
async fn test_skip_failed_pages_records_offsets_and_continues() {
    let source = MemoryCollection::new(250).failing_at(100, Failure::Exhausted);
    let pipeline = Pipeline::new(
        Passthrough(source),
        config(2, 100).with_skip_failed_pages(true),
    );
    let mut sink = VecSink::new();

    let report = within_deadline(pipeline.run(&mut sink)).await.unwrap();

    assert_eq!(report.skipped_offsets, vec![100]);
    assert_eq!(report.records_delivered, 150);
}

#[tokio::test]
async fn test_exhausted_retries_fail_run_by_default() {
    let source = MemoryCollection::new(250).failing_at(100, Failure::Exhausted);
    let pipeline = Pipeline::new(Passthrough(source), config(2, 100));
    let mut sink = VecSink::new();

    let err = within_deadline(pipeline.run(&mut sink)).await.unwrap_err();
    assert!(err.is_retries_exhausted());
}

#[tokio::test]
async fn test_external_cancellation() {
    let token = CancellationToken::new();
    token.cancel();
    let pipeline = Pipeline::new(Passthrough(MemoryCollection::new(100)), config(2, 10))
        .with_cancellation(token);
    let mut sink = VecSink::new();

    let err = within_deadline(pipeline.run(&mut sink)).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

/// Sink whose first `consume` never completes
struct StalledSink {
    finished: bool,
}

#[async_trait]
impl RecordSink<u64> for StalledSink {
    async fn consume(&mut self, _record: u64) -> crate::Result<()> {
        std::future::pending().await
    }

    async fn finish(&mut self) -> crate::Result<()> {
        self.finished = true;
        Ok(())
    }
}

#[tokio::test]
async fn test_cancellation_interrupts_stalled_sink() {
    let token = CancellationToken::new();
    let pipeline = Pipeline::new(Passthrough(MemoryCollection::new(100)), config(2, 10))
        .with_cancellation(token.clone());
    let mut sink = StalledSink { finished: false };

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        token.cancel();
    });

    let err = within_deadline(pipeline.run(&mut sink)).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
    assert!(!sink.finished);
}

struct FailingSink {
    accepted: usize,
}

#[async_trait]
impl RecordSink<u64> for FailingSink {
    async fn consume(&mut self, _record: u64) -> crate::Result<()> {
        if self.accepted == 5 {
            return Err(Error::sink("disk full"));
        }
        self.accepted += 1;
        Ok(())
    }
}

#[tokio::test]
async fn test_sink_error_stops_run() {
    let pipeline = Pipeline::new(
        Passthrough(MemoryCollection::new(10_000)),
        config(3, 100).with_queue_capacity(8),
    );
    let mut sink = FailingSink { accepted: 0 };

    let err = within_deadline(pipeline.run(&mut sink)).await.unwrap_err();
    assert!(matches!(err, Error::Sink { .. }));
    assert_eq!(sink.accepted, 5);
}

#[tokio::test]
async fn test_count_only_probes() {
    let source = Arc::new(Passthrough(MemoryCollection::new(42)));
    let pipeline = Pipeline::from_arc(Arc::clone(&source), config(1, 10));

    assert_eq!(pipeline.count().await.unwrap(), 42);
    assert!(source.0.fetched_offsets().is_empty());
}

#[tokio::test]
async fn test_invalid_config_rejected_before_probe() {
    let source = Arc::new(Passthrough(MemoryCollection::new(42)));
    let pipeline = Pipeline::from_arc(Arc::clone(&source), config(0, 10));
    let mut sink = VecSink::new();

    let err = pipeline.run(&mut sink).await.unwrap_err();
    assert!(matches!(err, Error::InvalidConfigValue { ref field, .. } if field == "workers"));
    assert_eq!(source.0.probes.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_pipeline_config_default() {
    let config = PipelineConfig::default();
    assert_eq!(config.workers, 3);
    assert_eq!(config.page_size, 20);
    assert_eq!(config.start_offset, 0);
    assert!(!config.skip_failed_pages);
    assert!(config.validate().is_ok());
}

#[test]
fn test_pipeline_config_validation() {
    assert!(PipelineConfig::new().with_page_size(0).validate().is_err());
    assert!(PipelineConfig::new().with_queue_capacity(0).validate().is_err());
    assert!(PipelineConfig::new()
        .with_criteria(json!({"x": 1}))
        .with_workers(5)
        .validate()
        .is_ok());
}

// ============================================================================
// Completion Barrier Tests
// ============================================================================

#[tokio::test]
async fn test_barrier_closes_after_expected_signals() {
    let (mut barrier, mut rx) = CompletionBarrier::<u32>::new(4);
    let a = barrier.handle();
    let b = barrier.handle();
    assert_eq!(barrier.issued(), 2);

    let task = tokio::spawn(barrier.await_all(2));

    a.send(1).await.unwrap();
    a.finish();
    b.send(2).await.unwrap();
    drop(b);

    assert_eq!(rx.recv().await, Some(1));
    assert_eq!(rx.recv().await, Some(2));
    assert_eq!(rx.recv().await, None);
    assert_eq!(task.await.unwrap(), 2);
}

#[tokio::test]
async fn test_barrier_holds_queue_open_until_last_signal() {
    let (mut barrier, mut rx) = CompletionBarrier::<u32>::new(4);
    let a = barrier.handle();
    let b = barrier.handle();
    let mut wait = tokio_test::task::spawn(barrier.await_all(2));

    tokio_test::assert_pending!(wait.poll());
    drop(a);
    tokio_test::assert_pending!(wait.poll());

    b.send(9).await.unwrap();
    drop(b);
    tokio_test::assert_ready_eq!(wait.poll(), 2);

    assert_eq!(rx.recv().await, Some(9));
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn test_barrier_counts_panicked_worker() {
    let (mut barrier, mut rx) = CompletionBarrier::<u32>::new(1);
    let handle = barrier.handle();
    let task = tokio::spawn(barrier.await_all(1));

    let worker = tokio::spawn(async move {
        handle.send(7).await.unwrap();
        panic!("worker blew up");
    });

    assert_eq!(rx.recv().await, Some(7));
    assert!(worker.await.is_err());
    assert_eq!(rx.recv().await, None);
    assert_eq!(task.await.unwrap(), 1);
}

#[tokio::test]
async fn test_barrier_does_not_hang_when_expecting_too_many() {
    let (mut barrier, mut rx) = CompletionBarrier::<u32>::new(1);
    drop(barrier.handle());

    let counted = within_deadline(barrier.await_all(3)).await;
    assert_eq!(counted, 1);
    assert_eq!(rx.recv().await, None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_barrier_no_send_after_close_randomized() {
    let mut rng = StdRng::seed_from_u64(0x5eed);

    for _ in 0..25 {
        let workers = rng.gen_range(1..=8);
        let plans: Vec<Vec<u32>> = (0..workers)
            .map(|_| {
                let sends = rng.gen_range(0..20);
                (0..sends).map(|_| rng.gen_range(0..4)).collect()
            })
            .collect();
        let expected_total: usize = plans.iter().map(Vec::len).sum();

        let (mut barrier, mut rx) = CompletionBarrier::new(rng.gen_range(1..4));
        let completed_sends = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = plans
            .into_iter()
            .map(|plan| {
                let handle = barrier.handle();
                let completed_sends = Arc::clone(&completed_sends);
                tokio::spawn(async move {
                    for yields in plan {
                        for _ in 0..yields {
                            tokio::task::yield_now().await;
                        }
                        handle.send(yields).await.unwrap();
                        completed_sends.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        let barrier_task = tokio::spawn(barrier.await_all(workers));

        let mut received = 0;
        while rx.recv().await.is_some() {
            received += 1;
        }

        // the queue reported closed, so every send has already completed
        assert_eq!(completed_sends.load(Ordering::SeqCst), expected_total);
        assert_eq!(received, expected_total);
        assert_eq!(barrier_task.await.unwrap(), workers);
        for task in tasks {
            task.await.unwrap();
        }
    }
}

// ============================================================================
// Sink Tests
// ============================================================================

#[tokio::test]
async fn test_count_by_sink_groups_records() {
    let mut sink = CountBySink::new(|r: &Value| r["status"].as_str().unwrap_or("?").to_string());

    for status in ["active", "active", "unsubscribed"] {
        sink.consume(json!({"status": status})).await.unwrap();
    }
    sink.consume(json!({})).await.unwrap();

    assert_eq!(sink.counts().get("active"), Some(&2));
    assert_eq!(sink.counts().get("unsubscribed"), Some(&1));
    assert_eq!(sink.counts().get("?"), Some(&1));
    assert_eq!(sink.total(), 4);
}

#[tokio::test]
async fn test_json_lines_sink_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.jsonl");

    let mut sink = JsonLinesSink::create(&path).unwrap();
    sink.consume(json!({"id": 1})).await.unwrap();
    sink.consume(json!({"id": 2})).await.unwrap();
    RecordSink::<Value>::finish(&mut sink).await.unwrap();
    assert_eq!(sink.written(), 2);
    drop(sink);

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents, "{\"id\":1}\n{\"id\":2}\n");
}
