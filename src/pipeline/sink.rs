//! Record sinks
//!
//! A sink is the single consumer of the output queue. Aggregates live inside
//! the sink, so only one task ever mutates them.

use crate::error::{Error, Result, ResultExt};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::io::{BufWriter, Write};

/// Consumer of pipeline output
#[async_trait]
pub trait RecordSink<T: Send + 'static>: Send {
    /// Handle one record
    async fn consume(&mut self, record: T) -> Result<()>;

    /// Called once after the output queue closed on a successful run
    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Collects every record in arrival order
#[derive(Debug)]
pub struct VecSink<T> {
    /// Records received so far
    pub records: Vec<T>,
}

impl<T> VecSink<T> {
    /// Create an empty sink
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    /// Take the collected records
    pub fn into_records(self) -> Vec<T> {
        self.records
    }
}

impl<T> Default for VecSink<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Send + 'static> RecordSink<T> for VecSink<T> {
    async fn consume(&mut self, record: T) -> Result<()> {
        self.records.push(record);
        Ok(())
    }
}

/// Writes one JSON document per line
///
/// Lines already written stay written if the run later fails.
pub struct JsonLinesSink<W: Write> {
    writer: BufWriter<W>,
    written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            written: 0,
        }
    }

    /// Lines written so far
    pub fn written(&self) -> usize {
        self.written
    }
}

impl JsonLinesSink<std::fs::File> {
    /// Create (truncating) a file sink
    pub fn create(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create output file '{}'", path.display()))?;
        Ok(Self::new(file))
    }
}

#[async_trait]
impl<T, W> RecordSink<T> for JsonLinesSink<W>
where
    T: Serialize + Send + 'static,
    W: Write + Send,
{
    async fn consume(&mut self, record: T) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.writer
            .flush()
            .map_err(|e| Error::sink(format!("Failed to flush output: {e}")))
    }
}

/// Counts records per key
pub struct CountBySink<F> {
    key: F,
    counts: HashMap<String, u64>,
}

impl<F> CountBySink<F> {
    /// Count records grouped by `key`
    pub fn new(key: F) -> Self {
        Self {
            key,
            counts: HashMap::new(),
        }
    }

    /// Counts so far
    pub fn counts(&self) -> &HashMap<String, u64> {
        &self.counts
    }

    /// Sum of all counts
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

#[async_trait]
impl<T, F> RecordSink<T> for CountBySink<F>
where
    T: Send + 'static,
    F: Fn(&T) -> String + Send,
{
    async fn consume(&mut self, record: T) -> Result<()> {
        *self.counts.entry((self.key)(&record)).or_insert(0) += 1;
        Ok(())
    }
}
