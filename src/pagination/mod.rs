//! Pagination module
//!
//! Offset pagination over a remote collection whose total is learned at
//! runtime.
//!
//! # Overview
//!
//! A zero-count probe reports the collection total. The [`OffsetGenerator`]
//! turns that total and a page size into the offsets a run visits, and feeds
//! them into a bounded queue for the worker pool. Totals drift while a long
//! run is in progress, so the offsets are advisory: an empty page is a normal
//! end-of-data signal.

mod offsets;
mod types;

pub use offsets::{probe_total, OffsetGenerator};
pub use types::{PageRequest, PageResult, PageSource};
