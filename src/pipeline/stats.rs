//! Run statistics
//!
//! Counters live for one `Pipeline` instance. Only the pipeline and its
//! fetcher mutate them; everyone else reads snapshots.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one run
#[derive(Debug, Default)]
pub struct RunStats {
    records_seen: AtomicU64,
    transform_successes: AtomicU64,
    transform_failures: AtomicU64,
    retries: AtomicU64,
    pages_fetched: AtomicU64,
    documents_written: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_page(&self, records: usize) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
        self.records_seen.fetch_add(records as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_transform(&self, success: bool) {
        if success {
            self.transform_successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.transform_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_written(&self, documents: usize) {
        self.documents_written
            .fetch_add(documents as u64, Ordering::Relaxed);
    }

    /// Point-in-time copy of all counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            records_seen: self.records_seen.load(Ordering::Relaxed),
            transform_successes: self.transform_successes.load(Ordering::Relaxed),
            transform_failures: self.transform_failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            documents_written: self.documents_written.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of the run counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Records received from the remote
    pub records_seen: u64,
    /// Records transformed into documents
    pub transform_successes: u64,
    /// Records dropped by the transform
    pub transform_failures: u64,
    /// Request attempts that were retried
    pub retries: u64,
    /// Successful page fetches
    pub pages_fetched: u64,
    /// Documents appended to sinks
    pub documents_written: u64,
}

impl StatsSnapshot {
    /// Fraction of seen records that became documents
    pub fn success_rate(&self) -> f64 {
        if self.records_seen == 0 {
            return 0.0;
        }
        self.transform_successes as f64 / self.records_seen as f64
    }
}
