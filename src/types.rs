//! Core types shared across the pipeline

use serde::{Deserialize, Serialize};

/// One record as returned by the remote API.
///
/// Opaque to the pipeline; only the transform looks inside.
pub type RawRecord = serde_json::Value;

/// One page of search results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Offset echoed by the remote
    #[serde(default)]
    pub start_at: u64,
    /// Page size the remote actually applied (may be below the requested size)
    #[serde(default)]
    pub max_results: u64,
    /// Total matching records at the time of the request
    #[serde(default)]
    pub total: u64,
    /// Records in this page, in remote order
    #[serde(rename = "issues", alias = "records", default)]
    pub records: Vec<RawRecord>,
}

impl Page {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Pagination position within one collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    /// Records durably processed so far; the offset of the next fetch
    pub start_at: u64,
    /// Most recently observed remote total
    pub total: u64,
}

impl PageCursor {
    pub fn new(start_at: u64, total: u64) -> Self {
        Self { start_at, total }
    }

    /// Whether another page should be requested
    pub fn has_more(&self) -> bool {
        self.start_at < self.total
    }

    /// Move past `received` records and adopt the remote's latest total.
    ///
    /// `start_at` never decreases.
    pub fn advance(self, received: u64, total: u64) -> Self {
        Self {
            start_at: self.start_at.saturating_add(received),
            total,
        }
    }
}
