//! Per-run and per-collection outcome reporting

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

use super::stats::StatsSnapshot;

/// Terminal state of one collection within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStatus {
    /// Every record up to the remote total was processed
    Completed,
    /// Already complete according to its checkpoint
    Skipped,
    /// Stopped on a fatal error; the checkpoint holds the last good batch
    Failed,
    /// Stopped at a batch boundary because shutdown was requested
    Interrupted,
    /// Never attempted because shutdown was requested earlier in the run
    NotStarted,
}

impl CollectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
            Self::NotStarted => "not started",
        }
    }
}

impl fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub id: String,
    pub status: CollectionStatus,
    /// Pages fetched during this run
    pub pages: u64,
    /// Documents appended during this run
    pub records_written: u64,
    /// Checkpointed offset when the collection stopped
    pub cursor: u64,
    /// Last observed remote total
    pub total: u64,
    pub error: Option<String>,
}

impl CollectionReport {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: CollectionStatus::NotStarted,
            pages: 0,
            records_written: 0,
            cursor: 0,
            total: 0,
            error: None,
        }
    }
}

/// Outcome of one `Pipeline::run`
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub collections: Vec<CollectionReport>,
    pub stats: StatsSnapshot,
}

impl RunReport {
    pub fn collection(&self, id: &str) -> Option<&CollectionReport> {
        self.collections.iter().find(|c| c.id == id)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CollectionReport> {
        self.collections
            .iter()
            .filter(|c| c.status == CollectionStatus::Failed)
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn was_interrupted(&self) -> bool {
        self.collections.iter().any(|c| {
            matches!(
                c.status,
                CollectionStatus::Interrupted | CollectionStatus::NotStarted
            )
        })
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}
