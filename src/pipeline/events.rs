//! Observability events emitted by the pipeline
//!
//! Events go out on a broadcast channel so any number of consumers (progress
//! bar, tests, log shippers) can follow a run. Emitting never blocks and never
//! fails: with no subscribers, events are dropped.

use serde::Serialize;
use tokio::sync::broadcast;

use super::stats::StatsSnapshot;

/// Default channel capacity; slow subscribers lag rather than block the run
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Something observable that happened during a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// A collection began processing from its checkpoint
    CollectionStarted {
        collection: String,
        start_at: u64,
        total: u64,
    },
    /// A collection was already complete and was skipped
    CollectionSkipped { collection: String, total: u64 },
    /// A request attempt failed transiently and will be retried
    RetryScheduled {
        collection: String,
        /// The attempt that just failed, counted from 1
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    /// A page was written and checkpointed
    BatchCompleted {
        collection: String,
        processed: u64,
        total: u64,
        written: usize,
        dropped: usize,
    },
    /// A collection reached the end of its records
    CollectionCompleted {
        collection: String,
        processed: u64,
        total: u64,
    },
    /// A collection stopped on a fatal error
    CollectionFailed { collection: String, error: String },
    /// Shutdown was requested; the collection stopped at a batch boundary
    CollectionInterrupted { collection: String, processed: u64 },
    /// Aggregate statistics at the end of a run
    RunFinished { stats: StatsSnapshot },
}

impl PipelineEvent {
    /// Collection the event refers to, if any
    pub fn collection(&self) -> Option<&str> {
        match self {
            Self::CollectionStarted { collection, .. }
            | Self::CollectionSkipped { collection, .. }
            | Self::RetryScheduled { collection, .. }
            | Self::BatchCompleted { collection, .. }
            | Self::CollectionCompleted { collection, .. }
            | Self::CollectionFailed { collection, .. }
            | Self::CollectionInterrupted { collection, .. } => Some(collection),
            Self::RunFinished { .. } => None,
        }
    }
}

/// Cloneable broadcast handle for pipeline events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Follow events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Dropped silently when nobody listens.
    pub fn emit(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
