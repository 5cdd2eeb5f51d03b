//! Pipeline orchestrator
//!
//! Drives every configured collection through its fetch, transform, append
//! and checkpoint cycle. Collections run one after another; within a page,
//! transforms run concurrently behind the gate. A fatal error ends only the
//! collection it happened in.
//!
//! ```text
//! NotStarted ──load──▶ Fetching ──page──▶ Processing ──append──▶ Advancing
//!     │                  │  ▲                                        │
//!     │ completed        │  └────────────── more remain ─────────────┘
//!     ▼                  ▼ empty page                                │ done
//!  Skipped            Completed ◀────────────────────────────────────┘
//! ```

pub mod events;
mod report;
mod shutdown;
mod stats;

pub use events::{EventBus, PipelineEvent, DEFAULT_EVENT_CAPACITY};
pub use report::{CollectionReport, CollectionStatus, RunReport};
pub use shutdown::ShutdownSignal;
pub use stats::{RunStats, StatsSnapshot};

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::checkpoint::{Checkpoint, CheckpointError, CheckpointStore};
use crate::config::{CollectionConfig, Config};
use crate::fetch::{FetchError, PageFetcher, RetryPolicy, Transport};
use crate::gate::Gate;
use crate::sink::{OutputSink, SinkError};
use crate::transform::{Transform, TrainingDocument};
use crate::types::{Page, PageCursor, RawRecord};

/// Errors that end a collection's cycle
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("checkpoint failed: {0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("output failed: {0}")]
    Sink(#[from] SinkError),
}

/// Tunables consumed by the orchestrator
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub max_concurrent_transforms: usize,
    pub page_size: u64,
    pub request_timeout: Duration,
    /// Pause between pages of one collection; zero disables it
    pub pacing_delay: Duration,
    pub retry: RetryPolicy,
    pub fields: Vec<String>,
}

impl From<&Config> for PipelineOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_concurrent_transforms: config.pipeline.max_concurrent_transforms,
            page_size: config.pipeline.page_size,
            request_timeout: config.pipeline.request_timeout(),
            pacing_delay: config.pipeline.pacing_delay(),
            retry: RetryPolicy::from(&config.retry),
            fields: config.api.fields.clone(),
        }
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Per-collection state machine. `Failed` is the `Err` side of a cycle.
enum CollectionState {
    NotStarted,
    Fetching,
    Processing(Page),
    Advancing {
        received: u64,
        total: u64,
        written: usize,
        dropped: usize,
    },
    Completed,
}

/// Orchestrates collection harvesting
pub struct Pipeline {
    options: PipelineOptions,
    fetcher: PageFetcher,
    transform: Arc<dyn Transform>,
    checkpoints: Arc<dyn CheckpointStore>,
    sink: Arc<dyn OutputSink>,
    gate: Gate,
    stats: Arc<RunStats>,
    events: EventBus,
    shutdown: ShutdownSignal,
}

impl Pipeline {
    pub fn new(
        options: PipelineOptions,
        transport: Arc<dyn Transport>,
        transform: Arc<dyn Transform>,
        checkpoints: Arc<dyn CheckpointStore>,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        let stats = Arc::new(RunStats::new());
        let events = EventBus::default();
        let fetcher = PageFetcher::new(
            transport,
            options.retry,
            options.request_timeout,
            options.fields.clone(),
            Arc::clone(&stats),
            events.clone(),
        );

        Self {
            gate: Gate::new(options.max_concurrent_transforms),
            options,
            fetcher,
            transform,
            checkpoints,
            sink,
            stats,
            events,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Event stream of this pipeline; subscribe before calling `run`
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Handle that stops the run at the next batch boundary
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Counters accumulated since this pipeline was built
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Harvest `collections` in order.
    ///
    /// Never fails as a whole: per-collection errors are recorded in the report.
    pub async fn run(&self, collections: &[CollectionConfig]) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, collections = collections.len(), "Starting harvest run");

        let mut reports = Vec::with_capacity(collections.len());
        for collection in collections {
            let mut report = CollectionReport::new(&collection.id);

            if self.shutdown.is_triggered() {
                debug!(collection = %collection.id, "Shutdown requested, not starting collection");
                reports.push(report);
                continue;
            }

            let span = info_span!("collection", id = %collection.id);
            match self
                .run_collection(collection, &mut report)
                .instrument(span)
                .await
            {
                Ok(status) => report.status = status,
                Err(e) => {
                    error!(collection = %collection.id, "Collection failed: {}", e);
                    report.status = CollectionStatus::Failed;
                    report.error = Some(e.to_string());
                    self.events.emit(PipelineEvent::CollectionFailed {
                        collection: collection.id.clone(),
                        error: e.to_string(),
                    });
                }
            }
            reports.push(report);
        }

        let stats = self.stats.snapshot();
        self.events.emit(PipelineEvent::RunFinished { stats });
        info!(
            %run_id,
            records_seen = stats.records_seen,
            transformed = stats.transform_successes,
            dropped = stats.transform_failures,
            retries = stats.retries,
            "Harvest run finished"
        );

        RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            collections: reports,
            stats,
        }
    }

    /// Drive one collection from its checkpoint to a terminal state
    async fn run_collection(
        &self,
        collection: &CollectionConfig,
        report: &mut CollectionReport,
    ) -> Result<CollectionStatus, PipelineError> {
        let id = collection.id.as_str();
        let mut checkpoint = Checkpoint::zero(id);
        let mut state = CollectionState::NotStarted;

        loop {
            state = match state {
                CollectionState::NotStarted => {
                    checkpoint = self.checkpoints.load(id)?;
                    report.cursor = checkpoint.last_processed_index;
                    report.total = checkpoint.total_records;

                    if checkpoint.completed {
                        info!(total = checkpoint.total_records, "Collection already complete, skipping");
                        self.events.emit(PipelineEvent::CollectionSkipped {
                            collection: id.to_string(),
                            total: checkpoint.total_records,
                        });
                        return Ok(CollectionStatus::Skipped);
                    }

                    info!(
                        start_at = checkpoint.last_processed_index,
                        total = checkpoint.total_records,
                        "Starting collection"
                    );
                    self.events.emit(PipelineEvent::CollectionStarted {
                        collection: id.to_string(),
                        start_at: checkpoint.last_processed_index,
                        total: checkpoint.total_records,
                    });
                    CollectionState::Fetching
                }

                CollectionState::Fetching => {
                    if self.shutdown.is_triggered() {
                        info!(
                            processed = checkpoint.last_processed_index,
                            "Shutdown requested, stopping at batch boundary"
                        );
                        self.events.emit(PipelineEvent::CollectionInterrupted {
                            collection: id.to_string(),
                            processed: checkpoint.last_processed_index,
                        });
                        return Ok(CollectionStatus::Interrupted);
                    }

                    let start_at = checkpoint.last_processed_index;
                    let page = self
                        .fetcher
                        .fetch_page(collection, start_at, self.options.page_size)
                        .await?;
                    self.stats.record_page(page.len());
                    report.pages += 1;
                    report.total = page.total;

                    if page.start_at != start_at {
                        warn!(
                            requested = start_at,
                            echoed = page.start_at,
                            "Remote echoed a different offset; advancing by records received"
                        );
                    }

                    if page.is_empty() {
                        // Keep the refreshed total so a grown collection is noticed next run
                        if page.total != checkpoint.total_records {
                            checkpoint = checkpoint.at(PageCursor::new(start_at, page.total));
                            self.checkpoints.save(&checkpoint)?;
                        }
                        debug!(start_at, total = page.total, "Empty page");
                        CollectionState::Completed
                    } else {
                        CollectionState::Processing(page)
                    }
                }

                CollectionState::Processing(page) => {
                    let received = page.len() as u64;
                    let total = page.total;
                    let (documents, dropped) = self.transform_batch(id, page.records).await;

                    let written = self.sink.append_batch(id, &documents)?;
                    self.stats.record_written(written);
                    report.records_written += written as u64;

                    CollectionState::Advancing {
                        received,
                        total,
                        written,
                        dropped,
                    }
                }

                CollectionState::Advancing {
                    received,
                    total,
                    written,
                    dropped,
                } => {
                    checkpoint = checkpoint.advanced(received, total);
                    self.checkpoints.save(&checkpoint)?;
                    report.cursor = checkpoint.last_processed_index;
                    report.total = checkpoint.total_records;

                    debug!(
                        processed = checkpoint.last_processed_index,
                        total,
                        written,
                        dropped,
                        "Batch checkpointed"
                    );
                    self.events.emit(PipelineEvent::BatchCompleted {
                        collection: id.to_string(),
                        processed: checkpoint.last_processed_index,
                        total,
                        written,
                        dropped,
                    });

                    if checkpoint.cursor().has_more() {
                        let delay = self.options.pacing_delay;
                        if !delay.is_zero() && !self.shutdown.is_triggered() {
                            tokio::time::sleep(delay).await;
                        }
                        CollectionState::Fetching
                    } else {
                        CollectionState::Completed
                    }
                }

                CollectionState::Completed => {
                    info!(
                        processed = checkpoint.last_processed_index,
                        total = checkpoint.total_records,
                        "Collection complete"
                    );
                    self.events.emit(PipelineEvent::CollectionCompleted {
                        collection: id.to_string(),
                        processed: checkpoint.last_processed_index,
                        total: checkpoint.total_records,
                    });
                    return Ok(CollectionStatus::Completed);
                }
            };
        }
    }

    /// Transform one page behind the gate.
    ///
    /// Returns surviving documents in record order and the number dropped.
    async fn transform_batch(
        &self,
        collection_id: &str,
        records: Vec<RawRecord>,
    ) -> (Vec<TrainingDocument>, usize) {
        let tasks = records.into_iter().map(|record| {
            let transform = Arc::clone(&self.transform);
            let collection_id = collection_id.to_string();
            async move { transform.transform(&record, &collection_id) }
        });

        let mut documents = Vec::new();
        let mut dropped = 0;
        for (index, result) in self.gate.run(tasks).await.into_iter().enumerate() {
            match result {
                Ok(Ok(document)) => {
                    self.stats.record_transform(true);
                    documents.push(document);
                }
                Ok(Err(e)) => {
                    debug!(index, transform = self.transform.name(), "Dropping record: {}", e);
                    self.stats.record_transform(false);
                    dropped += 1;
                }
                Err(e) => {
                    warn!(index, "Dropping record: {}", e);
                    self.stats.record_transform(false);
                    dropped += 1;
                }
            }
        }

        (documents, dropped)
    }
}
