//! End-to-end pipeline tests against a deterministic in-memory record source

use async_trait::async_trait;
use issue_harvest::checkpoint::{Checkpoint, CheckpointError, CheckpointStore, FileCheckpointStore};
use issue_harvest::config::CollectionConfig;
use issue_harvest::fetch::{PageRequest, RetryPolicy, Transport, TransportError, TransportResponse};
use issue_harvest::pipeline::{
    CollectionStatus, Pipeline, PipelineEvent, PipelineOptions, ShutdownSignal,
};
use issue_harvest::sink::{JsonlSink, OutputSink, SinkError};
use issue_harvest::transform::{IssueTransform, TrainingDocument};
use issue_harvest::types::PageCursor;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Default)]
struct SourceCollection {
    total: u64,
    /// Offsets whose records lack a summary
    broken: Vec<u64>,
    /// Statuses answered before any page is served
    prelude: VecDeque<u16>,
    /// Status answered forever instead of pages
    status: Option<u16>,
}

/// Serves numbered issues for each configured collection
#[derive(Default)]
struct SourceTransport {
    collections: Mutex<HashMap<String, SourceCollection>>,
    requests: Mutex<Vec<(String, u64)>>,
}

impl SourceTransport {
    fn new() -> Self {
        Self::default()
    }

    fn with(self, id: &str, collection: SourceCollection) -> Self {
        self.collections
            .lock()
            .unwrap()
            .insert(id.to_string(), collection);
        self
    }

    fn with_records(self, id: &str, total: u64) -> Self {
        self.with(
            id,
            SourceCollection {
                total,
                ..Default::default()
            },
        )
    }

    fn offsets_requested(&self, id: &str) -> Vec<u64> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| c == id)
            .map(|(_, start_at)| *start_at)
            .collect()
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

fn issue(collection: &str, offset: u64) -> Value {
    json!({
        "id": (10_000 + offset).to_string(),
        "key": format!("{}-{}", collection, offset + 1),
        "fields": {
            "summary": format!("Issue number {}", offset + 1),
            "status": { "name": "Open" }
        }
    })
}

#[async_trait]
impl Transport for SourceTransport {
    async fn send(&self, request: &PageRequest) -> Result<TransportResponse, TransportError> {
        self.requests
            .lock()
            .unwrap()
            .push((request.collection_id.clone(), request.start_at));

        let mut collections = self.collections.lock().unwrap();
        let Some(collection) = collections.get_mut(&request.collection_id) else {
            return Ok(TransportResponse::new(404, r#"{"errorMessages":["no such project"]}"#));
        };

        if let Some(status) = collection.prelude.pop_front() {
            return Ok(TransportResponse::new(status, "try again later"));
        }
        if let Some(status) = collection.status {
            return Ok(TransportResponse::new(status, r#"{"errorMessages":["denied"]}"#));
        }

        let end = (request.start_at + request.max_results).min(collection.total);
        let issues: Vec<Value> = (request.start_at.min(end)..end)
            .map(|offset| {
                if collection.broken.contains(&offset) {
                    json!({ "key": format!("{}-{}", request.collection_id, offset + 1), "fields": {} })
                } else {
                    issue(&request.collection_id, offset)
                }
            })
            .collect();

        let body = json!({
            "startAt": request.start_at,
            "maxResults": request.max_results,
            "total": collection.total,
            "issues": issues,
        });
        Ok(TransportResponse::new(200, body.to_string()))
    }
}

/// In-memory checkpoints that remember every save
#[derive(Default)]
struct RecordingStore {
    current: Mutex<HashMap<String, Checkpoint>>,
    saves: Mutex<Vec<Checkpoint>>,
    fail_saves_for: Option<String>,
}

impl RecordingStore {
    fn failing_for(id: &str) -> Self {
        Self {
            fail_saves_for: Some(id.to_string()),
            ..Default::default()
        }
    }

    fn seed(&self, checkpoint: Checkpoint) {
        self.current
            .lock()
            .unwrap()
            .insert(checkpoint.collection_id.clone(), checkpoint);
    }

    fn saves_for(&self, id: &str) -> Vec<Checkpoint> {
        self.saves
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.collection_id == id)
            .cloned()
            .collect()
    }
}

impl CheckpointStore for RecordingStore {
    fn load(&self, collection_id: &str) -> Result<Checkpoint, CheckpointError> {
        Ok(self
            .current
            .lock()
            .unwrap()
            .get(collection_id)
            .cloned()
            .unwrap_or_else(|| Checkpoint::zero(collection_id)))
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        if self.fail_saves_for.as_deref() == Some(checkpoint.collection_id.as_str()) {
            return Err(CheckpointError::Io {
                path: PathBuf::from("memory"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }
        self.saves.lock().unwrap().push(checkpoint.clone());
        self.seed(checkpoint.clone());
        Ok(())
    }

    fn remove(&self, collection_id: &str) -> Result<bool, CheckpointError> {
        Ok(self.current.lock().unwrap().remove(collection_id).is_some())
    }
}

/// Sink that refuses every write
struct BrokenSink;

impl OutputSink for BrokenSink {
    fn append_batch(&self, _: &str, _: &[TrainingDocument]) -> Result<usize, SinkError> {
        Err(SinkError::Io {
            path: PathBuf::from("output.jsonl"),
            source: std::io::Error::new(std::io::ErrorKind::Other, "read-only filesystem"),
        })
    }
}

/// Requests shutdown right after its first successful append
struct InterruptingSink {
    inner: JsonlSink,
    signal: Mutex<Option<ShutdownSignal>>,
}

impl OutputSink for InterruptingSink {
    fn append_batch(&self, id: &str, documents: &[TrainingDocument]) -> Result<usize, SinkError> {
        let written = self.inner.append_batch(id, documents)?;
        if let Some(signal) = self.signal.lock().unwrap().as_ref() {
            signal.trigger();
        }
        Ok(written)
    }
}

/// Requests shutdown as soon as the source answers with a non-success status
struct InterruptingTransport {
    inner: SourceTransport,
    signal: Mutex<Option<ShutdownSignal>>,
}

#[async_trait]
impl Transport for InterruptingTransport {
    async fn send(&self, request: &PageRequest) -> Result<TransportResponse, TransportError> {
        let response = self.inner.send(request).await?;
        if response.status != 200 {
            if let Some(signal) = self.signal.lock().unwrap().as_ref() {
                signal.trigger();
            }
        }
        Ok(response)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn options() -> PipelineOptions {
    PipelineOptions {
        max_concurrent_transforms: 4,
        page_size: 100,
        request_timeout: Duration::from_secs(30),
        pacing_delay: Duration::from_secs(1),
        retry: RetryPolicy::new(5, Duration::from_secs(2)),
        fields: vec!["summary".to_string(), "status".to_string()],
    }
}

fn pipeline(
    transport: &Arc<SourceTransport>,
    store: Arc<dyn CheckpointStore>,
    sink: Arc<dyn OutputSink>,
) -> Pipeline {
    Pipeline::new(
        options(),
        transport.clone(),
        Arc::new(IssueTransform::new()),
        store,
        sink,
    )
}

fn collections(ids: &[&str]) -> Vec<CollectionConfig> {
    ids.iter().map(|id| CollectionConfig::new(*id)).collect()
}

fn output_keys(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|line| {
            let value: Value = serde_json::from_str(line).unwrap();
            value["key"].as_str().unwrap().to_string()
        })
        .collect()
}

fn expected_keys(collection: &str, count: u64) -> Vec<String> {
    (1..=count).map(|n| format!("{}-{}", collection, n)).collect()
}

fn drain(rx: &mut broadcast::Receiver<PipelineEvent>) -> Vec<PipelineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ============================================================================
// Pagination and checkpointing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn paginates_250_records_in_three_batches() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(SourceTransport::new().with_records("KAFKA", 250));
    let store = Arc::new(RecordingStore::default());
    let sink = Arc::new(JsonlSink::new(temp_dir.path()).unwrap());

    let pipeline = pipeline(&transport, store.clone(), sink.clone());
    let report = pipeline.run(&collections(&["KAFKA"])).await;

    assert_eq!(transport.offsets_requested("KAFKA"), vec![0, 100, 200]);

    let saves = store.saves_for("KAFKA");
    let cursors: Vec<u64> = saves.iter().map(|c| c.last_processed_index).collect();
    let completed: Vec<bool> = saves.iter().map(|c| c.completed).collect();
    assert_eq!(cursors, vec![100, 200, 250]);
    assert_eq!(completed, vec![false, false, true]);
    assert!(saves.iter().all(|c| c.total_records == 250));

    let kafka = report.collection("KAFKA").unwrap();
    assert_eq!(kafka.status, CollectionStatus::Completed);
    assert_eq!(kafka.pages, 3);
    assert_eq!(kafka.records_written, 250);
    assert_eq!((kafka.cursor, kafka.total), (250, 250));

    assert_eq!(output_keys(&sink.path_for("KAFKA")), expected_keys("KAFKA", 250));

    assert_eq!(report.stats.records_seen, 250);
    assert_eq!(report.stats.transform_successes, 250);
    assert_eq!(report.stats.documents_written, 250);
    assert_eq!(report.stats.retries, 0);
    assert_eq!(pipeline.stats(), report.stats);
}

#[tokio::test(start_paused = true)]
async fn pacing_delay_separates_pages_but_not_the_last_one() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(SourceTransport::new().with_records("KAFKA", 250));
    let pipeline = pipeline(
        &transport,
        Arc::new(RecordingStore::default()),
        Arc::new(JsonlSink::new(temp_dir.path()).unwrap()),
    );

    let started = tokio::time::Instant::now();
    pipeline.run(&collections(&["KAFKA"])).await;

    // Two pauses between three pages
    assert_eq!(started.elapsed(), Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn batch_events_report_progress() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(SourceTransport::new().with_records("KAFKA", 250));
    let pipeline = pipeline(
        &transport,
        Arc::new(RecordingStore::default()),
        Arc::new(JsonlSink::new(temp_dir.path()).unwrap()),
    );
    let mut rx = pipeline.events().subscribe();

    pipeline.run(&collections(&["KAFKA"])).await;

    let progress: Vec<(u64, u64)> = drain(&mut rx)
        .into_iter()
        .filter_map(|event| match event {
            PipelineEvent::BatchCompleted {
                processed, total, ..
            } => Some((processed, total)),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![(100, 250), (200, 250), (250, 250)]);
}

#[tokio::test(start_paused = true)]
async fn empty_collection_completes_without_checkpoint_progress() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(SourceTransport::new().with_records("EMPTY", 0));
    let store = Arc::new(RecordingStore::default());
    let pipeline = pipeline(
        &transport,
        store.clone(),
        Arc::new(JsonlSink::new(temp_dir.path()).unwrap()),
    );

    let report = pipeline.run(&collections(&["EMPTY"])).await;

    assert_eq!(report.collections[0].status, CollectionStatus::Completed);
    assert_eq!(transport.request_count(), 1);
    assert!(store.saves_for("EMPTY").is_empty());
    assert!(!store.load("EMPTY").unwrap().completed);
}

#[tokio::test(start_paused = true)]
async fn completed_collection_is_skipped_without_fetching() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(SourceTransport::new().with_records("KAFKA", 250));
    let store = Arc::new(RecordingStore::default());
    store.seed(Checkpoint::zero("KAFKA").at(PageCursor::new(250, 250)));

    let pipeline = pipeline(
        &transport,
        store.clone(),
        Arc::new(JsonlSink::new(temp_dir.path()).unwrap()),
    );
    let report = pipeline.run(&collections(&["KAFKA"])).await;

    assert_eq!(report.collections[0].status, CollectionStatus::Skipped);
    assert_eq!(transport.request_count(), 0);
    assert!(store.saves_for("KAFKA").is_empty());
}

// ============================================================================
// Failure isolation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn not_found_fails_one_collection_without_affecting_the_next() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(
        SourceTransport::new()
            .with(
                "GONE",
                SourceCollection {
                    status: Some(404),
                    ..Default::default()
                },
            )
            .with_records("KAFKA", 120),
    );
    let store = Arc::new(RecordingStore::default());
    let sink = Arc::new(JsonlSink::new(temp_dir.path()).unwrap());
    let pipeline = pipeline(&transport, store.clone(), sink.clone());
    let mut rx = pipeline.events().subscribe();

    let report = pipeline.run(&collections(&["GONE", "KAFKA"])).await;

    let gone = report.collection("GONE").unwrap();
    assert_eq!(gone.status, CollectionStatus::Failed);
    assert!(gone.error.as_deref().unwrap().contains("404"));
    assert_eq!(transport.offsets_requested("GONE"), vec![0]);
    assert!(store.saves_for("GONE").is_empty());

    let kafka = report.collection("KAFKA").unwrap();
    assert_eq!(kafka.status, CollectionStatus::Completed);
    assert_eq!(output_keys(&sink.path_for("KAFKA")), expected_keys("KAFKA", 120));

    assert_eq!(report.stats.retries, 0);
    assert!(report.has_failures());

    let events = drain(&mut rx);
    assert!(!events
        .iter()
        .any(|e| matches!(e, PipelineEvent::RetryScheduled { .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        PipelineEvent::CollectionFailed { collection, .. } if collection == "GONE"
    )));
    assert!(matches!(events.last(), Some(PipelineEvent::RunFinished { .. })));
}

#[tokio::test(start_paused = true)]
async fn rate_limit_once_is_retried_once() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(SourceTransport::new().with(
        "KAFKA",
        SourceCollection {
            total: 50,
            prelude: VecDeque::from(vec![429]),
            ..Default::default()
        },
    ));
    let pipeline = pipeline(
        &transport,
        Arc::new(RecordingStore::default()),
        Arc::new(JsonlSink::new(temp_dir.path()).unwrap()),
    );
    let mut rx = pipeline.events().subscribe();

    let report = pipeline.run(&collections(&["KAFKA"])).await;

    assert_eq!(report.collections[0].status, CollectionStatus::Completed);
    assert_eq!(report.stats.retries, 1);
    assert_eq!(transport.offsets_requested("KAFKA"), vec![0, 0]);

    let retries: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, PipelineEvent::RetryScheduled { .. }))
        .collect();
    assert_eq!(retries.len(), 1);
    assert!(matches!(
        &retries[0],
        PipelineEvent::RetryScheduled { attempt: 1, delay_ms: 2000, error, .. } if error.contains("429")
    ));
}

#[tokio::test(start_paused = true)]
async fn persistent_server_errors_exhaust_retries_then_fail() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(SourceTransport::new().with(
        "KAFKA",
        SourceCollection {
            status: Some(503),
            ..Default::default()
        },
    ));
    let pipeline = pipeline(
        &transport,
        Arc::new(RecordingStore::default()),
        Arc::new(JsonlSink::new(temp_dir.path()).unwrap()),
    );

    let report = pipeline.run(&collections(&["KAFKA"])).await;

    assert_eq!(report.collections[0].status, CollectionStatus::Failed);
    assert_eq!(transport.request_count(), 5);
    assert_eq!(report.stats.retries, 4);
}

#[tokio::test(start_paused = true)]
async fn checkpoint_failure_fails_the_collection() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(
        SourceTransport::new()
            .with_records("KAFKA", 250)
            .with_records("SPARK", 10),
    );
    let store = Arc::new(RecordingStore::failing_for("KAFKA"));
    let pipeline = pipeline(
        &transport,
        store.clone(),
        Arc::new(JsonlSink::new(temp_dir.path()).unwrap()),
    );

    let report = pipeline.run(&collections(&["KAFKA", "SPARK"])).await;

    let kafka = report.collection("KAFKA").unwrap();
    assert_eq!(kafka.status, CollectionStatus::Failed);
    assert!(kafka.error.as_deref().unwrap().contains("disk full"));
    // Stops after the batch whose checkpoint could not be saved
    assert_eq!(transport.offsets_requested("KAFKA"), vec![0]);
    assert_eq!(store.load("KAFKA").unwrap().last_processed_index, 0);

    assert_eq!(report.collection("SPARK").unwrap().status, CollectionStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn sink_failure_fails_without_advancing_checkpoint() {
    let transport = Arc::new(SourceTransport::new().with_records("KAFKA", 250));
    let store = Arc::new(RecordingStore::default());
    let pipeline = pipeline(&transport, store.clone(), Arc::new(BrokenSink));

    let report = pipeline.run(&collections(&["KAFKA"])).await;

    let kafka = &report.collections[0];
    assert_eq!(kafka.status, CollectionStatus::Failed);
    assert!(kafka.error.as_deref().unwrap().contains("read-only"));
    assert!(store.saves_for("KAFKA").is_empty());
}

#[tokio::test(start_paused = true)]
async fn malformed_records_are_dropped_and_counted() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(SourceTransport::new().with(
        "KAFKA",
        SourceCollection {
            total: 10,
            broken: vec![2, 7],
            ..Default::default()
        },
    ));
    let store = Arc::new(RecordingStore::default());
    let sink = Arc::new(JsonlSink::new(temp_dir.path()).unwrap());
    let pipeline = pipeline(&transport, store.clone(), sink.clone());

    let report = pipeline.run(&collections(&["KAFKA"])).await;

    assert_eq!(report.collections[0].status, CollectionStatus::Completed);
    assert_eq!(report.stats.records_seen, 10);
    assert_eq!(report.stats.transform_failures, 2);
    assert_eq!(report.stats.documents_written, 8);

    let expected: Vec<String> = expected_keys("KAFKA", 10)
        .into_iter()
        .enumerate()
        .filter(|(offset, _)| *offset != 2 && *offset != 7)
        .map(|(_, key)| key)
        .collect();
    assert_eq!(output_keys(&sink.path_for("KAFKA")), expected);

    // Dropped records still count towards the cursor
    let checkpoint = store.load("KAFKA").unwrap();
    assert_eq!(checkpoint.last_processed_index, 10);
    assert!(checkpoint.completed);
}

// ============================================================================
// Resume and shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn resumes_from_saved_offset() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(SourceTransport::new().with_records("KAFKA", 250));
    let store = Arc::new(RecordingStore::default());
    store.seed(Checkpoint::zero("KAFKA").at(PageCursor::new(100, 250)));
    let sink = Arc::new(JsonlSink::new(temp_dir.path()).unwrap());

    let pipeline = pipeline(&transport, store.clone(), sink.clone());
    let report = pipeline.run(&collections(&["KAFKA"])).await;

    assert_eq!(transport.offsets_requested("KAFKA"), vec![100, 200]);
    assert_eq!(report.collections[0].records_written, 150);

    let keys = output_keys(&sink.path_for("KAFKA"));
    assert_eq!(keys.first().map(String::as_str), Some("KAFKA-101"));
    assert_eq!(keys.len(), 150);
    assert!(store.load("KAFKA").unwrap().completed);
}

#[tokio::test(start_paused = true)]
async fn interrupted_run_resumes_to_the_same_result() {
    // Reference: one uninterrupted run
    let reference_dir = TempDir::new().unwrap();
    let reference_transport = Arc::new(SourceTransport::new().with_records("KAFKA", 250));
    let reference_store = Arc::new(FileCheckpointStore::new(reference_dir.path().join("cp")).unwrap());
    let reference_sink = Arc::new(JsonlSink::new(reference_dir.path().join("out")).unwrap());
    pipeline(&reference_transport, reference_store.clone(), reference_sink.clone())
        .run(&collections(&["KAFKA"]))
        .await;

    // Interrupted after the first batch, then resumed by a fresh pipeline
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FileCheckpointStore::new(temp_dir.path().join("cp")).unwrap());
    let out_dir = temp_dir.path().join("out");

    let first_transport = Arc::new(
        SourceTransport::new()
            .with_records("KAFKA", 250)
            .with_records("SPARK", 5),
    );
    let interrupting = Arc::new(InterruptingSink {
        inner: JsonlSink::new(&out_dir).unwrap(),
        signal: Mutex::new(None),
    });
    let first = pipeline(&first_transport, store.clone(), interrupting.clone());
    *interrupting.signal.lock().unwrap() = Some(first.shutdown_signal());

    let report = first.run(&collections(&["KAFKA", "SPARK"])).await;
    assert_eq!(report.collection("KAFKA").unwrap().status, CollectionStatus::Interrupted);
    assert_eq!(report.collection("KAFKA").unwrap().cursor, 100);
    assert_eq!(report.collection("SPARK").unwrap().status, CollectionStatus::NotStarted);
    assert!(report.was_interrupted());
    assert!(first_transport.offsets_requested("SPARK").is_empty());

    let interrupted = store.load("KAFKA").unwrap();
    assert_eq!((interrupted.last_processed_index, interrupted.completed), (100, false));

    let second_transport = Arc::new(SourceTransport::new().with_records("KAFKA", 250));
    let sink = Arc::new(JsonlSink::new(&out_dir).unwrap());
    pipeline(&second_transport, store.clone(), sink.clone())
        .run(&collections(&["KAFKA"]))
        .await;

    // Never re-fetches below the checkpoint
    assert!(second_transport
        .offsets_requested("KAFKA")
        .iter()
        .all(|offset| *offset >= 100));

    let resumed = store.load("KAFKA").unwrap();
    let reference = reference_store.load("KAFKA").unwrap();
    assert_eq!(
        (resumed.last_processed_index, resumed.total_records, resumed.completed),
        (reference.last_processed_index, reference.total_records, reference.completed)
    );
    assert_eq!(
        output_keys(&sink.path_for("KAFKA")),
        output_keys(&reference_sink.path_for("KAFKA"))
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_retry_backoff_stops_at_next_boundary() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(InterruptingTransport {
        inner: SourceTransport::new().with(
            "KAFKA",
            SourceCollection {
                total: 250,
                prelude: VecDeque::from(vec![429, 503]),
                ..Default::default()
            },
        ),
        signal: Mutex::new(None),
    });
    let store = Arc::new(RecordingStore::default());
    let sink = Arc::new(JsonlSink::new(temp_dir.path()).unwrap());
    let pipeline = Pipeline::new(
        options(),
        transport.clone(),
        Arc::new(IssueTransform::new()),
        store.clone(),
        sink.clone(),
    );
    *transport.signal.lock().unwrap() = Some(pipeline.shutdown_signal());

    let started = tokio::time::Instant::now();
    let report = pipeline.run(&collections(&["KAFKA"])).await;

    // The in-flight fetch keeps retrying until it succeeds
    assert_eq!(transport.inner.offsets_requested("KAFKA"), vec![0, 0, 0]);
    assert_eq!(report.stats.retries, 2);

    // Its batch is written and checkpointed before stopping
    let cursors: Vec<u64> = store
        .saves_for("KAFKA")
        .iter()
        .map(|c| c.last_processed_index)
        .collect();
    assert_eq!(cursors, vec![100]);
    assert_eq!(output_keys(&sink.path_for("KAFKA")), expected_keys("KAFKA", 100));

    let kafka = report.collection("KAFKA").unwrap();
    assert_eq!(kafka.status, CollectionStatus::Interrupted);
    assert_eq!(kafka.cursor, 100);

    // Backoff of 2s + 4s, and no pacing pause once shutdown was requested
    assert_eq!(started.elapsed(), Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn shutdown_before_run_starts_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let transport = Arc::new(SourceTransport::new().with_records("KAFKA", 250));
    let pipeline = pipeline(
        &transport,
        Arc::new(RecordingStore::default()),
        Arc::new(JsonlSink::new(temp_dir.path()).unwrap()),
    );
    pipeline.shutdown_signal().trigger();

    let report = pipeline.run(&collections(&["KAFKA", "SPARK"])).await;

    assert!(report
        .collections
        .iter()
        .all(|c| c.status == CollectionStatus::NotStarted));
    assert_eq!(transport.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn output_order_is_independent_of_concurrency() {
    let mut outputs = Vec::new();
    for max in [1, 3, 100] {
        let temp_dir = TempDir::new().unwrap();
        let transport = Arc::new(SourceTransport::new().with_records("KAFKA", 100));
        let sink = Arc::new(JsonlSink::new(temp_dir.path()).unwrap());
        let pipeline = Pipeline::new(
            PipelineOptions {
                max_concurrent_transforms: max,
                ..options()
            },
            transport.clone(),
            Arc::new(IssueTransform::new()),
            Arc::new(RecordingStore::default()),
            sink.clone(),
        );
        pipeline.run(&collections(&["KAFKA"])).await;
        outputs.push(std::fs::read_to_string(sink.path_for("KAFKA")).unwrap());
    }

    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[1], outputs[2]);
}
