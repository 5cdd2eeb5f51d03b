use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use issue_harvest::{
    checkpoint::FileCheckpointStore,
    config::Config,
    fetch::HttpTransport,
    pipeline::{CollectionStatus, Pipeline, PipelineEvent, PipelineOptions, RunReport},
    sink::JsonlSink,
    transform::IssueTransform,
    util::truncate_str,
};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub async fn run_harvest(config: Config, ids: Vec<String>, quiet: bool) -> Result<()> {
    let collections = config.select_collections(&ids)?;
    if collections.is_empty() {
        anyhow::bail!("No collections configured; add [[collections]] entries to the config file");
    }

    let options = PipelineOptions::from(&config);
    let transport = HttpTransport::new(&config.api, options.request_timeout)
        .context("Failed to build HTTP client")?;
    let checkpoints = FileCheckpointStore::new(&config.storage.checkpoint_dir).with_context(|| {
        format!(
            "Failed to open checkpoint directory '{}'",
            config.storage.checkpoint_dir.display()
        )
    })?;
    let sink = JsonlSink::new(&config.storage.output_dir).with_context(|| {
        format!(
            "Failed to open output directory '{}'",
            config.storage.output_dir.display()
        )
    })?;

    info!(
        endpoint = %transport.endpoint_url(),
        collections = collections.len(),
        "Harvesting into {}",
        config.storage.output_dir.display()
    );

    let pipeline = Pipeline::new(
        options,
        Arc::new(transport),
        Arc::new(IssueTransform::with_browse_base(&config.api.base_url)),
        Arc::new(checkpoints),
        Arc::new(sink),
    );

    // Ctrl-C stops the run at the next batch boundary
    let shutdown = pipeline.shutdown_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current batch");
            shutdown.trigger();
        }
    });

    let progress = if quiet {
        None
    } else {
        Some(spawn_progress(pipeline.events().subscribe()))
    };

    let report = pipeline.run(&collections).await;

    if let Some(handle) = progress {
        let _ = handle.await;
    }

    print_report(&report);

    let failed = report.failures().count();
    if failed > 0 {
        anyhow::bail!("{} of {} collection(s) failed", failed, report.collections.len());
    }
    Ok(())
}

/// Drive a progress bar from pipeline events until the run finishes
fn spawn_progress(mut events: broadcast::Receiver<PipelineEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );

        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };

            match event {
                PipelineEvent::CollectionStarted {
                    collection,
                    start_at,
                    total,
                } => {
                    pb.set_length(total);
                    pb.set_position(start_at);
                    pb.set_message(collection);
                }
                PipelineEvent::BatchCompleted {
                    collection,
                    processed,
                    total,
                    dropped,
                    ..
                } => {
                    pb.set_length(total);
                    pb.set_position(processed);
                    if dropped > 0 {
                        pb.set_message(format!("{} ({} dropped)", collection, dropped));
                    } else {
                        pb.set_message(collection);
                    }
                }
                PipelineEvent::RetryScheduled {
                    collection,
                    attempt,
                    delay_ms,
                    error,
                } => {
                    pb.set_message(format!(
                        "{} retry #{} in {}ms: {}",
                        collection,
                        attempt,
                        delay_ms,
                        truncate_str(&error, 60)
                    ));
                }
                PipelineEvent::CollectionCompleted { collection, .. } => {
                    pb.println(format!("✓ {}", collection));
                }
                PipelineEvent::CollectionSkipped { collection, .. } => {
                    pb.println(format!("- {} (already complete)", collection));
                }
                PipelineEvent::CollectionFailed { collection, error } => {
                    pb.println(format!("✗ {}: {}", collection, error));
                }
                PipelineEvent::CollectionInterrupted { collection, processed } => {
                    pb.println(format!("! {} interrupted at {}", collection, processed));
                }
                PipelineEvent::RunFinished { .. } => break,
            }
        }

        pb.finish_and_clear();
    })
}

fn print_report(report: &RunReport) {
    println!("\nHarvest run {}", report.run_id);
    println!("==================");
    println!(
        "{:<20} {:<12} {:>6} {:>10} {:>16}",
        "Collection", "Status", "Pages", "Written", "Progress"
    );
    for c in &report.collections {
        println!(
            "{:<20} {:<12} {:>6} {:>10} {:>16}",
            truncate_str(&c.id, 20),
            c.status.as_str(),
            c.pages,
            c.records_written,
            format!("{}/{}", c.cursor, c.total)
        );
        if let Some(error) = &c.error {
            println!("  error: {}", error);
        }
    }

    let stats = &report.stats;
    println!();
    println!("Records seen: {}", stats.records_seen);
    println!("Transformed: {}", stats.transform_successes);
    println!("Dropped: {}", stats.transform_failures);
    println!("Retries: {}", stats.retries);
    println!("Documents written: {}", stats.documents_written);
    println!("Success rate: {:.1}%", stats.success_rate() * 100.0);
    println!("Elapsed: {:.1}s", report.duration().num_milliseconds() as f64 / 1000.0);

    if report
        .collections
        .iter()
        .any(|c| c.status == CollectionStatus::Interrupted)
    {
        println!("\nRun interrupted; rerun to resume from the saved checkpoints.");
    }
}
