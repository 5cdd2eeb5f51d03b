use anyhow::{Context, Result};
use issue_harvest::{
    checkpoint::{CheckpointStore, FileCheckpointStore},
    config::Config,
};

pub fn show_status(config: &Config) -> Result<()> {
    let store = FileCheckpointStore::new(&config.storage.checkpoint_dir)
        .context("Failed to open checkpoint directory")?;

    println!("\nCheckpoints ({}):", store.dir().display());
    println!("==================");

    if config.collections.is_empty() {
        println!("No collections configured.");
        return Ok(());
    }

    for collection in &config.collections {
        match store.load(&collection.id) {
            Ok(cp) if cp.total_records == 0 && cp.last_processed_index == 0 => {
                println!("{:<20} not started", collection.id);
            }
            Ok(cp) => {
                let state = if cp.completed { "completed" } else { "in progress" };
                let percent = if cp.total_records > 0 {
                    cp.last_processed_index as f64 / cp.total_records as f64 * 100.0
                } else {
                    0.0
                };
                println!(
                    "{:<20} {:<12} {}/{} ({:.1}%) at {}",
                    collection.id,
                    state,
                    cp.last_processed_index,
                    cp.total_records,
                    percent.min(100.0),
                    cp.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            Err(e) => println!("{:<20} unreadable: {}", collection.id, e),
        }
    }

    Ok(())
}
