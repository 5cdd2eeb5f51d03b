use anyhow::{Context, Result};
use issue_harvest::{
    checkpoint::{CheckpointStore, FileCheckpointStore},
    config::Config,
};
use tracing::info;

pub fn reset_checkpoints(config: &Config, ids: Vec<String>, all: bool) -> Result<()> {
    let store = FileCheckpointStore::new(&config.storage.checkpoint_dir)
        .context("Failed to open checkpoint directory")?;

    let ids: Vec<String> = if all {
        config.collections.iter().map(|c| c.id.clone()).collect()
    } else {
        ids
    };

    for id in &ids {
        let removed = store
            .remove(id)
            .with_context(|| format!("Failed to reset '{}'", id))?;
        if removed {
            info!(collection = %id, "Checkpoint removed");
            println!("Reset {}", id);
        } else {
            println!("{} had no checkpoint", id);
        }
    }

    println!("Output files in {} were left untouched.", config.storage.output_dir.display());
    Ok(())
}
