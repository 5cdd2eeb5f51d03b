//! Checkpoint persistence
//!
//! One checkpoint per collection records how far pagination has durably
//! progressed. Saves go through a temp file, fsync and rename, so a crash
//! mid-save leaves either the old or the new checkpoint on disk, never a torn
//! one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::types::PageCursor;
use crate::util::file_stem_for;

const CHECKPOINT_EXTENSION: &str = "checkpoint.json";

/// Errors from checkpoint persistence
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt checkpoint at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("checkpoint at {path} belongs to collection '{found}', not '{expected}'")]
    Mismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },
    #[error("failed to encode checkpoint: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Persisted progress of one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Collection identifier
    pub collection_id: String,
    /// Records durably processed; the offset of the next fetch
    pub last_processed_index: u64,
    /// Remote total observed by the latest fetch
    pub total_records: u64,
    /// Set once every record up to a non-zero total has been processed
    pub completed: bool,
    /// When this checkpoint was produced
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    /// State of a collection that has never been fetched
    pub fn zero(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            last_processed_index: 0,
            total_records: 0,
            completed: false,
            timestamp: Utc::now(),
        }
    }

    pub fn cursor(&self) -> PageCursor {
        PageCursor::new(self.last_processed_index, self.total_records)
    }

    /// Checkpoint after durably processing `received` more records
    pub fn advanced(&self, received: u64, total: u64) -> Self {
        self.at(self.cursor().advance(received, total))
    }

    /// Checkpoint at `cursor`, with `completed` derived from it
    pub fn at(&self, cursor: PageCursor) -> Self {
        Self {
            collection_id: self.collection_id.clone(),
            last_processed_index: cursor.start_at,
            total_records: cursor.total,
            completed: cursor.total > 0 && cursor.start_at >= cursor.total,
            timestamp: Utc::now(),
        }
    }
}

/// Durable mapping from collection id to checkpoint
pub trait CheckpointStore: Send + Sync {
    /// Last saved checkpoint, or the zero state when none exists
    fn load(&self, collection_id: &str) -> Result<Checkpoint, CheckpointError>;

    /// Atomically replace the checkpoint for `checkpoint.collection_id`
    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    /// Delete a checkpoint. Returns whether one existed.
    fn remove(&self, collection_id: &str) -> Result<bool, CheckpointError>;
}

/// One pretty-printed JSON file per collection
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Open (creating if needed) a checkpoint directory
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| CheckpointError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `collection_id`
    pub fn path_for(&self, collection_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", file_stem_for(collection_id), CHECKPOINT_EXTENSION))
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CheckpointError + '_ {
        move |source| CheckpointError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self, collection_id: &str) -> Result<Checkpoint, CheckpointError> {
        let path = self.path_for(collection_id);

        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Checkpoint::zero(collection_id));
            }
            Err(e) => return Err(Self::io_error(&path)(e)),
        };

        let checkpoint: Checkpoint = serde_json::from_str(&json).map_err(|source| {
            CheckpointError::Corrupt {
                path: path.clone(),
                source,
            }
        })?;

        // Distinct ids can share a file stem; never hand one collection another's progress
        if checkpoint.collection_id != collection_id {
            return Err(CheckpointError::Mismatch {
                path,
                expected: collection_id.to_string(),
                found: checkpoint.collection_id,
            });
        }
        Ok(checkpoint)
    }

    fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let path = self.path_for(&checkpoint.collection_id);
        let json = serde_json::to_string_pretty(checkpoint)?;

        // Write atomically using temp file
        let temp_path = path.with_extension("json.tmp");
        let mut file = File::create(&temp_path).map_err(Self::io_error(&temp_path))?;
        file.write_all(json.as_bytes())
            .map_err(Self::io_error(&temp_path))?;
        file.sync_all().map_err(Self::io_error(&temp_path))?;
        drop(file);

        fs::rename(&temp_path, &path).map_err(Self::io_error(&path))?;

        // Persist the rename itself
        #[cfg(unix)]
        File::open(&self.dir)
            .and_then(|dir| dir.sync_all())
            .map_err(Self::io_error(&self.dir))?;

        Ok(())
    }

    fn remove(&self, collection_id: &str) -> Result<bool, CheckpointError> {
        let path = self.path_for(collection_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::io_error(&path)(e)),
        }
    }
}
