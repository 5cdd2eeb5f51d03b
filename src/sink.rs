//! Append-only JSON-lines output
//!
//! Each collection gets one `.jsonl` file. Writes only ever append: nothing
//! is truncated or rewritten, so reopening after a restart simply continues
//! the stream. Replayed batches after a resume show up as repeated
//! lines (at-least-once delivery).

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

use crate::transform::TrainingDocument;
use crate::util::file_stem_for;

/// Errors from the output sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("output I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Durable destination for transformed documents
pub trait OutputSink: Send + Sync {
    /// Append `documents` in order and make them durable before returning.
    ///
    /// Returns the number of documents written.
    fn append_batch(
        &self,
        collection_id: &str,
        documents: &[TrainingDocument],
    ) -> Result<usize, SinkError>;

    /// Append a single document
    fn append(&self, collection_id: &str, document: &TrainingDocument) -> Result<(), SinkError> {
        self.append_batch(collection_id, std::slice::from_ref(document))
            .map(|_| ())
    }
}

/// One JSON-lines file per collection
#[derive(Debug)]
pub struct JsonlSink {
    dir: PathBuf,
    /// Streams whose trailing line boundary was verified by this process
    checked: Mutex<HashSet<PathBuf>>,
}

impl JsonlSink {
    /// Open (creating if needed) an output directory
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, SinkError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| SinkError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            checked: Mutex::new(HashSet::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `collection_id`
    pub fn path_for(&self, collection_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", file_stem_for(collection_id)))
    }

    /// Whether an existing stream ends mid-line (a crash during a previous write)
    fn ends_mid_line(path: &Path) -> std::io::Result<bool> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e),
        };
        if file.metadata()?.len() == 0 {
            return Ok(false);
        }
        file.seek(SeekFrom::End(-1))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)?;
        Ok(last[0] != b'\n')
    }
}

impl OutputSink for JsonlSink {
    fn append_batch(
        &self,
        collection_id: &str,
        documents: &[TrainingDocument],
    ) -> Result<usize, SinkError> {
        if documents.is_empty() {
            return Ok(0);
        }

        let path = self.path_for(collection_id);
        let io_error = |source: std::io::Error| SinkError::Io {
            path: path.clone(),
            source,
        };

        let mut buffer = Vec::new();

        let first_touch = !self
            .checked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&path);
        if first_touch {
            if Self::ends_mid_line(&path).map_err(io_error)? {
                tracing::warn!(
                    "Output {} ends with a partial line; starting a fresh line",
                    path.display()
                );
                buffer.push(b'\n');
            }
        }

        for document in documents {
            serde_json::to_writer(&mut buffer, document)?;
            buffer.push(b'\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_error)?;
        file.write_all(&buffer).map_err(io_error)?;
        file.sync_data().map_err(io_error)?;

        // Only a completed write proves the stream ends on a line boundary
        if first_touch {
            self.checked
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(path);
        }

        Ok(documents.len())
    }
}
