//! issue-harvest: resumable extraction of issue-tracker records into training data
//!
//! Pages through each configured collection of a paginated search API and
//! writes one JSON-lines document per issue, featuring:
//! - Per-collection checkpoints saved atomically after every durable batch
//! - Retry classification with exponential backoff for transient failures
//! - Bounded-concurrency transforms that keep output in record order
//! - Append-only output streams that survive restarts

pub mod checkpoint;
pub mod config;
pub mod fetch;
pub mod gate;
pub mod pipeline;
pub mod sink;
pub mod transform;
pub mod types;
pub mod util;

pub use config::Config;
pub use pipeline::{Pipeline, PipelineError, PipelineOptions, RunReport};
pub use types::*;
