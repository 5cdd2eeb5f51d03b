//! Record transformation
//!
//! A `Transform` maps one raw record onto a `TrainingDocument`. Failures are
//! data-level: the pipeline counts and drops the record, nothing propagates.

mod document;
mod issue;
pub mod text;

pub use document::{Comment, DocumentBuilder, TaskKind, TrainingDocument, TrainingTask};
pub use issue::IssueTransform;

use thiserror::Error;

use crate::types::RawRecord;

/// Why a record could not be transformed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("record is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` has unexpected shape: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// Maps raw records onto output documents
pub trait Transform: Send + Sync {
    fn transform(
        &self,
        record: &RawRecord,
        collection_id: &str,
    ) -> Result<TrainingDocument, TransformError>;

    /// Short name for logs
    fn name(&self) -> &str {
        "transform"
    }
}
