//! Pipeline error taxonomy.
//!
//! Backend and reconciliation failures are never retried; the orchestrator
//! isolates them to the one document being processed.

use thiserror::Error;

use crate::db::DatabaseError;
use crate::models::Backend;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{backend} extraction failed: {message}")]
    Backend { backend: Backend, message: String },

    #[error("{backend} reconciliation failed: {message}")]
    Reconciliation { backend: Backend, message: String },

    /// The normalizer recovered no usable field definitions. A checked
    /// sentinel rather than an exception: callers must convert it into a
    /// user-facing detection failure.
    #[error("No usable field definitions recovered from detection output")]
    EmptyDetection,

    #[error("Result {result_id} has no merged candidate for {backend}")]
    MissingCandidate { result_id: i64, backend: Backend },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
