//! Batch-level errors.
//!
//! Only these end a batch early. Per-item executor failures and row-store
//! write failures are logged and counted in the report instead.

use batchrun_core::CoreError;
use batchrun_storage::StorageError;
use thiserror::Error;

/// Errors that abort a batch.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The work-item source could not be read.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(#[source] StorageError),

    /// The prompt template could not be read.
    #[error("Template unavailable: {0}")]
    TemplateUnavailable(#[source] StorageError),

    /// The prompt template is malformed.
    #[error("{0}")]
    InvalidTemplate(#[from] CoreError),

    /// The aggregate output could not be delivered; in-memory results are lost.
    #[error("Aggregate output not written: {0}")]
    SinkWrite(#[source] StorageError),
}
