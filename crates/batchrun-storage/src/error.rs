//! Error types for storage backends.

use thiserror::Error;

/// Errors that can occur when reading from or writing to a store.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Object, file or range does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Local filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Remote service answered with a non-success status.
    #[error("HTTP {status} from {context}: {message}")]
    Status {
        status: u16,
        context: String,
        message: String,
    },

    /// CSV parse or write error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed path, bucket or address.
    #[error("invalid location: {0}")]
    InvalidLocation(String),

    /// Content is not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    Encoding(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Backend refused the operation.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
