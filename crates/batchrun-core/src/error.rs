//! Core domain errors.

use thiserror::Error;

/// Core domain errors for BatchRun.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Prompt template does not hold exactly one placeholder.
    #[error("Invalid template: placeholder '{placeholder}' found {found} times, expected exactly once")]
    InvalidTemplate { placeholder: String, found: usize },

    /// Malformed column letter or cell address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Malformed row range.
    #[error("Invalid range: {0}")]
    InvalidRange(String),

    /// Invalid state transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },
}
