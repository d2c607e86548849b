//! BatchRun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Storage backends
//! - Runtime specifics
//!
//! All types here describe a single batch: the items read from a source,
//! the prompt built for each of them, the outcome reported by an executor,
//! and the records and row addresses the results end up in.

pub mod address;
pub mod cursor;
pub mod error;
pub mod ids;
pub mod item;
pub mod outcome;
pub mod record;
pub mod status;
pub mod template;

// Re-export commonly used types
pub use address::{CellAddress, Column, RowRange};
pub use cursor::RowCursor;
pub use error::CoreError;
pub use ids::BatchId;
pub use item::WorkItem;
pub use outcome::{CompletionSentinel, TaskOutcome};
pub use record::{AggregateLog, ResultRecord, FIELD_DELIMITER};
pub use status::ItemPhase;
pub use template::{PromptTemplate, TaskSpecification, DEFAULT_PLACEHOLDER};
