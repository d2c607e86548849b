//! Storage backends for BatchRun.
//!
//! Two narrow interfaces cover everything the batch driver touches outside
//! the executor:
//!
//! - [`BlobStore`] reads and writes whole documents (templates, CSV sources,
//!   the aggregate output). Backends: local filesystem, Google Cloud Storage,
//!   in-memory.
//! - [`RowStore`] reads a column range and writes a row of cells, addressed
//!   A1-style. Backends: Google Sheets, a local CSV file, in-memory.

pub mod blob;
pub mod delimited;
pub mod error;
pub mod gcs;
pub mod grid;
pub mod rows;
pub mod sheets;

pub use blob::{BlobStore, LocalBlobStore, MemoryBlobStore};
pub use delimited::first_column;
pub use error::StorageError;
pub use gcs::GcsBlobStore;
pub use rows::{CsvRowStore, MemoryRowStore, RowStore};
pub use sheets::SheetsRowStore;
