//! Result sinks.
//!
//! [`AggregateSink`] collects every record and writes them as one document
//! at the end of the batch. [`RowSink`] writes each result into the row the
//! item came from as soon as it is captured.

use std::sync::Arc;

use batchrun_core::{AggregateLog, CellAddress, Column, ResultRecord};
use batchrun_storage::{BlobStore, RowStore, StorageError};
use tracing::{debug, info};

/// In-memory aggregate of all results, flushed once.
pub struct AggregateSink {
    store: Arc<dyn BlobStore>,
    destination: String,
    log: AggregateLog,
}

impl AggregateSink {
    pub fn new(store: Arc<dyn BlobStore>, destination: impl Into<String>) -> Self {
        Self {
            store,
            destination: destination.into(),
            log: AggregateLog::new(),
        }
    }

    /// Human-readable destination, e.g. `gs://bucket/results.tsv`.
    pub fn destination(&self) -> String {
        self.store.describe(&self.destination)
    }

    pub fn append(&mut self, record: ResultRecord) -> &ResultRecord {
        self.log.append(record)
    }

    pub fn len(&self) -> usize {
        self.log.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    /// Write the whole log, replacing any previous content.
    ///
    /// Returns the number of bytes written.
    pub async fn flush(self) -> Result<usize, StorageError> {
        let document = self.log.render();
        self.store
            .write(&self.destination, document.as_bytes())
            .await?;
        info!(
            destination = %self.store.describe(&self.destination),
            records = self.log.len(),
            bytes = document.len(),
            "Aggregate output written"
        );
        Ok(document.len())
    }
}

/// Writes result fields into a row store, one row per item.
pub struct RowSink {
    store: Arc<dyn RowStore>,
    sheet: Option<String>,
    column: Column,
    output_size: usize,
}

impl RowSink {
    pub fn new(
        store: Arc<dyn RowStore>,
        sheet: Option<String>,
        column: Column,
        output_size: usize,
    ) -> Self {
        Self {
            store,
            sheet,
            column,
            output_size,
        }
    }

    pub fn output_size(&self) -> usize {
        self.output_size
    }

    /// Write at most `output_size` fields of `record` at `row`, starting
    /// at the output column. Returns the number of cells written.
    pub async fn write(&self, row: u32, record: &ResultRecord) -> Result<usize, StorageError> {
        let fields: Vec<String> = record
            .fields(self.output_size)
            .into_iter()
            .map(str::to_string)
            .collect();
        let address = CellAddress::new(self.sheet.clone(), self.column, row)
            .map_err(|e| StorageError::InvalidLocation(e.to_string()))?;

        self.store.write(&address, &fields).await?;
        debug!(address = %address, cells = fields.len(), "Row written");
        Ok(fields.len())
    }
}
