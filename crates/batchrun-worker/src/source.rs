//! Work-item sources.

use batchrun_core::{RowRange, WorkItem};
use batchrun_storage::{first_column, BlobStore, RowStore, StorageError};
use tracing::{debug, info};

use crate::error::DriverError;

/// Where the work items come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Delimited text file with a header row, read through the blob store.
    Delimited { path: String },
    /// Single-column range of a row store; the first row is the header.
    Range { range: RowRange },
}

/// Items of one batch, in source order.
#[derive(Debug, Clone, Default)]
pub struct SourceBatch {
    pub items: Vec<WorkItem>,
    /// First data row of a row-addressed source.
    pub first_row: Option<u32>,
}

impl SourceBatch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Read the full item list for `spec`.
pub async fn read_source(
    spec: &SourceSpec,
    blobs: &dyn BlobStore,
    rows: Option<&dyn RowStore>,
) -> Result<SourceBatch, DriverError> {
    let batch = match spec {
        SourceSpec::Delimited { path } => {
            let text = blobs
                .read_text(path)
                .await
                .map_err(DriverError::SourceUnavailable)?;
            let items = first_column(&text)
                .map_err(DriverError::SourceUnavailable)?
                .into_iter()
                .map(WorkItem::new)
                .collect();
            info!(source = %blobs.describe(path), "Read delimited source");
            SourceBatch {
                items,
                first_row: None,
            }
        }
        SourceSpec::Range { range } => {
            let store = rows.ok_or_else(|| {
                DriverError::SourceUnavailable(StorageError::InvalidLocation(format!(
                    "no row store configured for {}",
                    range
                )))
            })?;
            let values = store
                .read(range)
                .await
                .map_err(DriverError::SourceUnavailable)?;
            info!(range = %range, rows = values.len(), "Read range source");
            range_items(range, values)
        }
    };

    debug!(items = batch.len(), first_row = ?batch.first_row, "Source materialized");
    Ok(batch)
}

fn range_items(range: &RowRange, values: Vec<Vec<String>>) -> SourceBatch {
    let first_row = range.start_row + 1;
    // Backends may return more than asked for; never go past end_row.
    let limit = (range.row_count() - 1) as usize;

    let mut items: Vec<WorkItem> = values
        .into_iter()
        .skip(1)
        .take(limit)
        .zip(first_row..)
        .map(|(row, index)| {
            let identifier = row.into_iter().next().unwrap_or_default();
            WorkItem::at_row(identifier, index)
        })
        .collect();
    while items.last().is_some_and(WorkItem::is_blank) {
        items.pop();
    }

    SourceBatch {
        items,
        first_row: Some(first_row),
    }
}
