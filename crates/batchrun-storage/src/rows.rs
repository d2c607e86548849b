//! Row-addressed stores.

use std::path::PathBuf;

use async_trait::async_trait;
use batchrun_core::{CellAddress, RowRange};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StorageError;
use crate::grid::Grid;

/// A table addressed by column letter and 1-based row.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Values in `range`, one inner vec per row.
    ///
    /// Trailing blank rows may be omitted; an interior blank row is empty.
    async fn read(&self, range: &RowRange) -> Result<Vec<Vec<String>>, StorageError>;

    /// Write `fields` as raw values into consecutive cells starting at `address`.
    async fn write(&self, address: &CellAddress, fields: &[String]) -> Result<(), StorageError>;
}

/// A local CSV file used as a table.
///
/// The whole file is read on every call and rewritten on every write. Sheet
/// names in addresses are ignored.
#[derive(Debug)]
pub struct CsvRowStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvRowStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<Grid, StorageError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let text = String::from_utf8(bytes)
                    .map_err(|_| StorageError::Encoding(self.path.display().to_string()))?;
                Grid::from_csv(&text)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(self.path.display().to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

#[async_trait]
impl RowStore for CsvRowStore {
    async fn read(&self, range: &RowRange) -> Result<Vec<Vec<String>>, StorageError> {
        let _guard = self.lock.lock().await;
        debug!(path = %self.path.display(), range = %range, "Reading CSV rows");
        Ok(self.load().await?.read_range(range))
    }

    async fn write(&self, address: &CellAddress, fields: &[String]) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        debug!(path = %self.path.display(), address = %address, fields = fields.len(), "Writing CSV row");
        let mut grid = self.load().await?;
        grid.write_row(address, fields);
        tokio::fs::write(&self.path, grid.to_csv()?).await?;
        Ok(())
    }
}

/// In-memory table for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryRowStore {
    grid: Mutex<Grid>,
    writes: Mutex<Vec<(CellAddress, Vec<String>)>>,
    fail_reads: bool,
    fail_writes: bool,
}

impl MemoryRowStore {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self {
            grid: Mutex::new(Grid::new(rows)),
            ..Self::default()
        }
    }

    /// Single-column table from a list of values, row 1 first.
    pub fn from_column(values: &[&str]) -> Self {
        Self::new(values.iter().map(|v| vec![v.to_string()]).collect())
    }

    /// Reads fail with [`StorageError::Unavailable`].
    pub fn with_failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Writes fail with [`StorageError::Unavailable`].
    pub fn with_failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Successful writes, in order.
    pub async fn writes(&self) -> Vec<(CellAddress, Vec<String>)> {
        self.writes.lock().await.clone()
    }

    pub async fn cell(&self, row: u32, column: u32) -> Option<String> {
        self.grid.lock().await.cell(row, column).map(str::to_string)
    }
}

#[async_trait]
impl RowStore for MemoryRowStore {
    async fn read(&self, range: &RowRange) -> Result<Vec<Vec<String>>, StorageError> {
        if self.fail_reads {
            return Err(StorageError::Unavailable(format!("memory rows {}", range)));
        }
        Ok(self.grid.lock().await.read_range(range))
    }

    async fn write(&self, address: &CellAddress, fields: &[String]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Unavailable(format!("memory rows {}", address)));
        }
        self.grid.lock().await.write_row(address, fields);
        self.writes
            .lock()
            .await
            .push((address.clone(), fields.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchrun_core::Column;

    #[tokio::test]
    async fn test_csv_store_read_and_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("companies.csv");
        tokio::fs::write(&path, "company,found,summary\nAcme,,\nGlobex,,\n")
            .await
            .unwrap();

        let store = CsvRowStore::new(&path);
        let range = RowRange::new(None, Column::from_index(0), 1, 3).unwrap();
        let rows = store.read(&range).await.unwrap();
        assert_eq!(rows, vec![vec!["company"], vec!["Acme"], vec!["Globex"]]);

        let address = CellAddress::new(None, Column::from_index(1), 3).unwrap();
        store
            .write(&address, &["yes".to_string(), "widgets".to_string()])
            .await
            .unwrap();

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(text, "company,found,summary\nAcme,,\nGlobex,yes,widgets\n");
    }

    #[tokio::test]
    async fn test_csv_store_blank_line_in_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("companies.csv");
        tokio::fs::write(&path, "Company\r\nAcme\r\n\r\nGlobex\r\n")
            .await
            .unwrap();

        let store = CsvRowStore::new(&path);
        let range = RowRange::new(None, Column::from_index(0), 1, 4).unwrap();
        let rows = store.read(&range).await.unwrap();
        assert_eq!(
            rows,
            vec![
                vec!["Company".to_string()],
                vec!["Acme".to_string()],
                vec![],
                vec!["Globex".to_string()],
            ]
        );

        let address = CellAddress::new(None, Column::from_index(1), 4).unwrap();
        store
            .write(&address, &["x".to_string(), "y".to_string()])
            .await
            .unwrap();

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(text, "Company\nAcme\n\nGlobex,x,y\n");
        assert_eq!(store.read(&range).await.unwrap()[3], vec!["Globex".to_string()]);
    }

    #[tokio::test]
    async fn test_csv_store_blank_line_before_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("companies.csv");
        tokio::fs::write(&path, "\nCompany\nAcme\n").await.unwrap();

        let store = CsvRowStore::new(&path);
        let range = RowRange::new(None, Column::from_index(0), 2, 3).unwrap();
        let rows = store.read(&range).await.unwrap();
        assert_eq!(rows, vec![vec!["Company".to_string()], vec!["Acme".to_string()]]);

        let address = CellAddress::new(None, Column::from_index(1), 3).unwrap();
        store.write(&address, &["found".to_string()]).await.unwrap();

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(text, "\nCompany\nAcme,found\n");
    }

    #[tokio::test]
    async fn test_csv_store_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvRowStore::new(dir.path().join("nope.csv"));
        let range = RowRange::new(None, Column::from_index(0), 1, 3).unwrap();

        let err = store.read(&range).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_memory_store_records_writes() {
        let store = MemoryRowStore::from_column(&["company", "Acme"]);
        let address = CellAddress::new(None, Column::from_index(2), 2).unwrap();
        store.write(&address, &["x".to_string()]).await.unwrap();

        assert_eq!(store.writes().await.len(), 1);
        assert_eq!(store.cell(2, 2).await.as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_memory_store_failures() {
        let store = MemoryRowStore::from_column(&["company"])
            .with_failing_reads()
            .with_failing_writes();
        let range = RowRange::new(None, Column::from_index(0), 1, 1).unwrap();
        let address = range.cell(Column::from_index(1), 1).unwrap();

        assert!(store.read(&range).await.is_err());
        assert!(store.write(&address, &[]).await.is_err());
        assert!(store.writes().await.is_empty());
    }
}
