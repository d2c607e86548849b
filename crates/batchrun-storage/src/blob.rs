//! Whole-document stores.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::StorageError;

/// Reads and writes whole documents by path.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read the full content at `path`.
    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Replace the content at `path`.
    async fn write(&self, path: &str, content: &[u8]) -> Result<(), StorageError>;

    /// Human-readable location of `path`, for logs.
    fn describe(&self, path: &str) -> String;

    /// Read `path` as UTF-8 text.
    async fn read_text(&self, path: &str) -> Result<String, StorageError> {
        let bytes = self.read(path).await?;
        String::from_utf8(bytes).map_err(|_| StorageError::Encoding(self.describe(path)))
    }
}

/// Files on the local filesystem, optionally under a root directory.
#[derive(Debug, Clone, Default)]
pub struct LocalBlobStore {
    root: Option<PathBuf>,
}

impl LocalBlobStore {
    /// Paths are used as given (relative to the working directory).
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths are resolved under `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path.trim_start_matches('/')),
            None => PathBuf::from(path),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let full = self.resolve(path);
        debug!(path = %full.display(), "Reading local blob");
        tokio::fs::read(&full).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(full.display().to_string())
            } else {
                StorageError::Io(e)
            }
        })
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        let full = self.resolve(path);
        debug!(path = %full.display(), bytes = content.len(), "Writing local blob");
        if let Some(parent) = full.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&full, content).await?;
        Ok(())
    }

    fn describe(&self, path: &str) -> String {
        self.resolve(path).display().to_string()
    }
}

/// In-memory store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    writes: Mutex<u32>,
    fail_writes: bool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes all fail with [`StorageError::Unavailable`].
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    /// Seed a document.
    pub async fn insert(&self, path: &str, content: impl Into<Vec<u8>>) {
        self.blobs
            .lock()
            .await
            .insert(path.to_string(), content.into());
    }

    pub async fn get_text(&self, path: &str) -> Option<String> {
        self.blobs
            .lock()
            .await
            .get(path)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Number of successful writes so far.
    pub async fn write_count(&self) -> u32 {
        *self.writes.lock().await
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.blobs
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(self.describe(path)))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Unavailable(self.describe(path)));
        }
        self.blobs
            .lock()
            .await
            .insert(path.to_string(), content.to_vec());
        *self.writes.lock().await += 1;
        Ok(())
    }

    fn describe(&self, path: &str) -> String {
        format!("memory://{}", path)
    }
}
