//! Per-task output channels and workspaces.
//!
//! Each invocation gets its own workspace directory holding a single output
//! file. The driver resets the channel before every invocation and reads
//! the first line back afterwards, whatever the executor reported.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use batchrun_core::WorkItem;
use tracing::{debug, warn};

/// File name of the output channel inside a task workspace.
pub const OUTPUT_FILE: &str = "output.tsv";

/// A slot holding at most one line of executor output.
#[async_trait]
pub trait OutputChannel: Send + Sync {
    /// Empty the channel. Idempotent.
    async fn reset(&self) -> io::Result<()>;

    /// First line without its terminator; empty when nothing was written.
    async fn read_first_line(&self) -> String;

    /// Replace the content with `line`.
    async fn write_line(&self, line: &str) -> io::Result<()>;

    /// Backing file, for executors that write it themselves.
    fn path(&self) -> Option<&Path>;
}

/// Channel backed by a file.
#[derive(Debug, Clone)]
pub struct FileChannel {
    path: PathBuf,
}

impl FileChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl OutputChannel for FileChannel {
    async fn reset(&self) -> io::Result<()> {
        tokio::fs::write(&self.path, b"").await
    }

    async fn read_first_line(&self) -> String {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => first_line(&String::from_utf8_lossy(&bytes)),
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %self.path.display(), error = %e, "Unreadable output channel");
                }
                String::new()
            }
        }
    }

    async fn write_line(&self, line: &str) -> io::Result<()> {
        tokio::fs::write(&self.path, format!("{}\n", first_line(line))).await
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or("").to_string()
}

/// A channel plus the directory the executor runs in.
pub struct TaskSlot {
    pub workspace: PathBuf,
    pub channel: Arc<dyn OutputChannel>,
}

/// Hands out a channel for each invocation.
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// Prepare the slot for the item at `position` (0-based).
    async fn open(&self, position: usize, item: &WorkItem) -> io::Result<TaskSlot>;

    /// Called once the result has been captured.
    async fn discard(&self, slot: TaskSlot);
}

/// One fresh directory per invocation under a batch root.
#[derive(Debug, Clone)]
pub struct IsolatedWorkspaces {
    root: PathBuf,
    keep: bool,
}

impl IsolatedWorkspaces {
    pub fn new(root: impl Into<PathBuf>, keep: bool) -> Self {
        Self {
            root: root.into(),
            keep,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn dir_for(&self, position: usize, item: &WorkItem) -> PathBuf {
        self.root
            .join(format!("{:05}-{}", position + 1, slug(item.identifier())))
    }

    /// Remove the batch root when workspaces are not kept.
    pub async fn close(&self) {
        if self.keep {
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(&self.root).await {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(root = %self.root.display(), error = %e, "Failed to remove workspace root");
            }
        }
    }
}

#[async_trait]
impl ChannelProvider for IsolatedWorkspaces {
    async fn open(&self, position: usize, item: &WorkItem) -> io::Result<TaskSlot> {
        let dir = self.dir_for(position, item);
        if tokio::fs::try_exists(&dir).await? {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        tokio::fs::create_dir_all(&dir).await?;
        debug!(workspace = %dir.display(), "Created task workspace");

        let channel = FileChannel::new(dir.join(OUTPUT_FILE));
        Ok(TaskSlot {
            workspace: dir,
            channel: Arc::new(channel),
        })
    }

    async fn discard(&self, slot: TaskSlot) {
        if self.keep {
            return;
        }
        if let Err(e) = tokio::fs::remove_dir_all(&slot.workspace).await {
            warn!(workspace = %slot.workspace.display(), error = %e, "Failed to remove task workspace");
        }
    }
}

/// Filesystem-safe fragment of an identifier.
fn slug(identifier: &str) -> String {
    let mut out = String::new();
    for c in identifier.chars() {
        if out.len() >= 40 {
            break;
        }
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "item".to_string()
    } else {
        trimmed.to_string()
    }
}
