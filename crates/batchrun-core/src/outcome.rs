//! Executor outcomes.

use serde::{Deserialize, Serialize};

/// Status reported by an executor for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum TaskOutcome {
    /// The executor ran the task to completion.
    Completed,
    /// The executor gave up or crashed.
    Failed(String),
}

impl TaskOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Short label for logs and events.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed(_) => "failed",
        }
    }
}

/// Reclassifies raised executor errors as completion.
///
/// Some executors can only report "done" by raising an error whose message
/// carries a marker word. Matching is a case-insensitive substring test, so a
/// genuine failure that happens to mention the marker is misread as success.
/// Prefer executors that return [`TaskOutcome`] directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionSentinel {
    needle: String,
}

impl CompletionSentinel {
    /// Returns `None` for an empty marker, which would match everything.
    pub fn new(marker: &str) -> Option<Self> {
        let needle = marker.to_lowercase();
        if needle.trim().is_empty() {
            None
        } else {
            Some(Self { needle })
        }
    }

    pub fn matches(&self, message: &str) -> bool {
        message.to_lowercase().contains(&self.needle)
    }

    /// Map a raised error message to an outcome.
    pub fn classify(sentinel: Option<&Self>, message: &str) -> TaskOutcome {
        match sentinel {
            Some(s) if s.matches(message) => TaskOutcome::Completed,
            _ => TaskOutcome::Failed(message.to_string()),
        }
    }
}
