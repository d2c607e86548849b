//! End-of-batch summary.

use batchrun_core::{BatchId, TaskOutcome};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters collected while the driver runs.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: BatchId,
    /// Items read from the source.
    pub items: usize,
    /// Records appended to the aggregate log.
    pub recorded: usize,
    pub completed: usize,
    pub failed: usize,
    /// Blank rows recorded without an invocation.
    pub skipped: usize,
    /// Records that carried a non-empty result line.
    pub with_payload: usize,
    pub row_writes: usize,
    pub row_write_failures: usize,
    /// Row cursor after the last item.
    pub next_row: Option<u32>,
    pub destination: String,
    pub bytes_written: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchReport {
    pub fn start(batch_id: BatchId, items: usize, destination: impl Into<String>) -> Self {
        Self {
            batch_id,
            items,
            recorded: 0,
            completed: 0,
            failed: 0,
            skipped: 0,
            with_payload: 0,
            row_writes: 0,
            row_write_failures: 0,
            next_row: None,
            destination: destination.into(),
            bytes_written: 0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn count_outcome(&mut self, outcome: &TaskOutcome) {
        match outcome {
            TaskOutcome::Completed => self.completed += 1,
            TaskOutcome::Failed(_) => self.failed += 1,
        }
    }

    pub fn finish(&mut self, bytes_written: usize) {
        self.bytes_written = bytes_written;
        self.finished_at = Some(Utc::now());
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}
