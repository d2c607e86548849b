//! Row cursor bookkeeping for row-addressed sinks.

use serde::Serialize;

/// Monotonic row address, advanced once per processed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RowCursor {
    start: u32,
    current: u32,
}

impl RowCursor {
    pub fn new(start: u32) -> Self {
        Self {
            start,
            current: start,
        }
    }

    /// Row the next write targets.
    pub fn current(&self) -> u32 {
        self.current
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    /// Number of items processed so far.
    pub fn processed(&self) -> u32 {
        self.current - self.start
    }

    /// Move to the next row; returns the row that was current.
    pub fn advance(&mut self) -> u32 {
        let row = self.current;
        self.current = self.current.saturating_add(1);
        row
    }
}
