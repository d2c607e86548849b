//! Work items read from a batch source.

use serde::{Deserialize, Serialize};

/// One unit of batch input.
///
/// `identifier` is the value substituted into the prompt template.
/// `row_index` is only set when the source is row-addressed, and is the
/// 1-based row the item was read from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    identifier: String,
    row_index: Option<u32>,
}

impl WorkItem {
    /// Item from a source without row addresses (e.g. a CSV blob).
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            row_index: None,
        }
    }

    /// Item read from a specific row of a row-addressed store.
    pub fn at_row(identifier: impl Into<String>, row_index: u32) -> Self {
        Self {
            identifier: identifier.into(),
            row_index: Some(row_index),
        }
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn row_index(&self) -> Option<u32> {
        self.row_index
    }

    /// True for placeholder items standing in for blank source rows.
    pub fn is_blank(&self) -> bool {
        self.identifier.trim().is_empty()
    }
}
