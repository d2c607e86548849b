//! Per-item result records and the aggregate log.

use serde::{Deserialize, Serialize};

/// Field delimiter inside a result line and between identifier and payload.
pub const FIELD_DELIMITER: char = '\t';

/// The captured result of one work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub item_identifier: String,
    /// First line written by the executor, without its terminator.
    /// Empty when nothing was written.
    pub raw_line: String,
}

impl ResultRecord {
    pub fn new(item_identifier: impl Into<String>, raw_line: impl Into<String>) -> Self {
        Self {
            item_identifier: item_identifier.into(),
            raw_line: raw_line.into(),
        }
    }

    /// Record for an item whose executor wrote nothing.
    pub fn empty(item_identifier: impl Into<String>) -> Self {
        Self::new(item_identifier, String::new())
    }

    pub fn has_payload(&self) -> bool {
        !self.raw_line.is_empty()
    }

    /// Tab-separated fields of the payload, at most `max` of them.
    ///
    /// An empty payload is a single empty field, so writing it clears the
    /// first output cell rather than leaving a stale value behind.
    pub fn fields(&self, max: usize) -> Vec<&str> {
        self.raw_line.split(FIELD_DELIMITER).take(max).collect()
    }

    /// `identifier<TAB>raw_line`, without a trailing newline.
    pub fn to_line(&self) -> String {
        format!(
            "{}{}{}",
            self.item_identifier, FIELD_DELIMITER, self.raw_line
        )
    }
}

/// Ordered, append-only collection of result records for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateLog {
    records: Vec<ResultRecord>,
}

impl AggregateLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return a reference to it.
    pub fn append(&mut self, record: ResultRecord) -> &ResultRecord {
        let index = self.records.len();
        self.records.push(record);
        &self.records[index]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ResultRecord] {
        &self.records
    }

    /// Render as a document: one newline-terminated line per record.
    ///
    /// An empty log renders as the empty string.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for record in &self.records {
            out.push_str(&record.to_line());
            out.push('\n');
        }
        out
    }
}
