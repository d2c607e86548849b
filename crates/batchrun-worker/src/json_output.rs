//! JSON output for streaming batch events to stdout.

use serde::Serialize;
use std::io::{self, Write};

use crate::report::BatchReport;

/// JSON event types that can be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonEventType {
    BatchStarted,
    ItemStarted,
    ItemRecorded,
    RowWriteFailed,
    BatchFlushed,
    BatchFailed,
}

/// A JSON event to be output to stdout.
#[derive(Debug, Clone, Serialize)]
pub struct JsonEvent {
    pub event: JsonEventType,
    pub timestamp: String,
    pub data: serde_json::Value,
}

impl JsonEvent {
    /// Create a new JSON event with the current timestamp.
    pub fn new(event: JsonEventType, data: serde_json::Value) -> Self {
        Self {
            event,
            timestamp: chrono::Utc::now().to_rfc3339(),
            data,
        }
    }

    /// Write this event as a single JSON line.
    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        let json = serde_json::to_string(self).map_err(io::Error::other)?;
        writeln!(out, "{}", json)?;
        out.flush()
    }
}

/// Emits batch events as JSON lines when enabled.
///
/// Passed by value into the driver; a disabled emitter does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventEmitter {
    enabled: bool,
}

impl EventEmitter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn emit(&self, event: JsonEventType, data: serde_json::Value) {
        if !self.enabled {
            return;
        }
        let mut stdout = io::stdout().lock();
        let _ = JsonEvent::new(event, data).write_to(&mut stdout);
    }

    pub fn batch_started(&self, batch_id: &str, items: usize, destination: &str) {
        self.emit(
            JsonEventType::BatchStarted,
            serde_json::json!({
                "batch_id": batch_id,
                "items": items,
                "destination": destination,
            }),
        );
    }

    pub fn item_started(&self, position: usize, identifier: &str, row: Option<u32>) {
        self.emit(
            JsonEventType::ItemStarted,
            serde_json::json!({
                "position": position,
                "identifier": identifier,
                "row": row,
            }),
        );
    }

    pub fn item_recorded(&self, position: usize, identifier: &str, outcome: &str, raw_line: &str) {
        self.emit(
            JsonEventType::ItemRecorded,
            serde_json::json!({
                "position": position,
                "identifier": identifier,
                "outcome": outcome,
                "raw_line": raw_line,
            }),
        );
    }

    pub fn row_write_failed(&self, row: u32, identifier: &str, error: &str) {
        self.emit(
            JsonEventType::RowWriteFailed,
            serde_json::json!({
                "row": row,
                "identifier": identifier,
                "error": error,
            }),
        );
    }

    pub fn batch_flushed(&self, report: &BatchReport) {
        let data = serde_json::to_value(report).unwrap_or(serde_json::Value::Null);
        self.emit(JsonEventType::BatchFlushed, data);
    }

    pub fn batch_failed(&self, error: &str) {
        self.emit(
            JsonEventType::BatchFailed,
            serde_json::json!({
                "error": error,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_line_shape() {
        let event = JsonEvent::new(
            JsonEventType::ItemRecorded,
            serde_json::json!({ "identifier": "Acme" }),
        );
        let mut buf = Vec::new();
        event.write_to(&mut buf).unwrap();

        let line = String::from_utf8(buf).unwrap();
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["event"], "item_recorded");
        assert_eq!(value["data"]["identifier"], "Acme");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_disabled_by_default() {
        assert!(!EventEmitter::default().is_enabled());
        assert!(EventEmitter::new(true).is_enabled());
    }
}
