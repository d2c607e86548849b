//! Delimited (CSV) source parsing.

use tracing::warn;

use crate::error::StorageError;

/// First field of every data row of a CSV document.
///
/// The first row is a header and is skipped. Rows whose first field is blank
/// (empty or whitespace only) are dropped; a warning is logged when the rest
/// of such a row is not blank. Kept fields are returned verbatim.
pub fn first_column(text: &str) -> Result<Vec<String>, StorageError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut values = Vec::new();
    for (n, record) in reader.records().enumerate() {
        let record = record?;
        match record.get(0) {
            Some(first) if !first.trim().is_empty() => values.push(first.to_string()),
            _ => {
                if record.iter().any(|f| !f.trim().is_empty()) {
                    // n counts data rows; +2 for the header and 1-based lines
                    warn!(line = n + 2, "Skipping row with blank first field");
                }
            }
        }
    }
    Ok(values)
}
