//! In-memory cell grid shared by the local row stores.

use batchrun_core::{CellAddress, RowRange};

use crate::error::StorageError;

/// Rows of cells, row 1 at index 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    rows: Vec<Vec<String>>,
}

impl Grid {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn cell(&self, row: u32, column: u32) -> Option<&str> {
        self.rows
            .get(row.checked_sub(1)? as usize)?
            .get(column as usize)
            .map(String::as_str)
    }

    /// Values of `range`, shaped the way the Sheets values API returns them:
    /// blank cells are omitted from the end of each row, blank rows from the
    /// end of the result, and an interior blank row is an empty vec.
    pub fn read_range(&self, range: &RowRange) -> Vec<Vec<String>> {
        let column = range.column.index();
        let mut out: Vec<Vec<String>> = (range.start_row..=range.end_row)
            .map(|row| match self.cell(row, column) {
                Some(value) if !value.is_empty() => vec![value.to_string()],
                _ => Vec::new(),
            })
            .collect();
        while out.last().is_some_and(|r| r.is_empty()) {
            out.pop();
        }
        out
    }

    /// Write `fields` left to right starting at `address`, growing the grid.
    pub fn write_row(&mut self, address: &CellAddress, fields: &[String]) {
        let row_idx = (address.row.max(1) - 1) as usize;
        if self.rows.len() <= row_idx {
            self.rows.resize_with(row_idx + 1, Vec::new);
        }
        let row = &mut self.rows[row_idx];
        let start = address.column.index() as usize;
        let needed = start + fields.len();
        if row.len() < needed {
            row.resize(needed, String::new());
        }
        for (offset, value) in fields.iter().enumerate() {
            row[start + offset] = value.clone();
        }
    }

    /// Parse CSV text without treating any row as a header.
    ///
    /// The csv reader skips blank lines; they are put back as empty rows so
    /// row numbers keep matching the lines of the file. A quoted field that
    /// spans several lines is still one row.
    pub fn from_csv(text: &str) -> Result<Self, StorageError> {
        let bytes = text.as_bytes();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);
        let mut rows = Vec::new();
        let mut record = csv::StringRecord::new();
        // End of the previous record, and whether its terminator was consumed
        let mut previous: Option<(usize, bool)> = None;
        while reader.read_record(&mut record)? {
            let (from, terminated) = previous.unwrap_or((0, true));
            let breaks = count_line_breaks(bytes, from);
            let blank = if terminated {
                breaks
            } else {
                breaks.saturating_sub(1)
            };
            rows.extend(std::iter::repeat_with(Vec::new).take(blank));
            rows.push(record.iter().map(str::to_string).collect());

            let end = (reader.position().byte() as usize).min(bytes.len());
            let terminated = end > 0 && matches!(bytes[end - 1], b'\r' | b'\n');
            previous = Some((end, terminated));
        }
        Ok(Self { rows })
    }

    /// Serialize the grid; empty rows become blank lines.
    pub fn to_csv(&self) -> Result<Vec<u8>, StorageError> {
        let mut builder = csv::WriterBuilder::new();
        builder.flexible(true);
        let mut writer = builder.from_writer(Vec::new());
        for row in &self.rows {
            if row.is_empty() {
                // The csv writer rejects zero-field records
                let mut buf = writer
                    .into_inner()
                    .map_err(|e| StorageError::Serialization(e.to_string()))?;
                buf.push(b'\n');
                writer = builder.from_writer(buf);
            } else {
                writer.write_record(row)?;
            }
        }
        writer
            .into_inner()
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

/// Line breaks in the run of `\r`/`\n` bytes starting at `from`, counting
/// `\r\n` once.
fn count_line_breaks(bytes: &[u8], from: usize) -> usize {
    let mut breaks = 0;
    let mut i = from;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' => breaks += 1,
            // Second half of a CRLF pair
            b'\n' if i > 0 && bytes[i - 1] == b'\r' => {}
            b'\n' => breaks += 1,
            _ => break,
        }
        i += 1;
    }
    breaks
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchrun_core::Column;

    fn range(start: u32, end: u32) -> RowRange {
        RowRange::new(None, Column::from_index(0), start, end).unwrap()
    }

    #[test]
    fn test_read_range_shape() {
        let grid = Grid::from_csv("name\nAcme\n\"\"\nGlobex\n").unwrap();
        let values = grid.read_range(&range(1, 10));
        assert_eq!(
            values,
            vec![
                vec!["name".to_string()],
                vec!["Acme".to_string()],
                vec![],
                vec!["Globex".to_string()],
            ]
        );
    }

    #[test]
    fn test_write_row_grows_grid() {
        let mut grid = Grid::default();
        let address = CellAddress::new(None, "C".parse().unwrap(), 3).unwrap();
        grid.write_row(&address, &["yes".to_string(), "anvils".to_string()]);

        assert_eq!(grid.rows().len(), 3);
        assert_eq!(grid.cell(3, 2), Some("yes"));
        assert_eq!(grid.cell(3, 3), Some("anvils"));
        assert_eq!(grid.cell(3, 0), Some(""));
    }

    #[test]
    fn test_csv_round_trip_keeps_quoted_cells() {
        let grid = Grid::from_csv("name,notes\n\"Acme, Inc.\",\"multi\nline\"\n").unwrap();
        assert_eq!(grid.cell(2, 0), Some("Acme, Inc."));

        let text = String::from_utf8(grid.to_csv().unwrap()).unwrap();
        assert_eq!(Grid::from_csv(&text).unwrap(), grid);
    }

    fn column(values: &[&str]) -> Vec<Vec<String>> {
        values
            .iter()
            .map(|v| {
                if v.is_empty() {
                    Vec::new()
                } else {
                    vec![v.to_string()]
                }
            })
            .collect()
    }

    #[test]
    fn test_blank_lines_keep_row_numbers() {
        let grid = Grid::from_csv("\nCompany\nAcme\n\nGlobex\n").unwrap();
        assert_eq!(grid.rows(), column(&["", "Company", "Acme", "", "Globex"]).as_slice());

        let grid = Grid::from_csv("Company\r\nAcme\r\n\r\nGlobex\r\n").unwrap();
        assert_eq!(grid.rows(), column(&["Company", "Acme", "", "Globex"]).as_slice());
        assert_eq!(grid.cell(4, 0), Some("Globex"));
    }

    #[test]
    fn test_multiline_field_is_one_row() {
        let grid = Grid::from_csv("name\n\"two\nlines\"\n\nGlobex\n").unwrap();
        assert_eq!(grid.rows().len(), 4);
        assert_eq!(grid.cell(2, 0), Some("two\nlines"));
        assert!(grid.rows()[2].is_empty());
        assert_eq!(grid.cell(4, 0), Some("Globex"));
    }

    #[test]
    fn test_write_keeps_blank_lines() {
        let mut grid = Grid::from_csv("Company\r\nAcme\r\n\r\nGlobex\r\n").unwrap();
        let address = CellAddress::new(None, Column::from_index(1), 4).unwrap();
        grid.write_row(&address, &["x".to_string(), "y".to_string()]);

        let text = String::from_utf8(grid.to_csv().unwrap()).unwrap();
        assert_eq!(text, "Company\nAcme\n\nGlobex,x,y\n");
        assert_eq!(Grid::from_csv(&text).unwrap(), grid);
    }
}
