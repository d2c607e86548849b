//! A1-style addressing for row-addressed stores.
//!
//! Columns are letters (`A`, `B`, ..., `Z`, `AA`, ...), rows are 1-based.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// A spreadsheet column, stored as a 0-based index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Column(u32);

impl Column {
    pub fn from_index(index: u32) -> Self {
        Self(index)
    }

    pub fn index(&self) -> u32 {
        self.0
    }

    /// Column `n` places to the right.
    pub fn offset(&self, n: u32) -> Self {
        Self(self.0 + n)
    }

    pub fn letters(&self) -> String {
        let mut n = self.0 + 1;
        let mut out = Vec::new();
        while n > 0 {
            let rem = (n - 1) % 26;
            out.push(b'A' + rem as u8);
            n = (n - 1) / 26;
        }
        out.reverse();
        String::from_utf8(out).unwrap_or_default()
    }
}

impl FromStr for Column {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.len() > 3 || !s.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CoreError::InvalidAddress(format!(
                "'{}' is not a column letter",
                s
            )));
        }
        let n = s
            .to_ascii_uppercase()
            .bytes()
            .fold(0u32, |acc, b| acc * 26 + u32::from(b - b'A' + 1));
        Ok(Self(n - 1))
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.letters())
    }
}

fn write_sheet_prefix(f: &mut fmt::Formatter<'_>, sheet: Option<&str>) -> fmt::Result {
    match sheet {
        None => Ok(()),
        Some(name) if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') => {
            write!(f, "{}!", name)
        }
        Some(name) => write!(f, "'{}'!", name.replace('\'', "''")),
    }
}

/// A single cell, optionally qualified by sheet name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellAddress {
    pub sheet: Option<String>,
    pub column: Column,
    pub row: u32,
}

impl CellAddress {
    pub fn new(sheet: Option<String>, column: Column, row: u32) -> Result<Self, CoreError> {
        if row == 0 {
            return Err(CoreError::InvalidAddress("rows are 1-based".to_string()));
        }
        Ok(Self { sheet, column, row })
    }

    /// Range covering `width` cells to the right of this one, e.g. `C5:E5`.
    ///
    /// A width of 0 or 1 renders the single cell.
    pub fn span(&self, width: usize) -> String {
        let mut out = self.to_string();
        if width > 1 {
            let last = self.column.offset(width as u32 - 1);
            out.push_str(&format!(":{}{}", last, self.row));
        }
        out
    }
}

impl fmt::Display for CellAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_sheet_prefix(f, self.sheet.as_deref())?;
        write!(f, "{}{}", self.column, self.row)
    }
}

/// Inclusive single-column row range, e.g. `Companies!A1:A250`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRange {
    pub sheet: Option<String>,
    pub column: Column,
    pub start_row: u32,
    pub end_row: u32,
}

impl RowRange {
    pub fn new(
        sheet: Option<String>,
        column: Column,
        start_row: u32,
        end_row: u32,
    ) -> Result<Self, CoreError> {
        if start_row == 0 {
            return Err(CoreError::InvalidRange("rows are 1-based".to_string()));
        }
        if end_row < start_row {
            return Err(CoreError::InvalidRange(format!(
                "end row {} is before start row {}",
                end_row, start_row
            )));
        }
        Ok(Self {
            sheet,
            column,
            start_row,
            end_row,
        })
    }

    /// Number of rows covered, header included.
    pub fn row_count(&self) -> u32 {
        self.end_row - self.start_row + 1
    }

    /// Address of a cell in the same sheet.
    pub fn cell(&self, column: Column, row: u32) -> Result<CellAddress, CoreError> {
        CellAddress::new(self.sheet.clone(), column, row)
    }
}

impl fmt::Display for RowRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_sheet_prefix(f, self.sheet.as_deref())?;
        write!(
            f,
            "{}{}:{}{}",
            self.column, self.start_row, self.column, self.end_row
        )
    }
}
