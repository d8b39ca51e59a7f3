use csv::ReaderBuilder;
use encoding_rs::SHIFT_JIS;
use std::{io::Cursor, path::Path};

use crate::error::{Result, ScrapeError};

/// True when `bytes` decode as Shift_JIS without replacement characters.
pub fn is_shift_jis(bytes: &[u8]) -> bool {
    SHIFT_JIS
        .decode_without_bom_handling_and_without_replacement(bytes)
        .is_some()
}

/// Untyped rectangular view of a spreadsheet export. Short rows are padded
/// with empty cells to the width of the widest row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    rows: Vec<Vec<String>>,
    width: usize,
}

impl Grid {
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        let rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, String::new());
                r
            })
            .collect();
        Self { rows, width }
    }

    /// Decode Shift_JIS bytes and split them into records. `path` is only
    /// used for error reporting.
    pub fn from_shift_jis(bytes: &[u8], path: &Path) -> Result<Self> {
        let (text, _, had_errors) = SHIFT_JIS.decode(bytes);
        if had_errors {
            return Err(ScrapeError::EncodingFailure {
                path: path.to_path_buf(),
            });
        }
        Self::from_csv_text(&text, path)
    }

    pub fn from_csv_text(text: &str, path: &Path) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(Cursor::new(text.as_bytes()));

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| ScrapeError::csv(path, e))?;
            rows.push(record.iter().map(str::to_string).collect());
        }
        Ok(Self::from_rows(rows))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn row(&self, idx: usize) -> Option<&[String]> {
        self.rows.get(idx).map(Vec::as_slice)
    }

    pub fn rows(&self) -> impl Iterator<Item = &[String]> {
        self.rows.iter().map(Vec::as_slice)
    }
}

/// Trimmed cell text, `""` when the column does not exist.
pub fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(|s| s.trim()).unwrap_or("")
}
