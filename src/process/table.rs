use csv::{ReaderBuilder, WriterBuilder};
use std::{fs, path::Path};

use crate::error::{Result, ScrapeError};

/// A normalized table: one header row, every row as wide as the header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl CleanTable {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Insert a column at `idx` (clamped to the width) holding `value` in every row.
    pub fn insert_column(&mut self, idx: usize, name: &str, value: &str) {
        let idx = idx.min(self.headers.len());
        self.headers.insert(idx, name.to_string());
        for row in &mut self.rows {
            row.insert(idx.min(row.len()), value.to_string());
        }
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let col = self.column_index(column)?;
        self.rows.get(row)?.get(col).map(String::as_str)
    }

    /// Write as UTF-8 CSV through a temporary sibling, so `path` either holds
    /// the whole table or does not exist.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let tmp = path.with_extension("csv.tmp");
        if let Err(e) = self.write_records(&tmp) {
            let _ = fs::remove_file(&tmp);
            return Err(ScrapeError::csv(path, e));
        }
        fs::rename(&tmp, path).map_err(|e| ScrapeError::io(path, e))
    }

    fn write_records(&self, path: &Path) -> std::result::Result<(), csv::Error> {
        let mut wtr = WriterBuilder::new().from_path(path)?;
        wtr.write_record(&self.headers)?;
        for row in &self.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Read a UTF-8 CSV with a header row. Rows are padded or cut to the header width.
    pub fn read_csv(path: &Path) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .map_err(|e| ScrapeError::csv(path, e))?;

        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| ScrapeError::csv(path, e))?
            .iter()
            .map(str::to_string)
            .collect();
        if headers.is_empty() {
            return Err(ScrapeError::MergeReadFailure {
                path: path.to_path_buf(),
                message: "no header row".into(),
            });
        }

        let mut rows = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| ScrapeError::csv(path, e))?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }
        Ok(Self { headers, rows })
    }
}
