// src/merge/mod.rs

use glob::{glob, Pattern};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};
use tracing::{error, info, instrument, warn};

use crate::bulletin::{BulletinId, CleanFileName, DataType};
use crate::calendar::{week_dates, WeekSpan};
use crate::config::DataLayout;
use crate::error::{Result, ScrapeError};
use crate::process::CleanTable;

pub mod columnar;

pub const YEAR_COLUMN: &str = "年";
pub const WEEK_COLUMN: &str = "週";
pub const MONTH_COLUMN: &str = "月";
pub const START_DATE_COLUMN: &str = "開始日";
pub const END_DATE_COLUMN: &str = "終了日";

/// Result of one merge pass over a data type.
#[derive(Debug)]
pub enum MergeOutcome {
    /// No processed files exist.
    NothingToMerge,
    /// Files exist but none could be read.
    NothingRead { failed: usize },
    Merged(MergeSummary),
}

#[derive(Debug, Clone)]
pub struct MergeSummary {
    pub files_found: usize,
    pub files_merged: usize,
    pub files_failed: usize,
    pub rows: usize,
    pub columns: Vec<String>,
    pub csv_path: PathBuf,
    pub csv_bytes: u64,
    pub parquet_path: PathBuf,
    /// Size of the Parquet output, or why it could not be written.
    pub parquet: std::result::Result<u64, String>,
}

impl MergeSummary {
    /// Percentage by which the Parquet output is smaller than the CSV.
    /// `None` when no Parquet file was written.
    pub fn compression_ratio(&self) -> Option<f64> {
        let parquet_bytes = *self.parquet.as_ref().ok()?;
        if self.csv_bytes == 0 {
            return Some(0.0);
        }
        Some((1.0 - parquet_bytes as f64 / self.csv_bytes as f64) * 100.0)
    }
}

/// Processed files of `data_type`, sorted by name.
pub fn discover(processed_dir: &Path, data_type: DataType) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/*-{}-clean.csv",
        Pattern::escape(&processed_dir.to_string_lossy()),
        data_type
    );
    let entries = glob(&pattern).map_err(|e| ScrapeError::MergeReadFailure {
        path: processed_dir.to_path_buf(),
        message: e.to_string(),
    })?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "unreadable directory entry");
                None
            }
        })
        .collect();
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(paths)
}

/// Suffix repeated header names with `.1`, `.2`, ... so every column is addressable.
pub fn dedupe_headers(headers: &mut [String]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for h in headers.iter_mut() {
        let count = seen.entry(h.clone()).or_insert(0);
        if *count > 0 {
            *h = format!("{}.{}", h, count);
        }
        *count += 1;
    }
}

/// Insert year and week (when absent) and the calendar columns.
pub fn annotate(table: &mut CleanTable, id: &BulletinId, span: &WeekSpan) {
    if !table.has_column(YEAR_COLUMN) {
        table.insert_column(0, YEAR_COLUMN, &id.year.to_string());
    }
    if !table.has_column(WEEK_COLUMN) {
        table.insert_column(1, WEEK_COLUMN, &id.week.to_string());
    }
    table.insert_column(2, MONTH_COLUMN, &span.month.to_string());
    table.insert_column(3, START_DATE_COLUMN, &span.start_str());
    table.insert_column(4, END_DATE_COLUMN, &span.end_str());
}

/// Concatenate tables under the union of their columns, in first-seen order.
/// Cells of columns a table lacks are empty.
pub fn concat(tables: Vec<CleanTable>) -> CleanTable {
    let mut headers: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for table in &tables {
        for h in &table.headers {
            if !index.contains_key(h) {
                index.insert(h.clone(), headers.len());
                headers.push(h.clone());
            }
        }
    }

    let width = headers.len();
    let mut rows = Vec::with_capacity(tables.iter().map(|t| t.rows.len()).sum());
    for table in tables {
        let positions: Vec<usize> = table.headers.iter().map(|h| index[h]).collect();
        for row in table.rows {
            let mut out = vec![String::new(); width];
            for (value, &pos) in row.into_iter().zip(&positions) {
                out[pos] = value;
            }
            rows.push(out);
        }
    }
    CleanTable { headers, rows }
}

fn load_annotated(path: &Path, names: &CleanFileName) -> Result<CleanTable> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let id = names
        .parse(file_name)
        .ok_or_else(|| ScrapeError::MergeReadFailure {
            path: path.to_path_buf(),
            message: "file name is not <year>-<week>-<type>-clean.csv".into(),
        })?;
    let span = week_dates(id.year, id.week as i32)?;

    let mut table = CleanTable::read_csv(path).map_err(|e| match e {
        e @ ScrapeError::MergeReadFailure { .. } => e,
        other => ScrapeError::MergeReadFailure {
            path: path.to_path_buf(),
            message: other.to_string(),
        },
    })?;
    dedupe_headers(&mut table.headers);
    annotate(&mut table, &id, &span);
    Ok(table)
}

/// Merge every processed file of `data_type` into `merged_<type>.csv` and
/// `merged_<type>.parquet`. Unreadable files are logged and left out.
#[instrument(level = "info", skip(layout))]
pub fn merge_all(layout: &DataLayout, data_type: DataType) -> Result<MergeOutcome> {
    let files = discover(&layout.processed_dir(data_type), data_type)?;
    if files.is_empty() {
        warn!("no processed files found");
        return Ok(MergeOutcome::NothingToMerge);
    }
    info!(files = files.len(), "found processed files");

    let names = CleanFileName::new();
    let mut tables = Vec::with_capacity(files.len());
    let mut failed = 0;
    for path in &files {
        match load_annotated(path, &names) {
            Ok(table) => tables.push(table),
            Err(e) => {
                warn!(file = %path.display(), error = %e, "skipping unreadable file");
                failed += 1;
            }
        }
    }
    if tables.is_empty() {
        warn!(failed, "no file could be read");
        return Ok(MergeOutcome::NothingRead { failed });
    }

    let files_merged = tables.len();
    info!(tables = files_merged, "merging");
    let merged = concat(tables);

    let csv_path = layout.merged_csv(data_type);
    let parquet_path = layout.merged_parquet(data_type);
    let size = |p: &Path| fs::metadata(p).map(|m| m.len()).map_err(|e| ScrapeError::io(p, e));
    merged.write_csv(&csv_path)?;
    info!(file = %csv_path.display(), "wrote merged csv");
    let parquet = columnar::write_parquet(&merged, &parquet_path)
        .and_then(|()| size(&parquet_path))
        .map_err(|e| {
            error!(file = %parquet_path.display(), error = %e, "parquet write failed");
            e.to_string()
        });

    let summary = MergeSummary {
        files_found: files.len(),
        files_merged,
        files_failed: failed,
        rows: merged.rows.len(),
        columns: merged.headers,
        csv_bytes: size(&csv_path)?,
        parquet,
        csv_path,
        parquet_path,
    };
    info!(
        rows = summary.rows,
        columns = summary.columns.len(),
        csv_bytes = summary.csv_bytes,
        parquet_bytes = summary.parquet.as_ref().ok(),
        "merge completed"
    );
    Ok(MergeOutcome::Merged(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn table(headers: &[&str], rows: &[&[&str]]) -> CleanTable {
        CleanTable {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    fn write(dir: &Path, name: &str, t: &CleanTable) {
        fs::create_dir_all(dir).unwrap();
        t.write_csv(&dir.join(name)).unwrap();
    }

    #[test]
    fn test_concat_union_of_columns() {
        let merged = concat(vec![
            table(&["A", "B"], &[&["a1", "b1"]]),
            table(&["A", "C"], &[&["a2", "c2"]]),
        ]);
        assert_eq!(merged.headers, vec!["A", "B", "C"]);
        assert_eq!(merged.rows[0], vec!["a1", "b1", ""]);
        assert_eq!(merged.rows[1], vec!["a2", "", "c2"]);
    }

    #[test]
    fn test_annotate_standard_table() {
        let mut t = table(&["年", "週", "都道府県"], &[&["2023", "1", "北海道"]]);
        let id = BulletinId::new(2023, 1, DataType::Zensu);
        annotate(&mut t, &id, &week_dates(2023, 1).unwrap());
        assert_eq!(t.headers, vec!["年", "週", "月", "開始日", "終了日", "都道府県"]);
        assert_eq!(t.rows[0], vec!["2023", "1", "1", "2023-01-02", "2023-01-08", "北海道"]);
    }

    #[test]
    fn test_annotate_without_year_or_week() {
        let mut t = table(&["都道府県"], &[&["沖縄県"]]);
        let id = BulletinId::new(2020, 53, DataType::Teiten);
        annotate(&mut t, &id, &week_dates(2020, 53).unwrap());
        assert_eq!(t.headers, vec!["年", "週", "月", "開始日", "終了日", "都道府県"]);
        assert_eq!(t.rows[0], vec!["2020", "53", "12", "2020-12-28", "2021-01-03", "沖縄県"]);
    }

    #[test]
    fn test_dedupe_headers() {
        let mut h: Vec<String> = ["A", "B", "A", "A"].map(String::from).to_vec();
        dedupe_headers(&mut h);
        assert_eq!(h, vec!["A", "B", "A.1", "A.2"]);
    }

    #[test]
    fn test_merge_union_and_calendar() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let layout = DataLayout::new(dir.path());
        let processed = layout.processed_dir(DataType::Zensu);
        write(
            &processed,
            "2024-01-zensu-clean.csv",
            &table(&["年", "週", "都道府県", "A"], &[&["2024", "1", "北海道", "1"]]),
        );
        write(
            &processed,
            "2024-02-zensu-clean.csv",
            &table(&["年", "週", "都道府県", "B"], &[&["2024", "2", "青森県", "2"]]),
        );

        let MergeOutcome::Merged(summary) = merge_all(&layout, DataType::Zensu)? else {
            panic!("expected a merge");
        };
        assert_eq!(summary.files_merged, 2);
        assert_eq!(summary.rows, 2);
        assert_eq!(
            summary.columns,
            vec!["年", "週", "月", "開始日", "終了日", "都道府県", "A", "B"]
        );

        let csv = fs::read_to_string(layout.merged_csv(DataType::Zensu))?;
        assert_eq!(
            csv,
            "年,週,月,開始日,終了日,都道府県,A,B\n\
             2024,1,1,2024-01-01,2024-01-07,北海道,1,\n\
             2024,2,1,2024-01-08,2024-01-14,青森県,,2\n"
        );
        assert!(layout.merged_parquet(DataType::Zensu).exists());
        assert!(matches!(summary.parquet, Ok(n) if n > 0));
        assert!(summary.compression_ratio().is_some());
        Ok(())
    }

    #[test]
    fn test_merge_is_idempotent() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let layout = DataLayout::new(dir.path());
        let processed = layout.processed_dir(DataType::Trend);
        write(
            &processed,
            "2023-33-trend-clean.csv",
            &table(
                &["報告年", "報告週", "疾病", "年", "31週"],
                &[&["2023", "33", "A", "2013", "10"]],
            ),
        );
        write(
            &processed,
            "2023-34-trend-clean.csv",
            &table(&["報告年", "報告週", "疾病", "年"], &[]),
        );

        merge_all(&layout, DataType::Trend)?;
        let first = fs::read(layout.merged_csv(DataType::Trend))?;
        merge_all(&layout, DataType::Trend)?;
        let second = fs::read(layout.merged_csv(DataType::Trend))?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn test_unreadable_file_is_skipped() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let layout = DataLayout::new(dir.path());
        let processed = layout.processed_dir(DataType::Ari);
        write(
            &processed,
            "2025-15-ari-clean.csv",
            &table(&["都道府県", "X"], &[&["東京都", "3"]]),
        );
        fs::write(processed.join("2025-16-ari-clean.csv"), "")?;

        let MergeOutcome::Merged(summary) = merge_all(&layout, DataType::Ari)? else {
            panic!("expected a merge");
        };
        assert_eq!(summary.files_found, 2);
        assert_eq!(summary.files_merged, 1);
        assert_eq!(summary.files_failed, 1);
        Ok(())
    }

    #[test]
    fn test_parquet_failure_keeps_csv_result() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let layout = DataLayout::new(dir.path());
        let processed = layout.processed_dir(DataType::Zensu);
        write(
            &processed,
            "2024-01-zensu-clean.csv",
            &table(&["都道府県", "A"], &[&["北海道", "1"]]),
        );
        // a directory in the way makes the final rename fail
        let parquet_path = layout.merged_parquet(DataType::Zensu);
        fs::create_dir_all(&parquet_path)?;

        let MergeOutcome::Merged(summary) = merge_all(&layout, DataType::Zensu)? else {
            panic!("expected a merge");
        };
        assert!(summary.parquet.is_err());
        assert_eq!(summary.compression_ratio(), None);
        assert!(summary.csv_bytes > 0);
        assert!(layout.merged_csv(DataType::Zensu).exists());
        assert!(!parquet_path.with_extension("parquet.tmp").exists());
        Ok(())
    }

    #[test]
    fn test_discover_in_dir_with_glob_characters() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let layout = DataLayout::new(dir.path().join("data[1]*"));
        let processed = layout.processed_dir(DataType::Teiten);
        write(
            &processed,
            "2024-02-teiten-clean.csv",
            &table(&["都道府県"], &[&["沖縄県"]]),
        );
        write(
            &processed,
            "2024-01-teiten-clean.csv",
            &table(&["都道府県"], &[&["東京都"]]),
        );

        let found = discover(&processed, DataType::Teiten)?;
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["2024-01-teiten-clean.csv", "2024-02-teiten-clean.csv"]);
        assert!(matches!(
            merge_all(&layout, DataType::Teiten)?,
            MergeOutcome::Merged(_)
        ));
        Ok(())
    }

    #[test]
    fn test_nothing_to_merge() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let layout = DataLayout::new(dir.path());
        assert!(matches!(
            merge_all(&layout, DataType::Teiten)?,
            MergeOutcome::NothingToMerge
        ));
        assert!(!layout.merged_csv(DataType::Teiten).exists());
        Ok(())
    }

    #[test]
    fn test_nothing_read() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let layout = DataLayout::new(dir.path());
        let processed = layout.processed_dir(DataType::Teiten);
        fs::create_dir_all(&processed)?;
        fs::write(processed.join("2024-01-teiten-clean.csv"), "")?;
        assert!(matches!(
            merge_all(&layout, DataType::Teiten)?,
            MergeOutcome::NothingRead { failed: 1 }
        ));
        assert!(!layout.merged_csv(DataType::Teiten).exists());
        Ok(())
    }
}
