//! Trend sheets: one block per disease, each block a week-number header row
//! followed by one row per historical year.
//!
//! ```text
//! 注：...
//! 2015年〜2024年
//! インフルエンザ
//! ,31週,32週,...
//! 13年,10,20,...
//! 2023年,30,40,...
//! ```

use std::path::Path;

use super::{
    grid::{cell, Grid},
    table::CleanTable,
};
use crate::error::Result;

pub const REPORT_YEAR_COLUMN: &str = "報告年";
pub const REPORT_WEEK_COLUMN: &str = "報告週";
pub const DISEASE_COLUMN: &str = "疾病";
pub const YEAR_COLUMN: &str = "年";

const WEEK_SUFFIX: char = '週';
const YEAR_SUFFIX: char = '年';
const NOTE_PREFIX: &str = "注";
const DISEASE_HEADER_PREFIX: &str = "疾病";
const YEAR_RANGE_MARKERS: [&str; 2] = ["年〜", "年～"];
const MISSING_VALUE: &str = "-";

/// Two-digit historical years below this are 20xx, the rest 19xx.
pub const TWO_DIGIT_YEAR_PIVOT: u32 = 50;

/// One week-number column of the current disease block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeekColumn {
    pub index: usize,
    pub week: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TrendState {
    #[default]
    NoDisease,
    DiseaseWithWeeks {
        disease: String,
        weeks: Vec<WeekColumn>,
    },
}

/// What a single row is, judged from its own cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowKind {
    /// Blank first cell, a note, or the column-title row.
    Skip,
    /// `2015年〜2024年` style section banner.
    Banner,
    /// Row of `<n>週` labels.
    WeekHeader,
    DiseaseName(String),
    /// Historical-year row carrying the expanded year label.
    Data(String),
}

/// One emitted row before it is laid out against the table header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendRecord {
    pub disease: String,
    pub year: String,
    pub values: Vec<(String, String)>,
}

fn has_week_label(row: &[String], idx: usize) -> bool {
    cell(row, idx).contains(WEEK_SUFFIX)
}

pub fn classify(row: &[String]) -> RowKind {
    let first = cell(row, 0);
    if first.is_empty() || first.starts_with(NOTE_PREFIX) || first.starts_with(DISEASE_HEADER_PREFIX)
    {
        return RowKind::Skip;
    }
    if YEAR_RANGE_MARKERS.iter().any(|m| first.contains(m)) {
        return RowKind::Banner;
    }
    if has_week_label(row, 1) {
        return RowKind::WeekHeader;
    }
    match first.strip_suffix(YEAR_SUFFIX) {
        Some(prefix) => RowKind::Data(expand_year(prefix.trim())),
        None => RowKind::DiseaseName(first.to_string()),
    }
}

/// `13` → `2013`, `98` → `1998`. Anything other than two ASCII digits is
/// kept as written (`2023`, `H25`).
pub fn expand_year(prefix: &str) -> String {
    let two_digits = prefix.len() == 2 && prefix.bytes().all(|b| b.is_ascii_digit());
    match prefix.parse::<u32>() {
        Ok(n) if two_digits => {
            let century = if n < TWO_DIGIT_YEAR_PIVOT { "20" } else { "19" };
            format!("{century}{prefix}")
        }
        _ => prefix.to_string(),
    }
}

/// `(column, week)` for every cell after the first carrying the week suffix.
pub fn week_columns(header: &[String]) -> Vec<WeekColumn> {
    header
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, c)| c.contains(WEEK_SUFFIX))
        .map(|(index, c)| WeekColumn {
            index,
            week: c.replace(WEEK_SUFFIX, "").trim().to_string(),
        })
        .collect()
}

fn normalize_value(raw: &str) -> String {
    let v = raw.trim();
    if v == MISSING_VALUE {
        String::new()
    } else {
        v.to_string()
    }
}

/// Transition on one row. `next` is the row after it, consulted only for
/// disease-name rows.
pub fn step(
    state: TrendState,
    row: &[String],
    next: Option<&[String]>,
) -> (TrendState, Option<TrendRecord>) {
    match classify(row) {
        RowKind::DiseaseName(disease) => match next {
            Some(next) if has_week_label(next, 1) => (
                TrendState::DiseaseWithWeeks {
                    disease,
                    weeks: week_columns(next),
                },
                None,
            ),
            _ => (state, None),
        },
        RowKind::Data(year) => match &state {
            TrendState::DiseaseWithWeeks { disease, weeks } => {
                let values = weeks
                    .iter()
                    .map(|w| (format!("{}週", w.week), normalize_value(cell(row, w.index))))
                    .collect();
                let record = TrendRecord {
                    disease: disease.clone(),
                    year,
                    values,
                };
                (state, Some(record))
            }
            TrendState::NoDisease => {
                tracing::warn!(year = %year, "year row before any disease block, dropped");
                (state, None)
            }
        },
        _ => (state, None),
    }
}

#[derive(Default)]
struct TrendScan {
    state: TrendState,
    records: Vec<TrendRecord>,
}

/// Every record in the sheet, in row order.
pub fn scan(grid: &Grid) -> Vec<TrendRecord> {
    let rows: Vec<&[String]> = grid.rows().collect();
    let scan = rows
        .iter()
        .enumerate()
        .fold(TrendScan::default(), |mut acc, (i, row)| {
            let (state, record) = step(acc.state, row, rows.get(i + 1).copied());
            acc.state = state;
            acc.records.extend(record);
            acc
        });
    scan.records
}

/// Reshape a trend sheet into one row per (disease, historical year).
///
/// A sheet with no data rows yields the four identity columns and no rows.
pub fn reshape(grid: &Grid, report_year: i32, report_week: u32, source: &Path) -> Result<CleanTable> {
    let records = scan(grid);
    tracing::debug!(source = %source.display(), records = records.len(), "scanned trend sheet");

    let mut headers: Vec<String> = [
        REPORT_YEAR_COLUMN,
        REPORT_WEEK_COLUMN,
        DISEASE_COLUMN,
        YEAR_COLUMN,
    ]
    .map(String::from)
    .to_vec();
    for record in &records {
        for (name, _) in &record.values {
            if !headers.contains(name) {
                headers.push(name.clone());
            }
        }
    }

    let (report_year, report_week) = (report_year.to_string(), report_week.to_string());
    let rows = records
        .into_iter()
        .map(|record| {
            let mut row = vec![String::new(); headers.len()];
            row[0] = report_year.clone();
            row[1] = report_week.clone();
            row[2] = record.disease;
            row[3] = record.year;
            for (name, value) in record.values {
                if let Some(idx) = headers.iter().position(|h| *h == name) {
                    row[idx] = value;
                }
            }
            row
        })
        .collect();

    Ok(CleanTable { headers, rows })
}
