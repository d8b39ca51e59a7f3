//! Weekly disease-count sheets (zensu, teiten, ari).
//!
//! The export carries a two-row header: row 2 names a disease once at the
//! first column of its group, row 3 names the report type (this week,
//! cumulative, ...) for every column. Data follows from row 4.

use std::path::Path;

use super::{grid::Grid, table::CleanTable};
use crate::error::{Result, ScrapeError};

pub const YEAR_COLUMN: &str = "年";
pub const WEEK_COLUMN: &str = "週";
pub const REGION_COLUMN: &str = "都道府県";

const DISEASE_ROW: usize = 2;
const REPORT_TYPE_ROW: usize = 3;
const FIRST_DATA_ROW: usize = 4;

/// Forward-fill state threaded through the header columns.
#[derive(Default)]
struct HeaderScan {
    disease: String,
    headers: Vec<String>,
}

impl HeaderScan {
    fn push(mut self, idx: usize, disease: &str, report_type: &str) -> Self {
        if !disease.is_empty() {
            self.disease = disease.to_string();
        }
        let header = match (self.disease.is_empty(), report_type.is_empty()) {
            (_, true) => format!("column_{idx}"),
            (true, false) => report_type.to_string(),
            (false, false) => format!("{}_{}", self.disease, report_type),
        };
        self.headers.push(header);
        self
    }
}

/// Flattened header for every grid column. Column 0 is always the region.
pub fn flatten_headers(disease_row: &[String], type_row: &[String]) -> Vec<String> {
    let width = disease_row.len().max(type_row.len());
    let cell = |row: &[String], i: usize| row.get(i).map(|s| s.trim().to_string()).unwrap_or_default();

    let scan = (1..width).fold(
        HeaderScan {
            headers: vec![REGION_COLUMN.to_string()],
            ..Default::default()
        },
        |scan, i| scan.push(i, &cell(disease_row, i), &cell(type_row, i)),
    );
    scan.headers
}

/// Reshape a standard sheet into one row per region, tagged with the
/// bulletin's year and week.
pub fn normalize(grid: &Grid, year: i32, week: u32, source: &Path) -> Result<CleanTable> {
    let (Some(disease_row), Some(type_row)) = (grid.row(DISEASE_ROW), grid.row(REPORT_TYPE_ROW))
    else {
        return Err(ScrapeError::reshape(
            source,
            format!(
                "expected at least {} header rows, found {}",
                REPORT_TYPE_ROW + 1,
                grid.len()
            ),
        ));
    };
    if grid.width() < 2 {
        return Err(ScrapeError::reshape(source, "sheet has no disease columns"));
    }

    let mut headers = vec![YEAR_COLUMN.to_string(), WEEK_COLUMN.to_string()];
    headers.extend(flatten_headers(disease_row, type_row));

    let (year, week) = (year.to_string(), week.to_string());
    let rows = grid
        .rows()
        .skip(FIRST_DATA_ROW)
        .map(|row| {
            let mut out = Vec::with_capacity(row.len() + 2);
            out.push(year.clone());
            out.push(week.clone());
            out.extend(row.iter().cloned());
            out
        })
        .collect();

    Ok(CleanTable { headers, rows })
}
