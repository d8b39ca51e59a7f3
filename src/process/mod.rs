// src/process/mod.rs
use std::{fs, path::Path};
use tracing::debug;

use crate::bulletin::{BulletinId, DataType};
use crate::error::{Result, ScrapeError};

pub mod grid;
pub mod standard;
pub mod table;
pub mod trend;

pub use grid::Grid;
pub use table::CleanTable;

/// Reshape an in-memory sheet with the algorithm matching its data type.
pub fn reshape_grid(id: &BulletinId, grid: &Grid, source: &Path) -> Result<CleanTable> {
    match id.data_type {
        DataType::Trend => trend::reshape(grid, id.year, id.week, source),
        DataType::Zensu | DataType::Teiten | DataType::Ari => {
            standard::normalize(grid, id.year, id.week, source)
        }
    }
}

/// Read the raw Shift_JIS export at `raw_path`, reshape it and write the
/// UTF-8 result to `clean_path`. Returns the number of data rows written.
///
/// On any error nothing is left at `clean_path`.
#[tracing::instrument(level = "debug", skip(raw_path, clean_path), fields(bulletin = %id, raw = %raw_path.display()))]
pub fn process_bulletin(id: &BulletinId, raw_path: &Path, clean_path: &Path) -> Result<usize> {
    let bytes = fs::read(raw_path).map_err(|e| ScrapeError::io(raw_path, e))?;
    let grid = Grid::from_shift_jis(&bytes, raw_path)?;
    debug!(rows = grid.len(), width = grid.width(), "decoded grid");

    let table = reshape_grid(id, &grid, raw_path)?;

    if let Some(parent) = clean_path.parent() {
        fs::create_dir_all(parent).map_err(|e| ScrapeError::io(parent, e))?;
    }
    table.write_csv(clean_path)?;
    debug!(rows = table.rows.len(), columns = table.headers.len(), out = %clean_path.display(), "wrote clean table");
    Ok(table.rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::SHIFT_JIS;
    use tempfile::tempdir;

    fn write_sjis(path: &Path, text: &str) {
        let (bytes, _, _) = SHIFT_JIS.encode(text);
        fs::write(path, &bytes).unwrap();
    }

    #[test]
    fn test_process_standard_bulletin() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let raw = dir.path().join("2024-03-zensu.csv");
        let clean = dir.path().join("processed").join("2024-03-zensu-clean.csv");
        write_sjis(
            &raw,
            "全数報告,,\n2024年第3週,,\n,コレラ,\n,報告,累積\n総数,0,1\n北海道,0,0\n",
        );

        let id = BulletinId::new(2024, 3, DataType::Zensu);
        let rows = process_bulletin(&id, &raw, &clean)?;
        assert_eq!(rows, 2);
        assert_eq!(
            fs::read_to_string(&clean)?,
            "年,週,都道府県,コレラ_報告,コレラ_累積\n2024,3,総数,0,1\n2024,3,北海道,0,0\n"
        );
        Ok(())
    }

    #[test]
    fn test_process_trend_bulletin() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let raw = dir.path().join("2023-33-trend.csv");
        let clean = dir.path().join("2023-33-trend-clean.csv");
        write_sjis(&raw, "百日咳,,\n,31週,32週\n13年,10,20\n2023年,30,-\n");

        let id = BulletinId::new(2023, 33, DataType::Trend);
        assert_eq!(process_bulletin(&id, &raw, &clean)?, 2);
        let table = CleanTable::read_csv(&clean)?;
        assert_eq!(table.get(0, "年"), Some("2013"));
        assert_eq!(table.get(1, "32週"), Some(""));
        Ok(())
    }

    #[test]
    fn test_failed_reshape_leaves_no_output() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("2024-03-teiten.csv");
        let clean = dir.path().join("2024-03-teiten-clean.csv");
        write_sjis(&raw, "only,one\nrow,here\n");

        let id = BulletinId::new(2024, 3, DataType::Teiten);
        let err = process_bulletin(&id, &raw, &clean).unwrap_err();
        assert!(matches!(err, ScrapeError::ReshapeFailure { .. }));
        assert!(!clean.exists());
    }

    #[test]
    fn test_bad_encoding_leaves_no_output() {
        let dir = tempdir().unwrap();
        let raw = dir.path().join("2024-03-ari.csv");
        let clean = dir.path().join("2024-03-ari-clean.csv");
        fs::write(&raw, [0x81, 0x20, b'\n']).unwrap();

        let id = BulletinId::new(2024, 3, DataType::Ari);
        let err = process_bulletin(&id, &raw, &clean).unwrap_err();
        assert!(matches!(err, ScrapeError::EncodingFailure { .. }));
        assert!(!clean.exists());
    }
}
