//! Error types for fetching, reshaping and merging bulletins.

use std::path::PathBuf;
use thiserror::Error;

use crate::bulletin::DataType;

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// No routing rule covers the requested bulletin.
    #[error("no source layout for {data_type} {year}W{week:02}")]
    RoutingGap {
        year: i32,
        week: u32,
        data_type: DataType,
    },

    /// Transport error, non-2xx status, or empty body.
    #[error("fetch of {url} failed: {message}")]
    FetchFailure { url: String, message: String },

    /// Bytes are not valid Shift_JIS.
    #[error("{path} is not valid Shift_JIS")]
    EncodingFailure { path: PathBuf },

    /// Grid does not have the shape of any known layout.
    #[error("cannot reshape {path}: {reason}")]
    ReshapeFailure { path: PathBuf, reason: String },

    #[error("invalid calendar input {year}W{week}")]
    CalendarInputInvalid { year: i32, week: i32 },

    /// A processed file could not be read back during a merge.
    #[error("failed to read {path}: {message}")]
    MergeReadFailure { path: PathBuf, message: String },

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("csv error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

impl ScrapeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn reshape(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ReshapeFailure {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScrapeError>;
