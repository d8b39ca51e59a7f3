use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::bulletin::DataType;

/// Lower bound on the pause after each successful download.
pub const MIN_POLITENESS_DELAY: Duration = Duration::from_millis(500);

pub const DEFAULT_BASE_URL: &str = "https://id-info.jihs.go.jp";

/// Runtime settings shared by the download and merge stages.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root holding one sub-directory per data type.
    pub data_dir: PathBuf,
    /// Scheme and host the router prefixes to every path.
    pub base_url: String,
    /// Pause after every successful fetch; clamped to [`MIN_POLITENESS_DELAY`].
    pub politeness_delay: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub request_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            base_url: DEFAULT_BASE_URL.to_string(),
            politeness_delay: MIN_POLITENESS_DELAY,
            max_retries: 2,
            initial_backoff: Duration::from_millis(500),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Settings {
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_politeness_delay(mut self, delay: Duration) -> Self {
        self.politeness_delay = delay.max(MIN_POLITENESS_DELAY);
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.data_dir)
    }
}

/// Paths of raw, processed and merged files under the data root.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn type_dir(&self, data_type: DataType) -> PathBuf {
        self.root.join(data_type.as_str())
    }

    pub fn raw_dir(&self, data_type: DataType) -> PathBuf {
        self.type_dir(data_type).join("raw")
    }

    pub fn processed_dir(&self, data_type: DataType) -> PathBuf {
        self.type_dir(data_type).join("processed")
    }

    pub fn merged_csv(&self, data_type: DataType) -> PathBuf {
        self.type_dir(data_type)
            .join(format!("merged_{}.csv", data_type))
    }

    pub fn merged_parquet(&self, data_type: DataType) -> PathBuf {
        self.type_dir(data_type)
            .join(format!("merged_{}.parquet", data_type))
    }
}
