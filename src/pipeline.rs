use anyhow::{Context, Result};
use chrono::{Datelike, Local};
use std::path::PathBuf;
use tokio::{fs, time::sleep};
use tracing::{debug, error, info, info_span, Instrument};

use crate::bulletin::{BulletinId, DataType, YearWeek};
use crate::config::Settings;
use crate::fetch::{download_bulletin, source_url, Downloaded, Transport};
use crate::process::process_bulletin;

/// Counts for one download-and-process run over a data type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub data_type: DataType,
    /// Bulletins fetched over the network in this run.
    pub fetched: usize,
    /// Bulletins whose raw file was already on disk.
    pub cached: usize,
    /// Bulletins normalized in this run.
    pub processed: usize,
    /// Bulletins whose normalized file was already on disk.
    pub already_processed: usize,
    pub failed: usize,
    pub raw_dir: PathBuf,
    pub processed_dir: PathBuf,
}

impl RunSummary {
    fn new(data_type: DataType, settings: &Settings) -> Self {
        let layout = settings.layout();
        Self {
            data_type,
            fetched: 0,
            cached: 0,
            processed: 0,
            already_processed: 0,
            failed: 0,
            raw_dir: layout.raw_dir(data_type),
            processed_dir: layout.processed_dir(data_type),
        }
    }

    /// Raw files available after the run, fetched or cached.
    pub fn downloaded(&self) -> usize {
        self.fetched + self.cached
    }
}

/// The ISO week containing today's local date.
pub fn current_week() -> YearWeek {
    let iso = Local::now().date_naive().iso_week();
    YearWeek::new(iso.year(), iso.week())
}

enum Step {
    Done,
    Failed,
}

async fn run_one<T: Transport>(
    transport: &T,
    settings: &Settings,
    id: BulletinId,
    summary: &mut RunSummary,
) -> Step {
    let raw_path = summary.raw_dir.join(id.raw_file_name());
    let clean_path = summary.processed_dir.join(id.clean_file_name());

    let url = match source_url(&settings.base_url, &id) {
        Ok(url) => url,
        Err(e) => {
            error!(error = %e, "no source URL");
            return Step::Failed;
        }
    };

    match download_bulletin(transport, &url, &raw_path).await {
        Ok(Downloaded::Cached) => {
            debug!(file = %raw_path.display(), "raw file exists");
            summary.cached += 1;
        }
        Ok(Downloaded::Fetched { bytes }) => {
            info!(%url, bytes, "downloaded");
            summary.fetched += 1;
            sleep(settings.politeness_delay).await;
        }
        Err(e) => {
            error!(%url, error = %e, "download failed");
            return Step::Failed;
        }
    }

    if clean_path.exists() {
        debug!(file = %clean_path.display(), "processed file exists");
        summary.already_processed += 1;
        return Step::Done;
    }

    let (raw, clean) = (raw_path.clone(), clean_path.clone());
    let outcome = tokio::task::spawn_blocking(move || process_bulletin(&id, &raw, &clean)).await;
    match outcome {
        Ok(Ok(rows)) => {
            info!(rows, file = %clean_path.display(), "processed");
            summary.processed += 1;
            Step::Done
        }
        Ok(Err(e)) => {
            error!(error = %e, "processing failed");
            Step::Failed
        }
        Err(e) => {
            error!(error = %e, "processing task panicked");
            Step::Failed
        }
    }
}

/// Fetch and normalize every bulletin of `data_type` from `first` to `last`
/// inclusive, one at a time. Files already on disk are reused, so a rerun
/// only touches weeks that are still missing.
pub async fn download_and_process<T: Transport>(
    transport: &T,
    settings: &Settings,
    data_type: DataType,
    first: YearWeek,
    last: YearWeek,
) -> Result<RunSummary> {
    let mut summary = RunSummary::new(data_type, settings);
    for dir in [&summary.raw_dir, &summary.processed_dir] {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("creating {}", dir.display()))?;
    }
    info!(%data_type, from = %first, to = %last, "starting download");

    for week in first.through(last) {
        let id = BulletinId::new(week.year, week.week, data_type);
        let span = info_span!("bulletin", %id);
        match run_one(transport, settings, id, &mut summary).instrument(span).await {
            Step::Done => {}
            Step::Failed => summary.failed += 1,
        }
    }

    info!(
        %data_type,
        fetched = summary.fetched,
        cached = summary.cached,
        processed = summary.processed,
        already_processed = summary.already_processed,
        failed = summary.failed,
        "download finished"
    );
    Ok(summary)
}
