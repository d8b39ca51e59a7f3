use anyhow::Result;
use clap::{Parser, Subcommand};
use idwrscraper::{
    bulletin::DataType,
    config::{Settings, DEFAULT_BASE_URL},
    fetch::HttpTransport,
    merge::{merge_all, MergeOutcome},
    pipeline::{current_week, download_and_process, RunSummary},
};
use std::{path::PathBuf, str::FromStr, time::Duration};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

/// Column names echoed after a merge.
const PREVIEW_COLUMNS: usize = 8;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Download, normalize and merge weekly IDWR surveillance bulletins"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
    #[arg(long, env = "IDWR_DATA_DIR", default_value = "data", global = true)]
    data_dir: PathBuf,
    #[arg(long, env = "IDWR_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    base_url: String,
    /// Pause after each successful download; values below 500 are raised to 500.
    #[arg(long, env = "IDWR_DELAY_MS", default_value_t = 500, global = true)]
    delay_ms: u64,
    #[arg(long, env = "IDWR_MAX_RETRIES", default_value_t = 2, global = true)]
    max_retries: u32,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch and normalize bulletins
    Download {
        #[arg(default_value = "all")]
        target: Target,
    },
    /// Merge normalized bulletins into CSV and Parquet
    Merge {
        #[arg(default_value = "all")]
        target: Target,
    },
    /// Download then merge (the default)
    Run {
        #[arg(default_value = "all")]
        target: Target,
    },
}

/// One data type, or every type in run order.
#[derive(Debug, Clone, Copy)]
enum Target {
    All,
    One(DataType),
}

impl Target {
    fn data_types(self) -> Vec<DataType> {
        match self {
            Target::All => DataType::ALL.to_vec(),
            Target::One(data_type) => vec![data_type],
        }
    }
}

impl FromStr for Target {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "both" => Ok(Target::All),
            other => other.parse().map(Target::One),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(env).init();

    let args = Args::parse();
    let settings = Settings::default()
        .with_data_dir(&args.data_dir)
        .with_base_url(&args.base_url)
        .with_politeness_delay(Duration::from_millis(args.delay_ms))
        .with_max_retries(args.max_retries);
    info!(data_dir = %settings.data_dir.display(), base_url = %settings.base_url, "startup");

    let (download, merge, target) = match args.command.unwrap_or(Command::Run {
        target: Target::All,
    }) {
        Command::Download { target } => (true, false, target),
        Command::Merge { target } => (false, true, target),
        Command::Run { target } => (true, true, target),
    };

    let transport = HttpTransport::new(&settings)?;
    let last = current_week();
    for data_type in target.data_types() {
        if download {
            let summary =
                download_and_process(&transport, &settings, data_type, data_type.first_week(), last)
                    .await?;
            print_run_summary(&summary);
        }
        if merge {
            let layout = settings.layout();
            match tokio::task::spawn_blocking(move || merge_all(&layout, data_type)).await? {
                Ok(outcome) => print_merge_outcome(data_type, &outcome),
                Err(e) => error!(%data_type, error = %e, "merge failed"),
            }
        }
    }

    info!("done");
    Ok(())
}

fn print_run_summary(summary: &RunSummary) {
    println!("▶ {} download", summary.data_type);
    println!("  downloaded:        {}", summary.downloaded());
    println!("    fetched now:     {}", summary.fetched);
    println!("    already on disk: {}", summary.cached);
    println!("  processed:         {}", summary.processed + summary.already_processed);
    println!("    processed now:   {}", summary.processed);
    println!("  failed:            {}", summary.failed);
    println!("  raw:       {}", summary.raw_dir.display());
    println!("  processed: {}", summary.processed_dir.display());
}

fn print_merge_outcome(data_type: DataType, outcome: &MergeOutcome) {
    match outcome {
        MergeOutcome::NothingToMerge => println!("▶ {data_type} merge: no processed files"),
        MergeOutcome::NothingRead { failed } => {
            println!("▶ {data_type} merge: none of {failed} files could be read")
        }
        MergeOutcome::Merged(s) => {
            println!("▶ {data_type} merge");
            println!(
                "  files: {} found, {} merged, {} failed",
                s.files_found, s.files_merged, s.files_failed
            );
            println!("  rows: {}  columns: {}", s.rows, s.columns.len());
            println!("  csv:     {} ({} bytes)", s.csv_path.display(), s.csv_bytes);
            match &s.parquet {
                Ok(bytes) => println!(
                    "  parquet: {} ({} bytes, {:.1}% smaller)",
                    s.parquet_path.display(),
                    bytes,
                    s.compression_ratio().unwrap_or_default()
                ),
                Err(e) => println!("  parquet: {} not written: {e}", s.parquet_path.display()),
            }
            let preview: Vec<&str> = s
                .columns
                .iter()
                .take(PREVIEW_COLUMNS)
                .map(String::as_str)
                .collect();
            let more = if s.columns.len() > PREVIEW_COLUMNS { ", ..." } else { "" };
            println!("  columns: {}{more}", preview.join(", "));
        }
    }
}
