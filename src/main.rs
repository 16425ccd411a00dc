use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Local;
use clap::Parser;
use placecrawl::{
    config::CrawlConfig,
    info_time,
    process::{run_pass, RunReport},
    Result, DEFAULT_CHECKPOINT_DIR,
    DEFAULT_ENDPOINT, DEFAULT_MAX_WORKERS, DEFAULT_TARGET_COLUMN, DEFAULT_TIMEOUT_SECS,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const MAX_WORKERS: usize = 256;
const MAX_INTERVAL_HOURS: u64 = 24 * 365;

/// Collects every place matching each target business name, region by region.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Newline-delimited API keys, used in order.
    #[arg(long, default_value = "api_keys.txt")]
    api_keys: PathBuf,
    /// CSV/TSV of target business names.
    #[arg(long, default_value = "./data/data.tsv")]
    targets: PathBuf,
    /// Column of the target table holding the business name.
    #[arg(long, default_value = DEFAULT_TARGET_COLUMN)]
    target_column: String,
    /// CSV/TSV with SIDO_NM, SIGUNGU_NM, GU_NM and DONG_NM columns.
    #[arg(long, default_value = "./data/regions.tsv")]
    regions: PathBuf,
    #[arg(long, default_value = DEFAULT_CHECKPOINT_DIR)]
    checkpoint_dir: PathBuf,
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,
    /// Keywords collected at once, 1 to 256.
    #[arg(short = 'j', long, default_value_t = DEFAULT_MAX_WORKERS, value_parser = parse_workers)]
    max_workers: usize,
    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,
    /// Run again every N hours instead of exiting after one pass.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_INTERVAL_HOURS))]
    interval_hours: Option<u64>,
}

fn parse_workers(s: &str) -> core::result::Result<usize, String> {
    let n: usize = s.parse().map_err(|e| format!("{e}"))?;
    if !(1..=MAX_WORKERS).contains(&n) {
        return Err(format!("must be between 1 and {MAX_WORKERS}"));
    }
    Ok(n)
}

fn hours(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(60 * 60))
}

impl From<Args> for CrawlConfig {
    fn from(args: Args) -> Self {
        Self {
            api_keys_path: args.api_keys,
            targets_path: args.targets,
            target_column: args.target_column,
            regions_path: args.regions,
            checkpoint_dir: args.checkpoint_dir,
            endpoint: args.endpoint,
            max_workers: args.max_workers,
            timeout: Duration::from_secs(args.timeout),
            repeat_every: args.interval_hours.map(hours),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = CrawlConfig::from(Args::parse());
    repeat_passes(&config, || run_pass(&config)).await
}

/// Runs `pass` once, or forever every `repeat_every`. A failing first pass ends the
/// process either way; later failures are logged and retried on the next interval.
async fn repeat_passes<F, Fut>(config: &CrawlConfig, mut pass: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<RunReport>>,
{
    let mut first_pass = true;
    loop {
        let start_time = Local::now();
        match pass().await {
            Ok(report) => info!("{:?}", report),
            Err(e) if first_pass => return Err(e),
            Err(e) => error!("Pass failed: {}", e),
        }
        first_pass = false;
        info_time!(start_time, "Full pass time:");

        let Some(interval) = config.repeat_every else {
            break;
        };
        info!("Sleeping {} sec until the next pass", interval.as_secs());
        tokio::time::sleep(interval).await;
    }

    Ok(())
}
