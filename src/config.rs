use std::path::PathBuf;
use std::time::Duration;

use crate::{
    DEFAULT_CHECKPOINT_DIR, DEFAULT_ENDPOINT, DEFAULT_MAX_WORKERS, DEFAULT_TARGET_COLUMN,
    DEFAULT_TIMEOUT_SECS,
};

/// Everything one crawl pass needs to know about its inputs and limits.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub api_keys_path: PathBuf,
    pub targets_path: PathBuf,
    pub target_column: String,
    pub regions_path: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub endpoint: String,
    pub max_workers: usize,
    pub timeout: Duration,
    /// When set, the binary sleeps this long and starts another pass.
    pub repeat_every: Option<Duration>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            api_keys_path: PathBuf::from("api_keys.txt"),
            targets_path: PathBuf::from("./data/data.tsv"),
            target_column: DEFAULT_TARGET_COLUMN.to_string(),
            regions_path: PathBuf::from("./data/regions.tsv"),
            checkpoint_dir: PathBuf::from(DEFAULT_CHECKPOINT_DIR),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            max_workers: DEFAULT_MAX_WORKERS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            repeat_every: None,
        }
    }
}
