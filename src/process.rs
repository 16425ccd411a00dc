use std::collections::HashSet;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::collect::Collector;
use crate::config::CrawlConfig;
use crate::credentials::KeyRotator;
use crate::input::load_targets;
use crate::region::RegionIndex;
use crate::request::{HttpTransport, SearchClient, Transport};
use crate::store::{normalize_keyword, CheckpointStore};
use crate::{info_time, Error, Result};

/// What one pass over the target list did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub total_targets: usize,
    /// Already checkpointed before the pass started.
    pub skipped: usize,
    /// Blank after normalization, or a repeat of an earlier target.
    pub ignored: usize,
    pub dispatched: usize,
    pub saved: usize,
    pub failed: usize,
    /// In flight when credentials ran out.
    pub aborted: usize,
    /// Never dispatched because credentials ran out.
    pub not_started: usize,
    pub exhausted: bool,
    pub requests: u64,
}

pub struct Crawler {
    client: Arc<SearchClient>,
    collector: Arc<Collector>,
    store: Arc<CheckpointStore>,
}

impl Crawler {
    pub fn new(
        transport: Arc<dyn Transport>,
        keys: Arc<KeyRotator>,
        regions: Arc<RegionIndex>,
        store: Arc<CheckpointStore>,
    ) -> Self {
        let client = Arc::new(SearchClient::new(transport, keys));
        let collector = Arc::new(Collector::new(Arc::clone(&client), regions));
        Self {
            client,
            collector,
            store,
        }
    }

    /// Loads keys and regions and talks to the provider over HTTP.
    pub fn from_config(config: &CrawlConfig) -> Result<Self> {
        let keys = KeyRotator::from_file(&config.api_keys_path)?;
        let regions = RegionIndex::load(&config.regions_path)?;
        info!(
            "Loaded {} API keys and {} districts",
            keys.len(),
            regions.len()
        );
        let transport = HttpTransport::new(config.endpoint.clone(), config.timeout)?;
        Ok(Self::new(
            Arc::new(transport),
            Arc::new(keys),
            Arc::new(regions),
            Arc::new(CheckpointStore::new(config.checkpoint_dir.clone())),
        ))
    }

    /// Collects every keyword that has no checkpoint yet, `max_workers` at a time.
    ///
    /// Running out of credentials stops dispatching, lets in-flight keywords abort and is
    /// reported through [`RunReport::exhausted`], not as an error.
    pub async fn run(&self, keywords: &[String], max_workers: usize) -> Result<RunReport> {
        let start_time = Local::now();
        let registry = self.store.registry().await?;

        let mut report = RunReport {
            total_targets: keywords.len(),
            ..Default::default()
        };
        let mut seen = HashSet::new();
        let mut pending = Vec::new();
        for raw in keywords {
            let keyword = normalize_keyword(raw);
            if keyword.is_empty() {
                info!("[SKIP] {:?}: nothing left after normalization", raw);
                report.ignored += 1;
                continue;
            }
            if !seen.insert(keyword.clone()) {
                info!("[SKIP] {:?}: duplicate of {}", raw, keyword);
                report.ignored += 1;
                continue;
            }
            if registry.contains(&keyword) {
                info!("[SKIP] {}: already collected", keyword);
                report.skipped += 1;
            } else {
                pending.push(keyword);
            }
        }
        let total = pending.len();
        info_time!("Targets: {} pending / {} total", total, keywords.len());

        let cancel = CancellationToken::new();
        let semaphore = Arc::new(Semaphore::new(max_workers.clamp(1, Semaphore::MAX_PERMITS)));
        let mut tasks = JoinSet::new();
        let mut done = 0;

        for (ordinal, keyword) in pending.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => permit?,
            };
            // A worker may have hit exhaustion just before releasing this permit.
            if cancel.is_cancelled() {
                break;
            }

            report.dispatched += 1;
            tasks.spawn({
                let collector = Arc::clone(&self.collector);
                let store = Arc::clone(&self.store);
                let cancel = cancel.clone();
                async move {
                    let _permit = permit;
                    let res = crawl_keyword(&collector, &store, &keyword, ordinal + 1, total).await;
                    if matches!(&res, Err(e) if e.is_run_fatal()) {
                        cancel.cancel();
                    }
                    (keyword, res)
                }
            });

            while let Some(finished) = tasks.try_join_next() {
                done += 1;
                tally(finished, &mut report, done, total);
            }
        }

        while let Some(finished) = tasks.join_next().await {
            done += 1;
            tally(finished, &mut report, done, total);
        }

        report.not_started = total - report.dispatched;
        report.requests = self.client.request_count();
        if report.exhausted {
            error!(
                "[EXHAUSTED] all API keys used up: {} saved, {} aborted, {} not started",
                report.saved, report.aborted, report.not_started
            );
        }
        info_time!(
            start_time,
            "Pass finished: {} saved, {} failed, {} skipped, {} ignored, {} requests",
            report.saved,
            report.failed,
            report.skipped,
            report.ignored,
            report.requests
        );
        Ok(report)
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }
}

/// Loads the target list and runs one pass over it.
pub async fn run_pass(config: &CrawlConfig) -> Result<RunReport> {
    let targets = load_targets(&config.targets_path, &config.target_column)?;
    let crawler = Crawler::from_config(config)?;
    crawler.run(&targets, config.max_workers).await
}

async fn crawl_keyword(
    collector: &Collector,
    store: &CheckpointStore,
    keyword: &str,
    ordinal: usize,
    total: usize,
) -> Result<usize> {
    let start_time = Local::now();
    info_time!("[START] {} ({}/{})", keyword, ordinal, total);

    let mut collected = collector.collect(keyword).await?;
    let collected_len = collected.len();
    collected.dedup();
    info!("[DE-DUP] {} {} -> {}", keyword, collected_len, collected.len());

    let saved = store.merge_and_save(keyword, collected).await?;
    info_time!(start_time, "[SAVED] {}: {} records", keyword, saved.len());
    Ok(saved.len())
}

fn tally(
    finished: core::result::Result<(String, Result<usize>), tokio::task::JoinError>,
    report: &mut RunReport,
    done: usize,
    total: usize,
) {
    match finished {
        Ok((_, Ok(_))) => report.saved += 1,
        Ok((keyword, Err(Error::CredentialsExhausted))) => {
            error!("[ABORTED] {}: credentials exhausted", keyword);
            report.exhausted = true;
            report.aborted += 1;
        }
        Ok((keyword, Err(e))) => {
            error!("[ERROR] {}: {}", keyword, e);
            report.failed += 1;
        }
        Err(e) => {
            error!("[ERROR] worker task died: {}", e);
            report.failed += 1;
        }
    }
    info!("[PROGRESS] {}/{}", done, total);
}
