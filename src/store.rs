//! Per-keyword checkpoint files, deduplicated by place id.
//!
//! A keyword counts as done once its checkpoint exists, even if the collection that wrote it
//! was cut short. Re-running such a keyword merges into the file instead of replacing it.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;
use tracing::{debug, warn};

use crate::parse::{Record, SearchPage};
use crate::{Error, Result};

const CHECKPOINT_EXT: &str = "csv";

/// Records gathered for one keyword, possibly from overlapping searches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectedSet {
    records: Vec<Record>,
}

impl CollectedSet {
    /// Flattens pages in order, tagging each record with its page's search keyword.
    pub fn from_pages(pages: Vec<SearchPage>) -> Self {
        Self {
            records: pages.into_iter().flat_map(SearchPage::into_records).collect(),
        }
    }

    pub fn from_records(records: Vec<Record>) -> Self {
        Self { records }
    }

    /// Drops every record whose id was already seen. The first occurrence wins.
    pub fn dedup(&mut self) {
        let mut seen = HashSet::with_capacity(self.records.len());
        self.records.retain(|record| seen.insert(record.id.clone()));
    }

    /// Appends `other` after this set and deduplicates, so existing records take precedence.
    pub fn merge(&mut self, other: CollectedSet) {
        self.records.extend(other.records);
        self.dedup();
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// File-safe keyword name: Hangul syllables and ASCII alphanumerics only.
pub fn normalize_keyword(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || ('가'..='힣').contains(c))
        .collect()
}

/// Keywords that already had a checkpoint when the run started. Never refreshed mid-run.
#[derive(Debug, Default, Clone)]
pub struct ProgressRegistry {
    done: HashSet<String>,
}

impl ProgressRegistry {
    pub fn contains(&self, keyword: &str) -> bool {
        self.done.contains(keyword)
    }

    pub fn len(&self) -> usize {
        self.done.len()
    }

    pub fn is_empty(&self) -> bool {
        self.done.is_empty()
    }
}

/// One CSV checkpoint per keyword inside `dir`. Read-merge-write cycles are serialized.
pub struct CheckpointStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn checkpoint_path(&self, keyword: &str) -> PathBuf {
        self.dir.join(format!("{keyword}.{CHECKPOINT_EXT}"))
    }

    /// Lists the checkpoint directory. A missing directory means nothing is done yet.
    pub async fn registry(&self) -> Result<ProgressRegistry> {
        let dir = self.dir.clone();
        let done = spawn_blocking(move || scan_checkpoints(&dir)).await??;
        Ok(ProgressRegistry { done })
    }

    /// Merges `collected` into the keyword's checkpoint and returns what was written.
    ///
    /// An unreadable existing checkpoint is logged and replaced by the new data.
    pub async fn merge_and_save(&self, keyword: &str, collected: CollectedSet) -> Result<CollectedSet> {
        let path = self.checkpoint_path(keyword);
        let _guard = self.write_lock.lock().await;

        let mut merged = match read_existing(&path).await {
            Ok(Some(existing)) => existing,
            Ok(None) => CollectedSet::default(),
            Err(e @ Error::PersistConflict { .. }) => {
                warn!("{}; overwriting with the new collection", e);
                CollectedSet::default()
            }
            Err(e) => return Err(e),
        };
        let before = merged.len();
        merged.merge(collected);
        debug!(
            "[{}] checkpoint {} -> {} records",
            keyword,
            before,
            merged.len()
        );

        tokio::fs::create_dir_all(&self.dir).await?;
        spawn_blocking(move || write_checkpoint(&path, &merged).map(|()| merged)).await?
    }
}

fn scan_checkpoints(dir: &Path) -> Result<HashSet<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(e) => return Err(e.into()),
    };

    let mut done = HashSet::new();
    for entry in entries {
        let path = entry?.path();
        let is_checkpoint = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(CHECKPOINT_EXT));
        if !is_checkpoint || !path.is_file() {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            done.insert(stem.to_string());
        }
    }
    Ok(done)
}

async fn read_existing(path: &Path) -> Result<Option<CollectedSet>> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(None);
    }
    let path = path.to_path_buf();
    spawn_blocking(move || {
        let conflict = |reason: String| Error::PersistConflict {
            path: path.clone(),
            reason,
        };
        let mut reader = ReaderBuilder::new()
            .from_path(&path)
            .map_err(|e| conflict(e.to_string()))?;
        let has_id = reader
            .headers()
            .map_err(|e| conflict(e.to_string()))?
            .iter()
            .any(|h| h.trim_start_matches('\u{feff}').trim() == "id");
        if !has_id {
            return Err(conflict("no id column".to_string()));
        }
        let records = reader
            .deserialize::<Record>()
            .collect::<core::result::Result<Vec<_>, _>>()
            .map_err(|e| conflict(e.to_string()))?;
        if let Some(line) = records.iter().position(|r| r.id.trim().is_empty()) {
            return Err(conflict(format!("row {} has no id", line + 2)));
        }
        Ok(Some(CollectedSet::from_records(records)))
    })
    .await?
}

/// Writes next to the target and renames it into place, so readers never see half a file.
fn write_checkpoint(path: &Path, set: &CollectedSet) -> Result<()> {
    let tmp = path.with_extension(format!("{CHECKPOINT_EXT}.tmp"));
    {
        let mut writer = WriterBuilder::new().has_headers(false).from_path(&tmp)?;
        writer.write_record(Record::HEADERS)?;
        for record in set.records() {
            writer.serialize(record)?;
        }
        writer.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}
