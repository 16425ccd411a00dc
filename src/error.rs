use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::AcquireError;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Couldn't load {path}: {reason}")]
    DataLoad { path: PathBuf, reason: String },

    #[error("Search for {query:?} (page {page}) failed: {reason}")]
    Search {
        query: String,
        page: u32,
        reason: String,
    },

    #[error("All API credentials are exhausted")]
    CredentialsExhausted,

    #[error("Checkpoint {path} couldn't be merged: {reason}")]
    PersistConflict { path: PathBuf, reason: String },

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Csv Error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Reqwest Error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Tokio Join Error, couldn't await a task! {0}")]
    RuntimeJoin(#[from] tokio::task::JoinError),
    #[error("Worker pool was closed while dispatching.")]
    RuntimePoolClosed,
}

impl Error {
    /// `true` when the whole run has to stop, not just the current keyword or sub-search.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, Error::CredentialsExhausted)
    }

    pub(crate) fn data_load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::DataLoad {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<AcquireError> for Error {
    fn from(_value: AcquireError) -> Self {
        Error::RuntimePoolClosed
    }
}
