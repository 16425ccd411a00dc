//! Keyword crawler for a local place search API.
//!
//! A single query is truncated at `MAX_PAGES` pages of `PAGE_SIZE` documents, so keywords with
//! more hits are re-issued per district and, if a district is still too large, per neighborhood.
//! Results are deduplicated by place id and checkpointed per keyword so a run can be resumed.

mod macros;

pub mod collect;
pub mod config;
pub mod credentials;
mod error;
pub mod input;
pub mod parse;
pub mod process;
pub mod region;
pub mod request;
pub mod store;

pub use error::{Error, Result};

/// Documents per page; the provider never returns more.
pub const PAGE_SIZE: usize = 15;
/// Pages the provider serves for a single query before truncating.
pub const MAX_PAGES: u32 = 3;
/// Results reachable through one query without subdividing.
pub const SINGLE_QUERY_LIMIT: u64 = PAGE_SIZE as u64 * MAX_PAGES as u64;

pub const DEFAULT_MAX_WORKERS: usize = 10;
pub const DEFAULT_ENDPOINT: &str = "https://dapi.kakao.com/v2/local/search/keyword.json";
pub const DEFAULT_CHECKPOINT_DIR: &str = "./save_data/";
pub const DEFAULT_TARGET_COLUMN: &str = "영업표지";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
