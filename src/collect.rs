//! Region-subdividing collection of every result for one keyword.
//!
//! The provider truncates each query at `MAX_PAGES` pages. Keywords whose first page reports
//! more than `SINGLE_QUERY_LIMIT` hits are re-issued per district, and districts that are
//! still too large are re-issued per neighborhood.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::parse::{should_stop, SearchPage};
use crate::region::{District, RegionIndex};
use crate::request::SearchClient;
use crate::store::CollectedSet;
use crate::{Error, Result, MAX_PAGES, PAGE_SIZE, SINGLE_QUERY_LIMIT};

pub struct Collector {
    client: Arc<SearchClient>,
    regions: Arc<RegionIndex>,
}

impl Collector {
    pub fn new(client: Arc<SearchClient>, regions: Arc<RegionIndex>) -> Self {
        Self { client, regions }
    }

    /// Collects all pages for `store_name`, undeduplicated.
    ///
    /// Fails only if the first bare search fails or credentials run out. A failing
    /// sub-search keeps the pages it already has and the collection moves on.
    pub async fn collect(&self, store_name: &str) -> Result<CollectedSet> {
        let first = self.client.search(store_name, 1).await?;
        let total = first.total_count;
        let mut pages = Vec::new();

        if total <= PAGE_SIZE as u64 {
            info!("[{}] total_count = {} => single page", store_name, total);
            pages.push(first);
        } else if total <= SINGLE_QUERY_LIMIT {
            info!("[{}] total_count = {} => pages 1..={}", store_name, total, MAX_PAGES);
            self.paginate(store_name, first, None, &mut pages).await?;
        } else {
            info!(
                "[{}] total_count = {} => {} districts",
                store_name,
                total,
                self.regions.len()
            );
            for district in self.regions.districts() {
                self.collect_district(store_name, district, &mut pages).await?;
            }
        }

        Ok(CollectedSet::from_pages(pages))
    }

    async fn collect_district(
        &self,
        store_name: &str,
        district: &District,
        pages: &mut Vec<SearchPage>,
    ) -> Result<()> {
        let query = format!("{store_name} {}", district.full_label);
        let first = match self.client.search(&query, 1).await {
            Ok(first) => first,
            Err(e) => return skip_or_abort(e, &query),
        };
        let filter = Some(district.representative_name.as_str());

        if first.total_count <= SINGLE_QUERY_LIMIT {
            return self.paginate(&query, first, filter, pages).await;
        }

        info!(
            "[{}] total_count = {} => {} neighborhoods",
            query,
            first.total_count,
            district.neighborhoods.len()
        );
        if !first.documents.is_empty() {
            pages.push(first);
        }
        for neighborhood in &district.neighborhoods {
            let query = format!("{store_name} {neighborhood}");
            match self.client.search(&query, 1).await {
                Ok(first) => self.paginate(&query, first, filter, pages).await?,
                Err(e) => skip_or_abort(e, &query)?,
            }
        }
        Ok(())
    }

    /// Appends `first` and the following pages of `query` until the stop condition holds
    /// or the provider's page limit is reached.
    async fn paginate(
        &self,
        query: &str,
        first: SearchPage,
        location_filter: Option<&str>,
        pages: &mut Vec<SearchPage>,
    ) -> Result<()> {
        let mut stop = should_stop(&first, location_filter);
        if !first.documents.is_empty() {
            pages.push(first);
        }

        let mut page = 2;
        while !stop && page <= MAX_PAGES {
            let next = match self.client.search(query, page).await {
                Ok(next) => next,
                Err(e) => return skip_or_abort(e, query),
            };
            stop = should_stop(&next, location_filter);
            if !next.documents.is_empty() {
                pages.push(next);
            }
            page += 1;
        }
        debug!("[{}] stopped after page {}", query, page - 1);
        Ok(())
    }
}

/// Drops a failed sub-search unless the failure has to end the run.
fn skip_or_abort(err: Error, query: &str) -> Result<()> {
    if err.is_run_fatal() {
        return Err(err);
    }
    warn!("[{}] sub-search abandoned: {}", query, err);
    Ok(())
}
