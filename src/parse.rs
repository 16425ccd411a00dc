use serde::{Deserialize, Serialize};

use crate::{Result, PAGE_SIZE};

/// One place as returned by the provider, tagged with the query that found it.
/// Two records are the same place iff their `id`s match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Record {
    pub id: String,
    pub place_name: String,
    pub category_name: String,
    pub category_group_code: String,
    pub category_group_name: String,
    pub phone: String,
    pub address_name: String,
    pub road_address_name: String,
    pub x: String,
    pub y: String,
    pub place_url: String,
    pub distance: String,
    pub keyword: String,
}

impl Record {
    /// Checkpoint column order; matches the field order above.
    pub const HEADERS: [&'static str; 13] = [
        "id",
        "place_name",
        "category_name",
        "category_group_code",
        "category_group_name",
        "phone",
        "address_name",
        "road_address_name",
        "x",
        "y",
        "place_url",
        "distance",
        "keyword",
    ];
}

/// One page of search results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    pub total_count: u64,
    pub documents: Vec<Record>,
    /// The keyword the provider says it searched for.
    pub search_keyword: String,
}

impl SearchPage {
    /// The page's documents with `keyword` set to the search that produced them.
    pub fn into_records(self) -> Vec<Record> {
        let keyword = self.search_keyword;
        self.documents
            .into_iter()
            .map(|mut record| {
                record.keyword = keyword.clone();
                record
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    meta: Meta,
    #[serde(default)]
    documents: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct Meta {
    total_count: u64,
    #[serde(default)]
    same_name: Option<SameName>,
}

#[derive(Debug, Deserialize)]
struct SameName {
    #[serde(default)]
    keyword: Option<String>,
}

/// Decodes a response body. Without an echoed keyword the issued `query` is used instead.
pub fn decode_page(body: &str, query: &str) -> Result<SearchPage> {
    let response: ApiResponse = serde_json::from_str(body)?;
    let search_keyword = response
        .meta
        .same_name
        .and_then(|same| same.keyword)
        .filter(|kw| !kw.is_empty())
        .unwrap_or_else(|| query.to_string());

    Ok(SearchPage {
        total_count: response.meta.total_count,
        documents: response.documents,
        search_keyword,
    })
}

/// Decides whether a sub-search is finished after `page`.
///
/// A short page is the last one. With a `location_filter`, a last document whose address
/// doesn't contain the filter means the results have drifted out of the target area.
pub fn should_stop(page: &SearchPage, location_filter: Option<&str>) -> bool {
    let Some(last) = page.documents.last() else {
        return true;
    };
    if page.documents.len() < PAGE_SIZE {
        return true;
    }
    match location_filter.filter(|f| !f.is_empty()) {
        Some(filter) => !last.address_name.contains(filter),
        None => false,
    }
}
