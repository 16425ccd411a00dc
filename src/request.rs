use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, Client, StatusCode};
use tracing::{debug, warn};

use crate::credentials::KeyRotator;
use crate::parse::{decode_page, SearchPage};
use crate::{Error, Result};

/// Body marker the provider sends when a key has used up its quota.
const QUOTA_MARKER: &str = r#""errorType":"RequestThrottled""#;

/// Status and body of one raw search request.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Sends a single search request. Everything above this seam is transport-agnostic.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, query: &str, page: u32, api_key: &str) -> Result<RawResponse>;
}

/// The provider's keyword search endpoint over HTTP.
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, query: &str, page: u32, api_key: &str) -> Result<RawResponse> {
        let page = page.to_string();
        let res = self
            .client
            .get(&self.endpoint)
            .query(&[("query", query), ("page", page.as_str())])
            .header(AUTHORIZATION, format!("KakaoAK {api_key}"))
            .send()
            .await?;
        let status = res.status();
        let body = res.text().await?;
        Ok(RawResponse { status, body })
    }
}

/// Issues page requests with the active key, rotating keys on quota exhaustion.
pub struct SearchClient {
    transport: Arc<dyn Transport>,
    keys: Arc<KeyRotator>,
    requests: AtomicU64,
}

impl SearchClient {
    pub fn new(transport: Arc<dyn Transport>, keys: Arc<KeyRotator>) -> Self {
        Self {
            transport,
            keys,
            requests: AtomicU64::new(0),
        }
    }

    /// Fetches one page of `query`.
    ///
    /// A quota response rotates to the next key and repeats the same request, so the number
    /// of retries is bounded by the number of keys. Running out of keys is
    /// `CredentialsExhausted`; any other failure is a `Search` error for this page only.
    pub async fn search(&self, query: &str, page: u32) -> Result<SearchPage> {
        let mut credential = self.keys.current()?;
        loop {
            self.requests.fetch_add(1, Ordering::Relaxed);
            let res = self
                .transport
                .get(query, page, &credential.key)
                .await
                .map_err(|e| search_error(query, page, e))?;

            if res.status.is_success() {
                debug!("[{}] page {} -> {}", query, page, res.status);
                return decode_page(&res.body, query).map_err(|e| search_error(query, page, e));
            }
            if is_quota_exceeded(&res) {
                warn!(
                    "[QUOTA] key #{} exhausted while searching {:?} page {}",
                    credential.index + 1,
                    query,
                    page
                );
                credential = self.keys.rotate_from(credential.index)?;
                continue;
            }
            return Err(Error::Search {
                query: query.to_string(),
                page,
                reason: format!("{}: {}", res.status, res.body),
            });
        }
    }

    /// Requests attempted so far, quota rejections and transport failures included.
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    pub fn keys(&self) -> &KeyRotator {
        &self.keys
    }
}

fn is_quota_exceeded(res: &RawResponse) -> bool {
    res.status == StatusCode::TOO_MANY_REQUESTS || res.body.contains(QUOTA_MARKER)
}

fn search_error(query: &str, page: u32, err: Error) -> Error {
    if err.is_run_fatal() {
        return err;
    }
    Error::Search {
        query: query.to_string(),
        page,
        reason: err.to_string(),
    }
}
