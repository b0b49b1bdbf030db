//! Client for the archive search service (Source A).
//!
//! The archive indexes submissions with time-ordered search but serves
//! stale, partial field data: only identifiers and observed timestamps are
//! trusted from it. Everything else comes from the gateway.

use std::time::Duration;

use magpie_core::error::AppError;
use magpie_core::record::CandidateRef;
use magpie_core::traits::{SEARCH_LIMIT_MAX, SearchSource};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;

/// Search response wrapper: the archive nests results under `data`.
#[derive(Deserialize, Debug)]
struct ArchiveSearchResponse {
    data: Vec<Value>,
}

/// HTTP client for the archive search API.
///
/// # Examples
///
/// ```no_run
/// use magpie_client::ArchiveClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = ArchiveClient::new("https://api.pushshift.io", "magpie/0.1")?;
/// let page = client.search_page("rust", None, Some(1600000000), 500).await?;
/// println!("Found {} candidates", page.len());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ArchiveClient {
    client: Client,
    base_url: Url,
}

impl ArchiveClient {
    /// Request timeout for one search call.
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Base delay for low-level retries within `request_with_retry`.
    const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

    /// Maximum backoff delay for rate-limited retries.
    const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

    /// Low-level retries for transient failures; rate limits get more
    /// attempts since they always clear.
    const MAX_RETRIES: u32 = 3;
    const RATE_LIMIT_MAX_RETRIES: u32 = 5;

    /// Search endpoint path under the base URL.
    const SEARCH_PATH: &'static str = "reddit/search/submission/";

    /// Creates a new archive client.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if the URL is invalid, or
    /// `AppError::ClientError` if the HTTP client cannot be built.
    pub fn new(base_url_str: &str, user_agent: &str) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url_str)
            .map_err(|_| AppError::ConfigError(format!("Invalid archive URL: {}", base_url_str)))?;

        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// Fetches one search page: candidates strictly older than
    /// `before_epoch`, newest first.
    ///
    /// `limit` is clamped to the archive's hard maximum of
    /// [`SEARCH_LIMIT_MAX`]. Entries without an identifier or timestamp are
    /// dropped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ClientError` / `AppError::NetworkError` /
    /// `AppError::Timeout` for HTTP failures after low-level retries.
    pub async fn search_page(
        &self,
        collection: &str,
        query: Option<&str>,
        before_epoch: Option<i64>,
        limit: usize,
    ) -> Result<Vec<CandidateRef>, AppError> {
        let mut url = self
            .base_url
            .join(Self::SEARCH_PATH)
            .map_err(|e| AppError::Generic(e.to_string()))?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("subreddit", collection);
            pairs.append_pair("size", &limit.min(SEARCH_LIMIT_MAX).to_string());
            if let Some(q) = query {
                pairs.append_pair("q", q);
            }
            if let Some(before) = before_epoch {
                pairs.append_pair("before", &before.to_string());
            }
        }

        let resp = self.request_with_retry(&url).await?;

        let search: ArchiveSearchResponse = resp
            .json()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(extract_candidates(&search.data))
    }

    /// Performs a GET request with retry logic for transient failures.
    ///
    /// Handles 429 via the Retry-After header (exponential backoff when
    /// absent), 5xx and connection problems with linear backoff.
    async fn request_with_retry(&self, url: &Url) -> Result<reqwest::Response, AppError> {
        let mut last_error = AppError::Generic("No attempts made".to_string());
        let effective_max = Self::RATE_LIMIT_MAX_RETRIES.max(Self::MAX_RETRIES);

        for attempt in 1..=effective_max {
            match self.client.get(url.clone()).send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_success() {
                        return Ok(resp);
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        last_error = AppError::RateLimitExceeded;
                        if attempt < effective_max {
                            let delay = resp
                                .headers()
                                .get("retry-after")
                                .and_then(|v| v.to_str().ok())
                                .and_then(|v| v.parse::<u64>().ok())
                                .map(Duration::from_secs)
                                .unwrap_or_else(|| {
                                    (Self::RETRY_BASE_DELAY * 2_u32.pow(attempt))
                                        .min(Self::MAX_RETRY_DELAY)
                                });
                            sleep(delay).await;
                            continue;
                        }
                    }

                    if status.is_server_error() {
                        last_error = AppError::ClientError(format!(
                            "Server error: HTTP {}",
                            status.as_u16()
                        ));
                        if attempt < Self::MAX_RETRIES {
                            sleep(Self::RETRY_BASE_DELAY * attempt).await;
                            continue;
                        }
                    }

                    return Err(AppError::ClientError(format!(
                        "HTTP {} from {}",
                        status.as_u16(),
                        url
                    )));
                }
                Err(e) => {
                    if e.is_timeout() {
                        last_error = AppError::Timeout(Self::REQUEST_TIMEOUT.as_secs());
                    } else if e.is_connect() {
                        last_error = AppError::NetworkError(format!("Connection failed: {}", e));
                    } else {
                        last_error = AppError::ClientError(e.to_string());
                    }

                    if attempt < Self::MAX_RETRIES && (e.is_timeout() || e.is_connect()) {
                        sleep(Self::RETRY_BASE_DELAY * attempt).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error)
    }
}

/// Pulls `(id, created_utc)` out of raw archive entries, dropping malformed
/// ones. The archive's other fields are stale and ignored on purpose.
fn extract_candidates(entries: &[Value]) -> Vec<CandidateRef> {
    entries
        .iter()
        .filter_map(|entry| {
            let id = entry.get("id").and_then(Value::as_str)?;
            let observed = entry
                .get("created_utc")
                .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))?;
            Some(CandidateRef {
                id: id.to_string(),
                observed_utc: observed,
            })
        })
        .collect()
}

impl SearchSource for ArchiveClient {
    async fn search(
        &self,
        collection: &str,
        query: Option<&str>,
        before_epoch: Option<i64>,
        limit: usize,
    ) -> Result<Vec<CandidateRef>, AppError> {
        self.search_page(collection, query, before_epoch, limit).await
    }
}
