//! Client for the gateway resolve service (Source B).
//!
//! The gateway holds authoritative, current field data but offers no
//! time-range search, only per-item lookup of at most 100 identifiers per
//! call. It requires OAuth client-credentials authentication; tokens are
//! acquired lazily and refreshed before expiry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use magpie_core::error::AppError;
use magpie_core::record::Record;
use magpie_core::traits::{RESOLVE_CHUNK_MAX, ResolveSource};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::sleep;

/// Token endpoint response.
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// A bearer token with its computed expiry instant.
#[derive(Debug, Clone)]
struct AuthToken {
    access_token: String,
    expires_at: Instant,
}

impl AuthToken {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// HTTP client for the gateway's info and token APIs.
///
/// Cloning is cheap and clones share the cached token.
///
/// # Examples
///
/// ```no_run
/// use magpie_client::GatewayClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = GatewayClient::new("client-id", "client-secret", "magpie/0.1")?;
/// let ids = vec!["abc123".to_string()];
/// let records = client.info("rust", &ids).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct GatewayClient {
    client: Client,
    client_id: String,
    client_secret: String,
    token: Arc<Mutex<Option<AuthToken>>>,
}

impl GatewayClient {
    /// Request timeout for one API call.
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// A token within this margin of expiry is refreshed early, so it
    /// cannot lapse mid-request.
    const EXPIRY_SLACK: Duration = Duration::from_secs(60);

    /// Base delay for low-level retries.
    const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

    /// Low-level retries for transient failures.
    const MAX_RETRIES: u32 = 3;

    /// OAuth token endpoint.
    const TOKEN_URL: &'static str = "https://www.reddit.com/api/v1/access_token";

    /// Authenticated API base.
    const API_URL: &'static str = "https://oauth.reddit.com/api/info";

    /// Item identifier prefix for submissions.
    const ID_PREFIX: &'static str = "t3_";

    /// Creates a new gateway client. No network call is made until the
    /// first resolve.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ClientError` if the HTTP client cannot be built.
    pub fn new(client_id: &str, client_secret: &str, user_agent: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Self::REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        Ok(Self {
            client,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token: Arc::new(Mutex::new(None)),
        })
    }

    /// Exchanges client credentials for a bearer token.
    ///
    /// # Errors
    ///
    /// Returns `AppError::AuthFailed` on a rejected credential,
    /// `AppError::NetworkError` / `AppError::Timeout` on transport failures.
    async fn authenticate(&self) -> Result<AuthToken, AppError> {
        let resp = self
            .client
            .post(Self::TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::AuthFailed(format!(
                "Token request rejected: HTTP {}",
                status.as_u16()
            )));
        }
        if !status.is_success() {
            return Err(AppError::ClientError(format!(
                "HTTP {} from token endpoint",
                status.as_u16()
            )));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| AppError::ClientError(e.to_string()))?;

        let lifetime = Duration::from_secs(token.expires_in);
        let expires_at = Instant::now() + lifetime.saturating_sub(Self::EXPIRY_SLACK);

        tracing::debug!(expires_in = token.expires_in, "Acquired gateway token");

        Ok(AuthToken {
            access_token: token.access_token,
            expires_at,
        })
    }

    /// Returns a valid bearer token, re-authenticating when absent or
    /// expired.
    async fn bearer(&self) -> Result<String, AppError> {
        let mut guard = self.token.lock().await;
        match guard.as_ref() {
            Some(token) if !token.is_expired() => Ok(token.access_token.clone()),
            _ => {
                let fresh = self.authenticate().await?;
                let access = fresh.access_token.clone();
                *guard = Some(fresh);
                Ok(access)
            }
        }
    }

    /// Resolves full records for up to [`RESOLVE_CHUNK_MAX`] identifiers.
    ///
    /// Unresolvable identifiers are dropped from the result, not errors.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ClientError` when `ids` exceeds the upstream
    /// limit; chunking is the caller's job. Transport and auth failures
    /// propagate as their respective variants.
    pub async fn info(&self, collection: &str, ids: &[String]) -> Result<Vec<Record>, AppError> {
        if ids.len() > RESOLVE_CHUNK_MAX {
            return Err(AppError::ClientError(format!(
                "Resolve accepts at most {} ids, got {}",
                RESOLVE_CHUNK_MAX,
                ids.len()
            )));
        }
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let fullnames = prefixed_ids(ids);
        let body = self.request_with_retry(&fullnames).await?;

        Ok(parse_listing(collection, &body))
    }

    /// Performs the info GET with retry logic, re-authenticating once on a
    /// mid-flight token lapse.
    async fn request_with_retry(&self, fullnames: &str) -> Result<Value, AppError> {
        let mut last_error = AppError::Generic("No attempts made".to_string());

        for attempt in 1..=Self::MAX_RETRIES {
            let bearer = self.bearer().await?;

            let result = self
                .client
                .get(Self::API_URL)
                .bearer_auth(&bearer)
                .query(&[("id", fullnames)])
                .send()
                .await;

            match result {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_success() {
                        return resp
                            .json()
                            .await
                            .map_err(|e| AppError::ClientError(e.to_string()));
                    }

                    if status == StatusCode::UNAUTHORIZED {
                        // Token lapsed between check and use; drop it and retry
                        *self.token.lock().await = None;
                        last_error = AppError::AuthFailed("Token rejected".to_string());
                        continue;
                    }

                    if status == StatusCode::TOO_MANY_REQUESTS {
                        last_error = AppError::RateLimitExceeded;
                        if attempt < Self::MAX_RETRIES {
                            let delay = resp
                                .headers()
                                .get("retry-after")
                                .and_then(|v| v.to_str().ok())
                                .and_then(|v| v.parse::<u64>().ok())
                                .map(Duration::from_secs)
                                .unwrap_or(Self::RETRY_BASE_DELAY * 2_u32.pow(attempt));
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
                        "HTTP {} from gateway",
                        status.as_u16()
                    )));
                }
                Err(e) => {
                    last_error = transport_error(e);
                    if attempt < Self::MAX_RETRIES {
                        sleep(Self::RETRY_BASE_DELAY * attempt).await;
                        continue;
                    }
                }
            }
        }

        Err(last_error)
    }
}

fn transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(GatewayClient::REQUEST_TIMEOUT.as_secs())
    } else if e.is_connect() {
        AppError::NetworkError(format!("Connection failed: {}", e))
    } else {
        AppError::ClientError(e.to_string())
    }
}

/// Joins bare ids into the comma-separated prefixed form the API expects.
fn prefixed_ids(ids: &[String]) -> String {
    ids.iter()
        .map(|id| format!("{}{}", GatewayClient::ID_PREFIX, id))
        .collect::<Vec<_>>()
        .join(",")
}

/// Extracts records from a listing payload, dropping malformed children.
fn parse_listing(collection: &str, body: &Value) -> Vec<Record> {
    let children = body
        .get("data")
        .and_then(|d| d.get("children"))
        .and_then(Value::as_array);

    let Some(children) = children else {
        tracing::warn!("Gateway response missing listing children");
        return Vec::new();
    };

    children
        .iter()
        .filter_map(|child| child.get("data"))
        .filter_map(|data| match Record::from_json(collection, data) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(error = %e, "Dropping malformed listing entry");
                None
            }
        })
        .collect()
}

impl ResolveSource for GatewayClient {
    async fn resolve(&self, collection: &str, ids: &[String]) -> Result<Vec<Record>, AppError> {
        self.info(collection, ids).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prefixed_ids() {
        let ids = vec!["abc".to_string(), "def".to_string()];
        assert_eq!(prefixed_ids(&ids), "t3_abc,t3_def");
    }

    #[test]
    fn test_token_response_deserializes() {
        let body = r#"{ "access_token": "tok", "token_type": "bearer", "expires_in": 3600 }"#;
        let token: TokenResponse = serde_json::from_str(body).unwrap();
        assert_eq!(token.access_token, "tok");
        assert_eq!(token.expires_in, 3600);
    }

    #[test]
    fn test_auth_token_expiry() {
        let expired = AuthToken {
            access_token: "tok".to_string(),
            expires_at: Instant::now() - Duration::from_secs(1),
        };
        assert!(expired.is_expired());

        let valid = AuthToken {
            access_token: "tok".to_string(),
            expires_at: Instant::now() + Duration::from_secs(3600),
        };
        assert!(!valid.is_expired());
    }

    #[test]
    fn test_parse_listing() {
        let body = json!({
            "kind": "Listing",
            "data": {
                "children": [
                    { "kind": "t3", "data": { "id": "abc", "created_utc": 100.0, "ups": 4 } },
                    { "kind": "t3", "data": { "ups": 4 } }
                ]
            }
        });
        let records = parse_listing("test", &body);
        assert_eq!(records.len(), 1); // malformed child dropped
        assert_eq!(records[0].id, "abc");
        assert_eq!(records[0].collection, "test");
    }

    #[test]
    fn test_parse_listing_missing_children() {
        let records = parse_listing("test", &json!({ "error": 500 }));
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_info_rejects_oversized_chunk() {
        let client = GatewayClient::new("id", "secret", "test/0.1").unwrap();
        let ids: Vec<String> = (0..101).map(|i| format!("id{}", i)).collect();
        let result = client.info("test", &ids).await;
        assert!(matches!(result, Err(AppError::ClientError(_))));
    }

    #[tokio::test]
    async fn test_info_empty_ids_short_circuits() {
        let client = GatewayClient::new("id", "secret", "test/0.1").unwrap();
        let records = client.info("test", &[]).await.unwrap();
        assert!(records.is_empty());
    }
}
