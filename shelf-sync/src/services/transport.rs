//! Remote catalog transport
//!
//! [`CatalogTransport`] is the seam between the pipeline and the network.
//! [`HttpTransport`] talks to the provider with `reqwest`; tests swap in an
//! in-memory implementation. A transport only moves bytes: status
//! classification, throttling and retries live in the rate-limited client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Remote client errors
#[derive(Debug, Error)]
pub enum ClientError {
    /// 401/403: token missing, invalid or lacking permission
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// 429: provider rate limit hit
    #[error("Rate limit exceeded (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// 404
    #[error("Not found: {0}")]
    NotFound(String),

    /// 400/422: the request itself was rejected
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// 5xx
    #[error("Server error {status}")]
    Server { status: u16 },

    /// Unexpected non-success status
    #[error("Unexpected status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Response body did not match the expected schema
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ClientError>,
    },
}

impl ClientError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::RateLimited { .. }
                | ClientError::Server { .. }
                | ClientError::Network(_)
                | ClientError::Timeout(_)
        )
    }

    /// Server-provided wait hint
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ClientError::RateLimited {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }

    /// Innermost error, looking through retry exhaustion
    pub fn root(&self) -> &ClientError {
        match self {
            ClientError::RetriesExhausted { last, .. } => last.root(),
            other => other,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self.root(), ClientError::Auth(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), ClientError::NotFound(_))
    }
}

/// Remote operation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ApiRequest {
    /// One page of the user's collection (folder 0 = all)
    CollectionPage {
        username: String,
        page: u32,
        per_page: u32,
    },
    /// Per-item detail
    Release { id: u64 },
    /// Shared master record
    Master { id: u64 },
    /// Profile / connectivity check
    Identity,
}

impl ApiRequest {
    /// Path and query relative to the provider base URL
    pub fn path(&self) -> String {
        match self {
            ApiRequest::CollectionPage {
                username,
                page,
                per_page,
            } => format!(
                "/users/{}/collection/folders/0/releases?page={}&per_page={}&sort=added&sort_order=desc",
                username, page, per_page
            ),
            ApiRequest::Release { id } => format!("/releases/{}", id),
            ApiRequest::Master { id } => format!("/masters/{}", id),
            ApiRequest::Identity => "/oauth/identity".to_string(),
        }
    }

    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ApiRequest::CollectionPage { .. } => "collection_page",
            ApiRequest::Release { .. } => "release",
            ApiRequest::Master { .. } => "master",
            ApiRequest::Identity => "identity",
        }
    }
}

impl std::fmt::Display for ApiRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiRequest::CollectionPage { page, .. } => write!(f, "collection page {}", page),
            ApiRequest::Release { id } => write!(f, "release {}", id),
            ApiRequest::Master { id } => write!(f, "master {}", id),
            ApiRequest::Identity => write!(f, "identity"),
        }
    }
}

/// Rate-limit usage reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitUsage {
    /// Requests allowed per window
    pub limit: u32,
    /// Requests used in the current window
    pub used: u32,
    /// Requests left in the current window
    pub remaining: u32,
}

impl RateLimitUsage {
    pub const LIMIT_HEADER: &'static str = "x-discogs-ratelimit";
    pub const USED_HEADER: &'static str = "x-discogs-ratelimit-used";
    pub const REMAINING_HEADER: &'static str = "x-discogs-ratelimit-remaining";

    /// Parse the usage headers through a case-insensitive header lookup
    ///
    /// Returns `None` unless all three headers are present and numeric.
    pub fn from_headers<'a, F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<&'a str>,
    {
        let parse = |name: &str| lookup(name).and_then(|v| v.trim().parse::<u32>().ok());
        Some(Self {
            limit: parse(Self::LIMIT_HEADER)?,
            used: parse(Self::USED_HEADER)?,
            remaining: parse(Self::REMAINING_HEADER)?,
        })
    }
}

/// Unclassified response
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
    /// `Retry-After` header in seconds
    pub retry_after_secs: Option<u64>,
    pub rate_limit: Option<RateLimitUsage>,
}

impl RawResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            ..Default::default()
        }
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            ..Default::default()
        }
    }
}

/// Moves one request to the provider and back
#[async_trait]
pub trait CatalogTransport: Send + Sync {
    /// Send the request once
    ///
    /// # Errors
    /// Only transport-level failures (`Network`, `Timeout`); any HTTP status
    /// is returned as a [`RawResponse`].
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ClientError>;
}

/// `reqwest` transport
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpTransport {
    /// Build the HTTP client
    ///
    /// The token is sent as `Authorization: Discogs token=…`, the user agent
    /// identifies this client to the provider.
    pub fn new(
        base_url: &str,
        token: &str,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl CatalogTransport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ClientError> {
        let url = format!("{}{}", self.base_url, request.path());

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Discogs token={}", self.token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::Timeout(format!("{}: {}", request, e))
                } else {
                    ClientError::Network(format!("{}: {}", request, e))
                }
            })?;

        let status = response.status().as_u16();
        let headers = response.headers();
        let rate_limit =
            RateLimitUsage::from_headers(|name| headers.get(name).and_then(|v| v.to_str().ok()));
        let retry_after_secs = headers
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        let body = response.text().await.map_err(|e| {
            if e.is_timeout() {
                ClientError::Timeout(format!("{}: {}", request, e))
            } else {
                ClientError::Network(format!("{}: {}", request, e))
            }
        })?;

        Ok(RawResponse {
            status,
            body,
            retry_after_secs,
            rate_limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_request_paths() {
        let page = ApiRequest::CollectionPage {
            username: "digger".into(),
            page: 2,
            per_page: 100,
        };
        assert!(page
            .path()
            .starts_with("/users/digger/collection/folders/0/releases?page=2&per_page=100"));
        assert_eq!(ApiRequest::Release { id: 9 }.path(), "/releases/9");
        assert_eq!(ApiRequest::Master { id: 3 }.path(), "/masters/3");
        assert_eq!(ApiRequest::Identity.path(), "/oauth/identity");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ClientError::RateLimited { retry_after_secs: None }.is_retryable());
        assert!(ClientError::Server { status: 502 }.is_retryable());
        assert!(ClientError::Network("reset".into()).is_retryable());
        assert!(ClientError::Timeout("slow".into()).is_retryable());
        assert!(!ClientError::Auth("401".into()).is_retryable());
        assert!(!ClientError::NotFound("gone".into()).is_retryable());
        assert!(!ClientError::InvalidRequest("bad".into()).is_retryable());
        assert!(!ClientError::Decode("json".into()).is_retryable());
    }

    #[test]
    fn test_root_looks_through_exhaustion() {
        let err = ClientError::RetriesExhausted {
            attempts: 4,
            last: Box::new(ClientError::Auth("expired".into())),
        };
        assert!(err.is_auth());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_rate_limit_usage_from_headers() {
        let headers: HashMap<&str, &str> = [
            ("x-discogs-ratelimit", "60"),
            ("x-discogs-ratelimit-used", "12"),
            ("x-discogs-ratelimit-remaining", "48"),
        ]
        .into_iter()
        .collect();

        let usage = RateLimitUsage::from_headers(|name| headers.get(name).copied()).unwrap();
        assert_eq!(
            usage,
            RateLimitUsage {
                limit: 60,
                used: 12,
                remaining: 48
            }
        );
    }

    #[test]
    fn test_rate_limit_usage_requires_all_headers() {
        let headers: HashMap<&str, &str> = [("x-discogs-ratelimit", "60")].into_iter().collect();
        assert!(RateLimitUsage::from_headers(|name| headers.get(name).copied()).is_none());
    }

    #[test]
    fn test_http_transport_trims_base_url() {
        let transport = HttpTransport::new(
            "https://api.example.test/",
            "token",
            "shelf-test",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(transport.base_url(), "https://api.example.test");
    }
}
