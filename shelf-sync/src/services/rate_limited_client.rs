//! Rate-limited remote client
//!
//! Every outbound call goes through [`RateLimitedClient::execute`]:
//! - at most `max_concurrent` requests in flight (semaphore)
//! - at most `requests_per_interval` requests per rolling `interval_ms`
//!   (GCRA token bucket from `governor`, burst = N, one token every interval/N)
//! - responses classified into [`ClientError`]s; transient ones retried with
//!   exponential backoff, auth/not-found/invalid-request fail immediately
//!
//! Permits and tokens are taken per attempt, so a request sleeping in
//! backoff does not hold a concurrency slot.

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::services::transport::{ApiRequest, CatalogTransport, ClientError, RateLimitUsage, RawResponse};
use crate::utils::retry::RetryPolicy;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Outbound throttling configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// N: requests allowed per interval
    pub requests_per_interval: u32,
    /// Rolling interval length; 0 disables interval throttling
    pub interval_ms: u64,
    /// C: requests allowed in flight at once
    pub max_concurrent: usize,
}

impl Default for RateLimitConfig {
    /// Authenticated provider limit: 60 requests per minute
    fn default() -> Self {
        Self {
            requests_per_interval: 60,
            interval_ms: 60_000,
            max_concurrent: 3,
        }
    }
}

impl RateLimitConfig {
    fn quota(&self) -> Quota {
        let burst = NonZeroU32::new(self.requests_per_interval.max(1)).unwrap_or(NonZeroU32::MIN);
        let period = Duration::from_millis(self.interval_ms) / burst.get();

        match Quota::with_period(period) {
            Some(quota) => quota.allow_burst(burst),
            // Zero interval: effectively unthrottled
            None => Quota::per_second(NonZeroU32::MAX),
        }
    }
}

/// Snapshot of client counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetrics {
    /// Attempts sent to the transport, retries included
    pub requests_sent: u64,
    pub retries: u64,
    /// 429 responses received
    pub rate_limited_responses: u64,
    /// Last usage reported by the provider
    pub last_rate_limit: Option<RateLimitUsage>,
}

impl ClientMetrics {
    /// Counters accumulated since `earlier`
    pub fn since(&self, earlier: &ClientMetrics) -> ClientMetrics {
        ClientMetrics {
            requests_sent: self.requests_sent.saturating_sub(earlier.requests_sent),
            retries: self.retries.saturating_sub(earlier.retries),
            rate_limited_responses: self
                .rate_limited_responses
                .saturating_sub(earlier.rate_limited_responses),
            last_rate_limit: self.last_rate_limit,
        }
    }
}

#[derive(Default)]
struct Counters {
    requests_sent: AtomicU64,
    retries: AtomicU64,
    rate_limited: AtomicU64,
    last_usage: Mutex<Option<RateLimitUsage>>,
}

/// Throttled, retrying client over a [`CatalogTransport`]
pub struct RateLimitedClient {
    transport: Arc<dyn CatalogTransport>,
    limiter: DirectLimiter,
    permits: Semaphore,
    retry: RetryPolicy,
    counters: Counters,
}

impl RateLimitedClient {
    pub fn new(
        transport: Arc<dyn CatalogTransport>,
        rate_limit: &RateLimitConfig,
        retry: RetryPolicy,
    ) -> Self {
        tracing::debug!(
            requests_per_interval = rate_limit.requests_per_interval,
            interval_ms = rate_limit.interval_ms,
            max_concurrent = rate_limit.max_concurrent,
            "Creating rate-limited client"
        );

        Self {
            transport,
            limiter: RateLimiter::direct(rate_limit.quota()),
            permits: Semaphore::new(rate_limit.max_concurrent.max(1)),
            retry,
            counters: Counters::default(),
        }
    }

    /// Execute one remote operation with throttling and retries
    pub async fn execute(&self, request: &ApiRequest) -> Result<RawResponse, ClientError> {
        self.retry
            .execute(
                request.kind(),
                || self.attempt(request),
                |_| {
                    self.counters.retries.fetch_add(1, Ordering::Relaxed);
                },
            )
            .await
    }

    /// Execute and decode the JSON body
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
    ) -> Result<T, ClientError> {
        let response = self.execute(request).await?;
        serde_json::from_str(&response.body)
            .map_err(|e| ClientError::Decode(format!("{}: {}", request, e)))
    }

    pub fn metrics(&self) -> ClientMetrics {
        ClientMetrics {
            requests_sent: self.counters.requests_sent.load(Ordering::Relaxed),
            retries: self.counters.retries.load(Ordering::Relaxed),
            rate_limited_responses: self.counters.rate_limited.load(Ordering::Relaxed),
            last_rate_limit: self.last_rate_limit(),
        }
    }

    pub fn last_rate_limit(&self) -> Option<RateLimitUsage> {
        match self.counters.last_usage.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// One attempt: concurrency slot, rate token, send, classify
    async fn attempt(&self, request: &ApiRequest) -> Result<RawResponse, ClientError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ClientError::Network("request queue closed".to_string()))?;

        self.limiter.until_ready().await;

        self.counters.requests_sent.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(request = %request, "Sending remote request");

        let response = self.transport.send(request).await?;

        if let Some(usage) = response.rate_limit {
            self.record_usage(usage);
        }

        self.classify(request, response)
    }

    fn record_usage(&self, usage: RateLimitUsage) {
        tracing::debug!(
            limit = usage.limit,
            used = usage.used,
            remaining = usage.remaining,
            "Provider rate-limit usage"
        );
        match self.counters.last_usage.lock() {
            Ok(mut guard) => *guard = Some(usage),
            Err(poisoned) => *poisoned.into_inner() = Some(usage),
        }
    }

    fn classify(&self, request: &ApiRequest, response: RawResponse) -> Result<RawResponse, ClientError> {
        let status = response.status;

        if (200..300).contains(&status) {
            return Ok(response);
        }

        let message = error_message(&response.body)
            .unwrap_or_else(|| format!("{} returned HTTP {}", request, status));

        match status {
            401 | 403 => Err(ClientError::Auth(message)),
            404 => Err(ClientError::NotFound(request.to_string())),
            400 | 422 => Err(ClientError::InvalidRequest(message)),
            429 => {
                self.counters.rate_limited.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    request = %request,
                    retry_after_secs = ?response.retry_after_secs,
                    "Provider rate limit hit"
                );
                Err(ClientError::RateLimited {
                    retry_after_secs: response.retry_after_secs,
                })
            }
            500..=599 => Err(ClientError::Server { status }),
            _ => Err(ClientError::Status { status, message }),
        }
    }
}

/// Provider error bodies look like `{"message": "..."}`
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(|m| m.as_str())
        .map(|m| m.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    /// Replays scripted responses and tracks in-flight requests
    #[derive(Default)]
    struct ScriptedTransport {
        script: Mutex<VecDeque<Result<RawResponse, ClientError>>>,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
    }

    impl ScriptedTransport {
        fn new(script: Vec<Result<RawResponse, ClientError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Default::default()
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl CatalogTransport for ScriptedTransport {
        async fn send(&self, _request: &ApiRequest) -> Result<RawResponse, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(RawResponse::ok("{}")))
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::new(3, 1, 5)
    }

    fn unthrottled(max_concurrent: usize) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_interval: 1_000,
            interval_ms: 1_000,
            max_concurrent,
        }
    }

    #[tokio::test]
    async fn test_auth_error_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(RawResponse::with_status(
            401,
            r#"{"message": "You must authenticate to access this resource."}"#,
        ))]));
        let client = RateLimitedClient::new(transport.clone(), &unthrottled(2), fast_retry());

        let result = client.execute(&ApiRequest::Identity).await;

        match result {
            Err(ClientError::Auth(message)) => assert!(message.contains("authenticate")),
            other => panic!("expected auth error, got {:?}", other),
        }
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.metrics().retries, 0);
    }

    #[tokio::test]
    async fn test_not_found_and_invalid_request_not_retried() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(RawResponse::with_status(404, "")),
            Ok(RawResponse::with_status(422, r#"{"message": "bad page"}"#)),
        ]));
        let client = RateLimitedClient::new(transport.clone(), &unthrottled(2), fast_retry());

        let not_found = client.execute(&ApiRequest::Master { id: 5 }).await;
        let invalid = client.execute(&ApiRequest::Release { id: 6 }).await;

        assert!(matches!(not_found, Err(ClientError::NotFound(ref m)) if m == "master 5"));
        assert!(matches!(invalid, Err(ClientError::InvalidRequest(ref m)) if m == "bad page"));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rate_limited_then_success() {
        let transport = Arc::new(ScriptedTransport::new(vec![
            Ok(RawResponse::with_status(429, "")),
            Ok(RawResponse::with_status(503, "")),
            Ok(RawResponse::ok(r#"{"id": 1, "username": "digger"}"#)),
        ]));
        let client = RateLimitedClient::new(transport.clone(), &unthrottled(2), fast_retry());

        let identity: crate::models::Identity =
            client.execute_json(&ApiRequest::Identity).await.unwrap();

        assert_eq!(identity.username, "digger");
        let metrics = client.metrics();
        assert_eq!(metrics.requests_sent, 3);
        assert_eq!(metrics.retries, 2);
        assert_eq!(metrics.rate_limited_responses, 1);
    }

    #[tokio::test]
    async fn test_network_errors_exhaust_retries() {
        let transport = Arc::new(ScriptedTransport::new(
            (0..4)
                .map(|_| Err(ClientError::Network("connection reset".into())))
                .collect(),
        ));
        let client = RateLimitedClient::new(transport.clone(), &unthrottled(1), fast_retry());

        let result = client.execute(&ApiRequest::Release { id: 1 }).await;

        assert!(matches!(
            result,
            Err(ClientError::RetriesExhausted { attempts: 4, .. })
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_decode_error_on_bad_body() {
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(RawResponse::ok("not json"))]));
        let client = RateLimitedClient::new(transport, &unthrottled(1), fast_retry());

        let result: Result<crate::models::Identity, _> =
            client.execute_json(&ApiRequest::Identity).await;

        assert!(matches!(result, Err(ClientError::Decode(_))));
    }

    #[tokio::test]
    async fn test_rate_limit_usage_recorded() {
        let mut response = RawResponse::ok("{}");
        response.rate_limit = Some(RateLimitUsage {
            limit: 60,
            used: 5,
            remaining: 55,
        });
        let transport = Arc::new(ScriptedTransport::new(vec![Ok(response)]));
        let client = RateLimitedClient::new(transport, &unthrottled(1), fast_retry());

        client.execute(&ApiRequest::Identity).await.unwrap();

        assert_eq!(client.last_rate_limit().map(|u| u.remaining), Some(55));
    }

    #[tokio::test]
    async fn test_concurrency_cap_respected() {
        let transport = Arc::new(ScriptedTransport::slow(Duration::from_millis(20)));
        let client = Arc::new(RateLimitedClient::new(
            transport.clone(),
            &unthrottled(2),
            fast_retry(),
        ));

        let requests: Vec<_> = (0..8)
            .map(|id| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.execute(&ApiRequest::Release { id }).await })
            })
            .collect();
        for handle in requests {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(transport.calls.load(Ordering::SeqCst), 8);
        assert!(transport.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_interval_cap_spaces_requests() {
        let transport = Arc::new(ScriptedTransport::default());
        let config = RateLimitConfig {
            requests_per_interval: 1,
            interval_ms: 100,
            max_concurrent: 4,
        };
        let client = RateLimitedClient::new(transport, &config, fast_retry());

        let start = Instant::now();
        for id in 0..3 {
            client.execute(&ApiRequest::Release { id }).await.unwrap();
        }

        // First request immediate, then one every 100ms
        assert!(start.elapsed() >= Duration::from_millis(180));
    }

    #[test]
    fn test_metrics_since() {
        let earlier = ClientMetrics {
            requests_sent: 10,
            retries: 1,
            rate_limited_responses: 1,
            last_rate_limit: None,
        };
        let later = ClientMetrics {
            requests_sent: 15,
            retries: 3,
            rate_limited_responses: 1,
            last_rate_limit: None,
        };
        let delta = later.since(&earlier);
        assert_eq!(delta.requests_sent, 5);
        assert_eq!(delta.retries, 2);
        assert_eq!(delta.rate_limited_responses, 0);
    }
}
