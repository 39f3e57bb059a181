//! Shared test harness: an in-memory catalog service and a wired orchestrator

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use shelf_common::events::EventBus;
use shelf_common::time::{Clock, ManualClock};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use shelf_sync::config::{RemoteConfig, SyncConfig};
use shelf_sync::services::{
    ApiRequest, CatalogTransport, ClientError, MemoryCacheStore, RateLimitConfig, RawResponse,
    SyncOrchestrator,
};
use shelf_sync::utils::RetryPolicy;

pub const USERNAME: &str = "digger";
pub const START_MILLIS: i64 = 1_700_000_000_000;
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Fake catalog service
///
/// Item `i` (1-based) is release `100 + i` with instance `i`, pointing at
/// master `5000 + (i - 1) % distinct_masters`.
pub struct FakeCatalog {
    items: usize,
    distinct_masters: usize,
    delay: Duration,
    calls: Mutex<HashMap<&'static str, usize>>,
    throttled_pages: Mutex<HashSet<u32>>,
    failing_pages: Mutex<HashMap<u32, u16>>,
    status_override: Mutex<Option<u16>>,
    repeated_on_page: Mutex<Option<(u32, usize)>>,
}

impl FakeCatalog {
    pub fn new(items: usize) -> Self {
        Self {
            items,
            distinct_masters: items.max(1),
            delay: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
            throttled_pages: Mutex::new(HashSet::new()),
            failing_pages: Mutex::new(HashMap::new()),
            status_override: Mutex::new(None),
            repeated_on_page: Mutex::new(None),
        }
    }

    /// Spread the items over `count` masters
    pub fn with_shared_masters(mut self, count: usize) -> Self {
        self.distinct_masters = count.max(1);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Answer the first request for `page` with 429
    pub fn throttle_page_once(&self, page: u32) {
        self.throttled_pages.lock().unwrap().insert(page);
    }

    /// Answer every request for `page` with `status`
    pub fn fail_page(&self, page: u32, status: u16) {
        self.failing_pages.lock().unwrap().insert(page, status);
    }

    /// Answer every request with `status`, or go back to normal with `None`
    pub fn set_status_override(&self, status: Option<u16>) {
        *self.status_override.lock().unwrap() = status;
    }

    /// Serve item `index` again at the top of `page`, as if it moved while listing
    pub fn repeat_item_on_page(&self, page: u32, index: usize) {
        *self.repeated_on_page.lock().unwrap() = Some((page, index));
    }

    /// Requests seen for one kind ("collection_page", "release", "master", "identity")
    pub fn calls(&self, kind: &str) -> usize {
        self.calls.lock().unwrap().get(kind).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    pub fn master_id_for(&self, index: usize) -> u64 {
        5000 + ((index - 1) % self.distinct_masters) as u64
    }

    fn page_body(&self, page: u32, per_page: u32) -> Value {
        let per_page = per_page.max(1) as usize;
        let pages = self.items.div_ceil(per_page);
        let start = (page as usize - 1) * per_page + 1;
        let end = (start + per_page - 1).min(self.items);

        let mut releases: Vec<Value> = (start..=end).map(|i| self.item_json(i)).collect();
        if let Some((repeat_page, index)) = *self.repeated_on_page.lock().unwrap() {
            if repeat_page == page {
                releases.insert(0, self.item_json(index));
            }
        }

        json!({
            "pagination": {
                "page": page,
                "pages": pages,
                "per_page": per_page,
                "items": self.items,
            },
            "releases": releases,
        })
    }

    fn item_json(&self, index: usize) -> Value {
        json!({
            "id": 100 + index,
            "instance_id": index,
            "date_added": "2023-05-01T10:00:00-07:00",
            "rating": 0,
            "basic_information": {
                "id": 100 + index,
                "master_id": self.master_id_for(index),
                "title": format!("Record {}", index),
                "year": 1970 + (index % 30),
                "cover_image": format!("https://img.example.test/{}.jpg", index),
                "artists": [{"name": format!("Artist {} (2)", index)}],
                "labels": [{"name": "Test Label", "catno": format!("TL-{}", index)}],
                "genres": ["Rock"],
                "styles": [],
            },
        })
    }

    fn release_json(&self, id: u64) -> Value {
        let index = (id - 100) as usize;
        json!({
            "id": id,
            "title": format!("Record {}", index),
            "year": 1970 + (index % 30),
            "master_id": self.master_id_for(index),
            "artists": [{"name": format!("Artist {}", index)}],
            "labels": [{"name": "Test Label", "catno": format!("TL-{}", index)}],
            "tracklist": [
                {"position": "A1", "title": "Opening", "duration": "3:41", "type_": "track"},
                {"position": "B1", "title": "Closing", "duration": "4:02", "type_": "track"},
            ],
            "genres": ["Rock"],
            "styles": ["Psychedelic Rock"],
            "notes": "Gatefold [b]sleeve[/b].",
            "released": "1971-03-00",
            "uri": format!("https://catalog.example.test/release/{}", id),
        })
    }

    fn master_json(&self, id: u64) -> Value {
        json!({
            "id": id,
            "title": format!("Master {}", id),
            "year": 1969,
            "genres": ["Rock", "Blues"],
            "styles": ["Blues Rock"],
            "uri": format!("https://catalog.example.test/master/{}", id),
        })
    }
}

#[async_trait]
impl CatalogTransport for FakeCatalog {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ClientError> {
        *self.calls.lock().unwrap().entry(request.kind()).or_insert(0) += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(status) = *self.status_override.lock().unwrap() {
            return Ok(RawResponse::with_status(
                status,
                json!({"message": format!("scripted {}", status)}).to_string(),
            ));
        }

        let body = match request {
            ApiRequest::Identity => json!({"id": 1, "username": USERNAME}),
            ApiRequest::CollectionPage { page, per_page, .. } => {
                if let Some(status) = self.failing_pages.lock().unwrap().get(page) {
                    return Ok(RawResponse::with_status(*status, "{}"));
                }
                if self.throttled_pages.lock().unwrap().remove(page) {
                    return Ok(RawResponse {
                        status: 429,
                        body: json!({"message": "You are making requests too quickly."})
                            .to_string(),
                        retry_after_secs: Some(0),
                        rate_limit: None,
                    });
                }
                self.page_body(*page, *per_page)
            }
            ApiRequest::Release { id } => self.release_json(*id),
            ApiRequest::Master { id } => self.master_json(*id),
        };

        Ok(RawResponse::ok(body.to_string()))
    }
}

/// Resolved configuration with fast retries and no effective throttling
pub fn test_config() -> SyncConfig {
    SyncConfig {
        remote: RemoteConfig {
            base_url: "http://catalog.example.test".to_string(),
            token: "test-token".to_string(),
            username: Some(USERNAME.to_string()),
            request_timeout: Duration::from_secs(5),
        },
        rate_limit: RateLimitConfig {
            requests_per_interval: 10_000,
            interval_ms: 1_000,
            max_concurrent: 8,
        },
        retry: RetryPolicy::new(3, 1, 5),
        page_size: 100,
        enrichment_batch_size: 10,
        cache_ttl: CACHE_TTL,
    }
}

/// Orchestrator wired to a [`FakeCatalog`] and an in-memory store
pub struct Harness {
    pub catalog: Arc<FakeCatalog>,
    pub store: Arc<MemoryCacheStore>,
    pub clock: ManualClock,
    pub events: EventBus,
    pub orchestrator: Arc<SyncOrchestrator>,
}

impl Harness {
    pub fn new(catalog: FakeCatalog) -> Self {
        Self::with_config(catalog, test_config())
    }

    pub fn with_config(catalog: FakeCatalog, config: SyncConfig) -> Self {
        let catalog = Arc::new(catalog);
        let store = Arc::new(MemoryCacheStore::new());
        let clock = ManualClock::new(START_MILLIS);
        let events = EventBus::new(1_000);

        let orchestrator = Arc::new(shelf_sync::build_orchestrator(
            &config,
            catalog.clone(),
            store.clone(),
            Arc::new(clock.clone()) as Arc<dyn Clock>,
            events.clone(),
        ));

        Self {
            catalog,
            store,
            clock,
            events,
            orchestrator,
        }
    }
}
