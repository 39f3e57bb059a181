//! Detail and master enrichment
//!
//! Items are processed in sequential batches. Inside a batch the per-item
//! detail requests and the requests for masters not seen yet in this run go
//! out together; masters that only the detail payload reveals are fetched
//! right after. Every distinct master id is requested at most once per run,
//! and a failed lookup is remembered as `None` so it is not retried by later
//! items.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{MasterRecord, RawCatalogItem, ReleaseDetail, SyncIssue};
use crate::services::rate_limited_client::RateLimitedClient;
use crate::services::transport::{ApiRequest, ClientError};

/// Catalog item plus its resolved master
#[derive(Debug, Clone)]
pub struct EnrichedItem {
    pub item: RawCatalogItem,
    pub master: Option<MasterRecord>,
}

/// Counters of one enrichment pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentStats {
    pub batches: usize,
    pub details_fetched: usize,
    pub details_failed: usize,
    pub masters_fetched: usize,
    pub masters_failed: usize,
    /// Item references to a master served from the run's memo
    pub masters_deduplicated: usize,
}

#[derive(Debug, Default)]
pub struct EnrichmentOutcome {
    pub items: Vec<EnrichedItem>,
    pub stats: EnrichmentStats,
    /// Non-fatal per-item problems
    pub issues: Vec<SyncIssue>,
}

pub struct EnrichmentEngine {
    client: Arc<RateLimitedClient>,
    batch_size: usize,
}

/// Per-run master memo, including failed lookups
type MasterMemo = HashMap<u64, Option<MasterRecord>>;

impl EnrichmentEngine {
    pub fn new(client: Arc<RateLimitedClient>, batch_size: usize) -> Self {
        Self {
            client,
            batch_size: batch_size.max(1),
        }
    }

    /// Enrich `items`, preserving their order
    ///
    /// Never fails: detail and master failures degrade the affected items and
    /// are reported in [`EnrichmentOutcome::issues`]. `on_batch(done, total)`
    /// is called after each batch.
    pub async fn enrich<F>(&self, items: Vec<RawCatalogItem>, on_batch: F) -> EnrichmentOutcome
    where
        F: Fn(usize, usize) + Send + Sync,
    {
        let total = items.len();
        let mut masters = MasterMemo::new();
        let mut outcome = EnrichmentOutcome {
            items: Vec::with_capacity(total),
            ..Default::default()
        };
        let mut master_references = 0usize;

        let mut remaining = items.into_iter();
        loop {
            let batch: Vec<RawCatalogItem> = remaining.by_ref().take(self.batch_size).collect();
            if batch.is_empty() {
                break;
            }
            outcome.stats.batches += 1;

            let wanted = unseen_masters(batch.iter().filter_map(|i| i.master_id()), &masters);

            let details = join_all(batch.iter().map(|item| self.fetch_detail(item.id)));
            let new_masters = join_all(wanted.iter().map(|id| self.fetch_master(*id)));
            let (details, new_masters) = tokio::join!(details, new_masters);

            self.remember_masters(&mut masters, wanted.into_iter().zip(new_masters), &mut outcome);

            let mut batch: Vec<RawCatalogItem> = batch
                .into_iter()
                .zip(details)
                .map(|(mut item, detail)| {
                    match detail {
                        Ok(detail) => {
                            outcome.stats.details_fetched += 1;
                            item.detail = Some(detail);
                        }
                        Err(e) => {
                            outcome.stats.details_failed += 1;
                            warn!(release_id = item.id, error = %e, "Detail fetch failed, keeping summary data");
                            outcome.issues.push(SyncIssue::warning(
                                "DETAIL_FETCH_FAILED",
                                format!("release {}: {}", item.id, e),
                            ));
                        }
                    }
                    item
                })
                .collect();

            // Masters only named by the detail payload
            let late = unseen_masters(batch.iter().filter_map(|i| i.master_id()), &masters);
            if !late.is_empty() {
                let fetched = join_all(late.iter().map(|id| self.fetch_master(*id))).await;
                self.remember_masters(&mut masters, late.into_iter().zip(fetched), &mut outcome);
            }

            for item in batch.drain(..) {
                let master = item.master_id().and_then(|id| {
                    master_references += 1;
                    masters.get(&id).cloned().flatten()
                });
                outcome.items.push(EnrichedItem { item, master });
            }

            debug!(
                batch = outcome.stats.batches,
                processed = outcome.items.len(),
                total,
                "Enrichment batch complete"
            );
            on_batch(outcome.items.len(), total);
        }

        outcome.stats.masters_deduplicated = master_references.saturating_sub(masters.len());

        info!(
            items = total,
            details_fetched = outcome.stats.details_fetched,
            details_failed = outcome.stats.details_failed,
            masters_fetched = outcome.stats.masters_fetched,
            masters_failed = outcome.stats.masters_failed,
            masters_deduplicated = outcome.stats.masters_deduplicated,
            "Enrichment complete"
        );

        outcome
    }

    fn remember_masters(
        &self,
        memo: &mut MasterMemo,
        results: impl Iterator<Item = (u64, Result<MasterRecord, ClientError>)>,
        outcome: &mut EnrichmentOutcome,
    ) {
        for (id, result) in results {
            match result {
                Ok(master) => {
                    outcome.stats.masters_fetched += 1;
                    memo.insert(id, Some(master));
                }
                Err(e) => {
                    outcome.stats.masters_failed += 1;
                    warn!(master_id = id, error = %e, "Master fetch failed");
                    outcome.issues.push(SyncIssue::warning(
                        "MASTER_FETCH_FAILED",
                        format!("master {}: {}", id, e),
                    ));
                    memo.insert(id, None);
                }
            }
        }
    }

    async fn fetch_detail(&self, release_id: u64) -> Result<ReleaseDetail, ClientError> {
        self.client
            .execute_json(&ApiRequest::Release { id: release_id })
            .await
    }

    async fn fetch_master(&self, master_id: u64) -> Result<MasterRecord, ClientError> {
        self.client
            .execute_json(&ApiRequest::Master { id: master_id })
            .await
    }
}

/// Distinct ids not in the memo, in first-seen order
fn unseen_masters(ids: impl Iterator<Item = u64>, memo: &MasterMemo) -> Vec<u64> {
    let mut seen = HashSet::new();
    ids.filter(|id| !memo.contains_key(id) && seen.insert(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BasicInformation;
    use crate::services::rate_limited_client::RateLimitConfig;
    use crate::services::transport::{CatalogTransport, RawResponse};
    use crate::utils::RetryPolicy;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Releases point at master `id / 10`; master 0 is absent, master 2 fails
    #[derive(Default)]
    struct MasterTransport {
        master_requests: Mutex<Vec<u64>>,
        failing_releases: Vec<u64>,
    }

    #[async_trait]
    impl CatalogTransport for MasterTransport {
        async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ClientError> {
            match request {
                ApiRequest::Release { id } if self.failing_releases.contains(id) => {
                    Ok(RawResponse::with_status(404, ""))
                }
                ApiRequest::Release { id } => Ok(RawResponse::ok(
                    json!({"id": id, "title": format!("Release {}", id), "master_id": id / 10})
                        .to_string(),
                )),
                ApiRequest::Master { id } => {
                    self.master_requests.lock().unwrap().push(*id);
                    if *id == 2 {
                        Ok(RawResponse::with_status(404, ""))
                    } else {
                        Ok(RawResponse::ok(json!({"id": id, "year": 1960 + id}).to_string()))
                    }
                }
                _ => Ok(RawResponse::with_status(404, "")),
            }
        }
    }

    fn engine(transport: Arc<MasterTransport>, batch_size: usize) -> EnrichmentEngine {
        let config = RateLimitConfig {
            requests_per_interval: 1_000,
            interval_ms: 1_000,
            max_concurrent: 4,
        };
        let client = RateLimitedClient::new(transport, &config, RetryPolicy::new(0, 1, 1));
        EnrichmentEngine::new(Arc::new(client), batch_size)
    }

    fn item(id: u64, summary_master: Option<u64>) -> RawCatalogItem {
        RawCatalogItem {
            id,
            basic_information: BasicInformation {
                master_id: summary_master,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_shared_master_fetched_once_across_batches() {
        let transport = Arc::new(MasterTransport::default());
        let items = (10..20).map(|id| item(id, Some(1))).collect();

        let outcome = engine(transport.clone(), 3).enrich(items, |_, _| {}).await;

        assert_eq!(*transport.master_requests.lock().unwrap(), vec![1]);
        assert_eq!(outcome.items.len(), 10);
        assert!(outcome.items.iter().all(|e| e.master.as_ref().map(|m| m.id) == Some(1)));
        assert_eq!(outcome.stats.batches, 4);
        assert_eq!(outcome.stats.masters_fetched, 1);
        assert_eq!(outcome.stats.masters_deduplicated, 9);
    }

    #[tokio::test]
    async fn test_failed_master_memoized_as_none() {
        let transport = Arc::new(MasterTransport::default());
        let items = vec![item(20, Some(2)), item(21, Some(2)), item(22, Some(2))];

        let outcome = engine(transport.clone(), 1).enrich(items, |_, _| {}).await;

        assert_eq!(*transport.master_requests.lock().unwrap(), vec![2]);
        assert!(outcome.items.iter().all(|e| e.master.is_none()));
        assert_eq!(outcome.stats.masters_failed, 1);
        assert_eq!(outcome.issues.len(), 1);
        assert_eq!(outcome.issues[0].code, "MASTER_FETCH_FAILED");
    }

    #[tokio::test]
    async fn test_master_revealed_by_detail_is_fetched() {
        let transport = Arc::new(MasterTransport::default());
        let items = vec![item(35, None)];

        let outcome = engine(transport.clone(), 10).enrich(items, |_, _| {}).await;

        assert_eq!(*transport.master_requests.lock().unwrap(), vec![3]);
        assert_eq!(outcome.items[0].master.as_ref().and_then(|m| m.year), Some(1963));
    }

    #[tokio::test]
    async fn test_detail_failure_keeps_summary_and_order() {
        let transport = Arc::new(MasterTransport {
            failing_releases: vec![11],
            ..Default::default()
        });
        let items = vec![item(10, Some(1)), item(11, Some(1)), item(12, Some(1))];
        let progress = Mutex::new(Vec::new());

        let outcome = engine(transport, 2)
            .enrich(items, |done, total| progress.lock().unwrap().push((done, total)))
            .await;

        let ids: Vec<u64> = outcome.items.iter().map(|e| e.item.id).collect();
        assert_eq!(ids, vec![10, 11, 12]);
        assert!(outcome.items[1].item.detail.is_none());
        assert!(outcome.items[1].master.is_some());
        assert_eq!(outcome.stats.details_failed, 1);
        assert_eq!(outcome.issues[0].code, "DETAIL_FETCH_FAILED");
        assert_eq!(*progress.lock().unwrap(), vec![(2, 3), (3, 3)]);
    }

    #[test]
    fn test_unseen_masters_skips_memo_and_repeats() {
        let mut memo = MasterMemo::new();
        memo.insert(5, None);
        let ids = unseen_masters(vec![4, 5, 4, 6].into_iter(), &memo);
        assert_eq!(ids, vec![4, 6]);
    }
}
