//! Paginated collection retrieval
//!
//! Page 1 is fetched alone to learn the page count; pages 2..N are then
//! requested together and the client's concurrency cap bounds how many are
//! actually in flight. Results are concatenated in page order.

use futures::future::try_join_all;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{CollectionPage, RawCatalogItem};
use crate::services::rate_limited_client::RateLimitedClient;
use crate::services::transport::{ApiRequest, ClientError};

/// Collection fetch failure
///
/// Any page failing aborts the whole fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Failed to fetch collection page {page}: {source}")]
    Page {
        page: u32,
        #[source]
        source: ClientError,
    },
}

impl FetchError {
    pub fn client_error(&self) -> &ClientError {
        match self {
            FetchError::Page { source, .. } => source,
        }
    }

    pub fn page(&self) -> u32 {
        match self {
            FetchError::Page { page, .. } => *page,
        }
    }
}

/// Items of the whole collection plus listing facts
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub items: Vec<RawCatalogItem>,
    /// Pages requested
    pub pages: u32,
    /// Item count advertised by the first page
    pub advertised_items: u32,
    /// Entries dropped because an earlier page already returned them
    pub duplicates_dropped: usize,
}

pub struct CollectionFetcher {
    client: Arc<RateLimitedClient>,
    page_size: u32,
}

impl CollectionFetcher {
    pub fn new(client: Arc<RateLimitedClient>, page_size: u32) -> Self {
        Self {
            client,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetch every page of `username`'s collection
    ///
    /// `on_page(completed, total)` is called once per finished page.
    pub async fn fetch_all<F>(&self, username: &str, on_page: F) -> Result<FetchOutcome, FetchError>
    where
        F: Fn(u32, u32) + Send + Sync,
    {
        let first = self.fetch_page(username, 1).await?;
        let total_pages = first.pagination.pages.max(1);
        let advertised_items = first.pagination.items;

        info!(
            username = %username,
            pages = total_pages,
            items = advertised_items,
            "Collection listing started"
        );

        let completed = AtomicU32::new(1);
        on_page(1, total_pages);

        let remaining = (2..=total_pages).map(|page| {
            let completed = &completed;
            let on_page = &on_page;
            async move {
                let result = self.fetch_page(username, page).await?;
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                on_page(done, total_pages);
                Ok::<_, FetchError>(result)
            }
        });
        let rest = try_join_all(remaining).await?;

        let (items, duplicates_dropped) =
            dedupe(std::iter::once(first).chain(rest).flat_map(|page| page.releases));

        if duplicates_dropped > 0 {
            warn!(
                duplicates = duplicates_dropped,
                "Collection changed during listing, dropped repeated entries"
            );
        }
        if items.len() as u64 != u64::from(advertised_items) {
            warn!(
                advertised = advertised_items,
                received = items.len(),
                "Collection item count differs from listing"
            );
        }

        Ok(FetchOutcome {
            items,
            pages: total_pages,
            advertised_items,
            duplicates_dropped,
        })
    }

    async fn fetch_page(&self, username: &str, page: u32) -> Result<CollectionPage, FetchError> {
        let request = ApiRequest::CollectionPage {
            username: username.to_string(),
            page,
            per_page: self.page_size,
        };

        let result: CollectionPage = self
            .client
            .execute_json(&request)
            .await
            .map_err(|source| FetchError::Page { page, source })?;

        debug!(page, items = result.releases.len(), "Fetched collection page");
        Ok(result)
    }
}

/// Keep the first occurrence of each collection entry
fn dedupe(items: impl Iterator<Item = RawCatalogItem>) -> (Vec<RawCatalogItem>, usize) {
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    let mut dropped = 0;

    for item in items {
        if seen.insert(item.record_id()) {
            kept.push(item);
        } else {
            dropped += 1;
        }
    }

    (kept, dropped)
}
