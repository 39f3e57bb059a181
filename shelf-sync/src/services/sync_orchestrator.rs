//! Sync orchestrator
//!
//! **Phases:** CONNECTING → FETCHING → TRANSFORMING → CACHING → COMPLETE
//! (ERROR / CANCELLED on the way out)
//!
//! - At most one run at a time; a second `sync` call is rejected, not queued.
//! - A valid cache satisfies a normal run without any remote request.
//! - Any phase failure falls back to the last cached snapshot, stale or not.
//! - Cancellation is checked before fetching, after the collection listing
//!   and after enrichment. In-flight requests are never aborted.
//! - Progress percentages never decrease within a run.

use serde::{Deserialize, Serialize};
use shelf_common::events::{EventBus, SyncEvent, SyncPhase, SyncProgress};
use shelf_common::time::Clock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{
    Identity, NormalizedRecord, SyncCounters, SyncIssue, SyncKind, SyncMetrics, SyncResult,
    SyncSession, SyncStatus,
};
use crate::services::collection_fetcher::CollectionFetcher;
use crate::services::enrichment_engine::EnrichmentEngine;
use crate::services::local_cache::{
    CacheError, CacheMetadata, CacheSnapshot, CacheStatus, CollectionExport, ImportSummary,
    LocalCache,
};
use crate::services::rate_limited_client::{ClientMetrics, RateLimitedClient};
use crate::services::record_transformer::RecordTransformer;
use crate::services::transport::{ApiRequest, ClientError, RateLimitUsage};

/// Errors of the orchestrator's public operations
///
/// Remote and phase failures during `sync` are not errors: they are reported
/// inside the [`SyncResult`].
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("A sync is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Pipeline tuning handed to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOptions {
    /// Collection owner; resolved through the identity endpoint when `None`
    pub username: Option<String>,
    pub page_size: u32,
    pub enrichment_batch_size: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            username: None,
            page_size: 100,
            enrichment_batch_size: 10,
        }
    }
}

/// Result of `test_connection`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub username: String,
    pub user_id: u64,
    pub rate_limit: Option<RateLimitUsage>,
}

// Progress bands (percent)
const CONNECTING_END: u8 = 5;
const FETCH_PAGES_END: u8 = 30;
const ENRICH_END: u8 = 60;
const TRANSFORM_END: u8 = 85;
const CACHING_END: u8 = 99;

/// Map `done/total` into the `[start, end]` band
fn band(start: u8, end: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return end;
    }
    let span = usize::from(end - start);
    start + (span * done.min(total) / total) as u8
}

/// Forwards progress to the caller and the event bus, never going backwards
struct ProgressReporter<'a, P> {
    callback: &'a P,
    events: &'a EventBus,
    clock: &'a dyn Clock,
    session_id: Uuid,
    last_percent: AtomicU8,
}

impl<'a, P> ProgressReporter<'a, P>
where
    P: Fn(&SyncProgress) + Send + Sync,
{
    fn report(&self, mut progress: SyncProgress) {
        let previous = self
            .last_percent
            .fetch_max(progress.progress_percent, Ordering::SeqCst);
        progress.progress_percent = progress.progress_percent.max(previous);

        (self.callback)(&progress);
        self.events.emit_lossy(SyncEvent::SyncProgressUpdate {
            session_id: self.session_id,
            progress,
            timestamp: self.clock.now(),
        });
    }

    fn phase(&self, phase: SyncPhase, percent: u8, message: impl Into<String>) {
        self.report(SyncProgress::new(phase, percent, message));
    }

    fn current_percent(&self) -> u8 {
        self.last_percent.load(Ordering::SeqCst)
    }
}

/// Bookkeeping of one run
struct RunState<'a, P> {
    session: SyncSession,
    metrics: SyncMetrics,
    reporter: ProgressReporter<'a, P>,
    started: Instant,
    client_before: ClientMetrics,
    previous: Option<CacheSnapshot>,
}

impl<P> RunState<'_, P> {
    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Releases the single-flight flag and the cancel handle when a run ends
struct RunGuard<'a> {
    orchestrator: &'a SyncOrchestrator,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *lock(&self.orchestrator.current_cancel) = None;
        self.orchestrator.in_flight.store(false, Ordering::Release);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Coordinates fetch → enrich → transform → cache
pub struct SyncOrchestrator {
    client: Arc<RateLimitedClient>,
    fetcher: CollectionFetcher,
    enricher: EnrichmentEngine,
    transformer: RecordTransformer,
    cache: Arc<LocalCache>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    username: Option<String>,
    in_flight: AtomicBool,
    current_cancel: Mutex<Option<CancellationToken>>,
    last_session: Mutex<Option<SyncSession>>,
}

impl SyncOrchestrator {
    pub fn new(
        client: Arc<RateLimitedClient>,
        cache: Arc<LocalCache>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
        options: SyncOptions,
    ) -> Self {
        Self {
            fetcher: CollectionFetcher::new(Arc::clone(&client), options.page_size),
            enricher: EnrichmentEngine::new(Arc::clone(&client), options.enrichment_batch_size),
            transformer: RecordTransformer::new(),
            client,
            cache,
            clock,
            event_bus,
            username: options.username.filter(|u| !u.trim().is_empty()),
            in_flight: AtomicBool::new(false),
            current_cancel: Mutex::new(None),
            last_session: Mutex::new(None),
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Session of the most recent finished run
    pub fn last_session(&self) -> Option<SyncSession> {
        lock(&self.last_session).clone()
    }

    /// Client counters accumulated since startup
    pub fn client_metrics(&self) -> ClientMetrics {
        self.client.metrics()
    }

    /// Synchronize the collection
    ///
    /// # Errors
    /// Only [`SyncError::AlreadyRunning`]; every other failure is reported in
    /// the returned [`SyncResult`].
    pub async fn sync(&self, force_refresh: bool) -> Result<SyncResult, SyncError> {
        self.sync_with_progress(force_refresh, |_| {}).await
    }

    /// [`sync`](Self::sync) with a progress callback
    pub async fn sync_with_progress<P>(
        &self,
        force_refresh: bool,
        on_progress: P,
    ) -> Result<SyncResult, SyncError>
    where
        P: Fn(&SyncProgress) + Send + Sync,
    {
        let token = CancellationToken::new();
        {
            // Flag and token change together so a cancel never sees one without the other
            let mut current = lock(&self.current_cancel);
            if self
                .in_flight
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                warn!("Sync requested while another sync is running");
                return Err(SyncError::AlreadyRunning);
            }
            *current = Some(token.clone());
        }
        let _guard = RunGuard { orchestrator: self };

        let kind = if force_refresh {
            SyncKind::ForceRefresh
        } else {
            SyncKind::Normal
        };
        let session = SyncSession::new(kind, self.clock.now());
        let session_id = session.session_id;

        info!(session_id = %session_id, force_refresh, "Sync started");
        self.event_bus.emit_lossy(SyncEvent::SyncStarted {
            session_id,
            force_refresh,
            timestamp: self.clock.now(),
        });

        let state = RunState {
            session,
            metrics: SyncMetrics::default(),
            reporter: ProgressReporter {
                callback: &on_progress,
                events: &self.event_bus,
                clock: self.clock.as_ref(),
                session_id,
                last_percent: AtomicU8::new(0),
            },
            started: Instant::now(),
            client_before: self.client.metrics(),
            previous: None,
        };

        let result = self.run(state, force_refresh, &token).await;

        self.announce(&result);
        *lock(&self.last_session) = Some(result.session.clone());
        Ok(result)
    }

    /// Cancel the running sync, if any
    ///
    /// Returns whether a run was signalled. The run stops at its next
    /// checkpoint.
    pub fn cancel_current_sync(&self) -> bool {
        match lock(&self.current_cancel).as_ref() {
            Some(token) => {
                info!("Cancelling current sync");
                token.cancel();
                true
            }
            None => false,
        }
    }

    async fn run<P>(
        &self,
        mut state: RunState<'_, P>,
        force_refresh: bool,
        token: &CancellationToken,
    ) -> SyncResult
    where
        P: Fn(&SyncProgress) + Send + Sync,
    {
        state.previous = match self.cache.read().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Could not read cached collection");
                state
                    .session
                    .add_error(SyncIssue::warning("CACHE_READ_FAILED", e.to_string()));
                None
            }
        };

        if !force_refresh {
            if let Some(snapshot) = state.previous.take() {
                if self.cache.is_fresh(&snapshot.metadata) {
                    return self.finish_from_cache(state, snapshot);
                }
                state.previous = Some(snapshot);
            }
        }

        // CONNECTING
        state.session.enter_phase(SyncPhase::Connecting);
        state
            .reporter
            .phase(SyncPhase::Connecting, 0, "Connecting to catalog service");
        let username = match self.resolve_username().await {
            Ok(username) => username,
            Err(e) => {
                let code = if e.is_auth() { "AUTH_FAILED" } else { "CONNECTION_FAILED" };
                return self.fail(state, SyncIssue::critical(code, e.to_string()));
            }
        };
        state.reporter.phase(
            SyncPhase::Connecting,
            CONNECTING_END,
            format!("Connected as {}", username),
        );

        if token.is_cancelled() {
            return self.cancel(state);
        }

        // FETCHING: collection listing
        state.session.enter_phase(SyncPhase::Fetching);
        info!(session_id = %state.session.session_id, username = %username, "Fetching collection");
        let reporter = &state.reporter;
        let fetched = self
            .fetcher
            .fetch_all(&username, |done, total| {
                reporter.report(
                    SyncProgress::new(
                        SyncPhase::Fetching,
                        band(CONNECTING_END, FETCH_PAGES_END, done as usize, total as usize),
                        format!("Fetched page {} of {}", done, total),
                    )
                    .with_pages(done, total),
                );
            })
            .await;
        let fetched = match fetched {
            Ok(fetched) => fetched,
            Err(e) => {
                error!(page = e.page(), error = %e, "Collection fetch failed");
                let code = if e.client_error().is_auth() { "AUTH_FAILED" } else { "FETCH_FAILED" };
                return self.fail(state, SyncIssue::critical(code, e.to_string()));
            }
        };
        state.metrics.pages_fetched = fetched.pages;
        state.metrics.items_fetched = fetched.items.len();

        if token.is_cancelled() {
            return self.cancel(state);
        }

        // FETCHING: enrichment
        let total_items = fetched.items.len();
        let reporter = &state.reporter;
        let enriched = self
            .enricher
            .enrich(fetched.items, |done, total| {
                reporter.report(
                    SyncProgress::new(
                        SyncPhase::Fetching,
                        band(FETCH_PAGES_END, ENRICH_END, done, total),
                        format!("Enriched {} of {} records", done, total),
                    )
                    .with_records(done, total),
                );
            })
            .await;
        state.metrics.enrichment = enriched.stats;
        for issue in enriched.issues {
            state.session.add_error(issue);
        }

        if token.is_cancelled() {
            return self.cancel(state);
        }

        // TRANSFORMING
        state.session.enter_phase(SyncPhase::Transforming);
        state.reporter.phase(
            SyncPhase::Transforming,
            ENRICH_END,
            format!("Normalizing {} records", total_items),
        );
        let reporter = &state.reporter;
        let transformed = self.transformer.transform_all(&enriched.items, |done, total| {
            reporter.report(
                SyncProgress::new(
                    SyncPhase::Transforming,
                    band(ENRICH_END, TRANSFORM_END, done, total),
                    format!("Normalized {} of {} records", done, total),
                )
                .with_records(done, total),
            );
        });
        state.metrics.records_rejected = transformed.rejected.len();
        if !transformed.rejected.is_empty() {
            state.session.add_error(SyncIssue::warning(
                "RECORDS_REJECTED",
                format!(
                    "{} records failed validation and were dropped",
                    transformed.rejected.len()
                ),
            ));
        }

        let records = transformed.records;
        state.session.counters = diff_counters(state.previous.as_ref(), &records);

        // CACHING
        state.session.enter_phase(SyncPhase::Caching);
        state.reporter.phase(
            SyncPhase::Caching,
            TRANSFORM_END,
            format!("Saving {} records", records.len()),
        );
        let issue_texts: Vec<String> = state.session.errors.iter().map(|e| e.to_string()).collect();
        match self
            .cache
            .write(&records, state.elapsed_ms(), issue_texts)
            .await
        {
            Ok(_) => {
                state
                    .reporter
                    .phase(SyncPhase::Caching, CACHING_END, "Collection saved");
                state.reporter.phase(
                    SyncPhase::Complete,
                    100,
                    format!("Synced {} records", records.len()),
                );
                self.finish(state, SyncStatus::Completed, records, false, true)
            }
            Err(e) => {
                error!(error = %e, "Failed to cache synced collection");
                state
                    .session
                    .add_error(SyncIssue::critical("CACHE_WRITE_FAILED", e.to_string()));
                let percent = state.reporter.current_percent();
                state.reporter.phase(
                    SyncPhase::Error,
                    percent,
                    "Synced collection could not be saved",
                );
                self.finish(state, SyncStatus::Failed, records, false, false)
            }
        }
    }

    async fn resolve_username(&self) -> Result<String, ClientError> {
        if let Some(username) = &self.username {
            return Ok(username.clone());
        }
        let identity: Identity = self.client.execute_json(&ApiRequest::Identity).await?;
        info!(username = %identity.username, "Resolved collection owner");
        Ok(identity.username)
    }

    fn finish_from_cache<P>(&self, mut state: RunState<'_, P>, snapshot: CacheSnapshot) -> SyncResult
    where
        P: Fn(&SyncProgress) + Send + Sync,
    {
        info!(
            records = snapshot.records.len(),
            age_ms = self.cache.age_ms(&snapshot.metadata),
            "Cache is valid, skipping remote sync"
        );
        state.session.counters.processed = snapshot.records.len();
        state.reporter.phase(
            SyncPhase::Complete,
            100,
            format!("Loaded {} records from cache", snapshot.records.len()),
        );
        self.finish(state, SyncStatus::Completed, snapshot.records, true, true)
    }

    /// Phase failure: fall back to the cached snapshot, stale or not
    fn fail<P>(&self, mut state: RunState<'_, P>, issue: SyncIssue) -> SyncResult
    where
        P: Fn(&SyncProgress) + Send + Sync,
    {
        error!(session_id = %state.session.session_id, issue = %issue, "Sync failed");
        let message = issue.message.clone();
        state.session.add_error(issue);
        let percent = state.reporter.current_percent();
        state.reporter.phase(SyncPhase::Error, percent, message);

        match state.previous.take() {
            Some(snapshot) => {
                warn!(
                    records = snapshot.records.len(),
                    "Returning cached collection after failed sync"
                );
                self.finish(state, SyncStatus::Failed, snapshot.records, true, true)
            }
            None => self.finish(state, SyncStatus::Failed, Vec::new(), false, false),
        }
    }

    fn cancel<P>(&self, state: RunState<'_, P>) -> SyncResult
    where
        P: Fn(&SyncProgress) + Send + Sync,
    {
        let phase = state.session.phase;
        info!(
            session_id = %state.session.session_id,
            phase = phase.as_str(),
            "Sync cancelled"
        );
        let percent = state.reporter.current_percent();
        state
            .reporter
            .phase(SyncPhase::Cancelled, percent, "Sync cancelled");
        let mut result = self.finish(state, SyncStatus::Cancelled, Vec::new(), false, false);
        result.cancelled_in = Some(phase);
        result
    }

    fn finish<P>(
        &self,
        mut state: RunState<'_, P>,
        status: SyncStatus,
        records: Vec<NormalizedRecord>,
        from_cache: bool,
        persisted: bool,
    ) -> SyncResult {
        let duration_ms = state.elapsed_ms();
        state.session.finish(status, self.clock.now(), duration_ms);
        state.metrics.client = self.client.metrics().since(&state.client_before);

        info!(
            session_id = %state.session.session_id,
            status = ?status,
            records = records.len(),
            from_cache,
            duration_ms,
            requests = state.metrics.client.requests_sent,
            "Sync finished"
        );

        SyncResult {
            success: status == SyncStatus::Completed,
            from_cache,
            persisted,
            cancelled: status == SyncStatus::Cancelled,
            cancelled_in: None,
            records_processed: state.session.counters.processed,
            records,
            errors: state.session.errors.clone(),
            duration_ms,
            session: state.session,
            metrics: state.metrics,
        }
    }

    fn announce(&self, result: &SyncResult) {
        let session_id = result.session.session_id;
        let timestamp = self.clock.now();
        let event = if result.cancelled {
            SyncEvent::SyncCancelled {
                session_id,
                phase: result.cancelled_in.unwrap_or(result.session.phase),
                timestamp,
            }
        } else if result.success {
            SyncEvent::SyncCompleted {
                session_id,
                records: result.records.len(),
                from_cache: result.from_cache,
                duration_ms: result.duration_ms,
                timestamp,
            }
        } else {
            SyncEvent::SyncFailed {
                session_id,
                errors: result.errors.iter().map(|e| e.to_string()).collect(),
                from_cache: result.from_cache,
                timestamp,
            }
        };
        self.event_bus.emit_lossy(event);
    }

    pub async fn cache_status(&self) -> Result<CacheStatus, SyncError> {
        Ok(self.cache.status().await?)
    }

    pub async fn clear_cache(&self) -> Result<(), SyncError> {
        self.cache.clear().await?;
        self.collection_changed(0);
        Ok(())
    }

    pub async fn update_record(
        &self,
        id: &str,
        record: NormalizedRecord,
    ) -> Result<CacheMetadata, SyncError> {
        let metadata = self.cache.update_one(id, record).await?;
        self.collection_changed(metadata.record_count);
        Ok(metadata)
    }

    pub async fn add_record(&self, record: NormalizedRecord) -> Result<CacheMetadata, SyncError> {
        let metadata = self.cache.add_one(record).await?;
        self.collection_changed(metadata.record_count);
        Ok(metadata)
    }

    pub async fn remove_record(&self, id: &str) -> Result<CacheMetadata, SyncError> {
        let metadata = self.cache.remove_one(id).await?;
        self.collection_changed(metadata.record_count);
        Ok(metadata)
    }

    pub async fn export_collection(&self) -> Result<CollectionExport, SyncError> {
        Ok(self.cache.export().await?)
    }

    pub async fn import_collection(
        &self,
        export: CollectionExport,
    ) -> Result<ImportSummary, SyncError> {
        let summary = self.cache.import(export).await?;
        self.collection_changed(summary.imported);
        Ok(summary)
    }

    /// Check the token against the identity endpoint
    pub async fn test_connection(&self) -> Result<ConnectionInfo, SyncError> {
        let identity: Identity = self.client.execute_json(&ApiRequest::Identity).await?;
        Ok(ConnectionInfo {
            username: identity.username,
            user_id: identity.id,
            rate_limit: self.client.last_rate_limit(),
        })
    }

    fn collection_changed(&self, record_count: usize) {
        self.event_bus.emit_lossy(SyncEvent::CollectionChanged {
            record_count,
            timestamp: self.clock.now(),
        });
    }
}

/// Added/updated/removed relative to the previous snapshot
fn diff_counters(previous: Option<&CacheSnapshot>, fresh: &[NormalizedRecord]) -> SyncCounters {
    let before: HashMap<&str, &NormalizedRecord> = previous
        .map(|s| s.records.iter().map(|r| (r.id.as_str(), r)).collect())
        .unwrap_or_default();

    let mut counters = SyncCounters {
        processed: fresh.len(),
        ..Default::default()
    };
    for record in fresh {
        match before.get(record.id.as_str()) {
            None => counters.added += 1,
            Some(old) if !same_content(old, record) => counters.updated += 1,
            Some(_) => {}
        }
    }
    let fresh_ids: std::collections::HashSet<&str> = fresh.iter().map(|r| r.id.as_str()).collect();
    counters.removed = before.keys().filter(|id| !fresh_ids.contains(*id)).count();
    counters
}

/// Content equality ignoring generated placeholder durations
fn same_content(a: &NormalizedRecord, b: &NormalizedRecord) -> bool {
    let tracks_match = a.tracks.len() == b.tracks.len()
        && a
            .tracks
            .iter()
            .zip(&b.tracks)
            .all(|(x, y)| x.position == y.position && x.title == y.title);
    tracks_match
        && NormalizedRecord {
            tracks: Vec::new(),
            ..a.clone()
        } == NormalizedRecord {
            tracks: Vec::new(),
            ..b.clone()
        }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Provenance, Track};
    use shelf_common::time::ManualClock;

    fn record(id: &str, title: &str) -> NormalizedRecord {
        NormalizedRecord {
            id: id.to_string(),
            title: title.to_string(),
            artist: "Artist".into(),
            year: "2001".into(),
            label: "Label".into(),
            catalog_number: String::new(),
            cover_url: "https://img.example.test/c.jpg".into(),
            tracks: vec![Track {
                position: "A1".into(),
                title: "Track 1".into(),
                duration: "3:10".into(),
            }],
            genres: vec!["Rock".into()],
            styles: vec![],
            description: String::new(),
            producer: String::new(),
            recording_date: String::new(),
            date_added: None,
            rating: None,
            source: Provenance::default(),
        }
    }

    #[test]
    fn test_band() {
        assert_eq!(band(5, 30, 0, 4), 5);
        assert_eq!(band(5, 30, 2, 4), 17);
        assert_eq!(band(5, 30, 4, 4), 30);
        assert_eq!(band(30, 60, 0, 0), 60);
        assert_eq!(band(30, 60, 9, 3), 60);
    }

    #[test]
    fn test_reporter_never_goes_backwards() {
        let seen = Mutex::new(Vec::new());
        let callback = |p: &SyncProgress| seen.lock().unwrap().push(p.progress_percent);
        let bus = EventBus::new(16);
        let clock = ManualClock::new(0);
        let reporter = ProgressReporter {
            callback: &callback,
            events: &bus,
            clock: &clock,
            session_id: Uuid::new_v4(),
            last_percent: AtomicU8::new(0),
        };

        reporter.phase(SyncPhase::Fetching, 20, "a");
        reporter.phase(SyncPhase::Fetching, 10, "b");
        reporter.phase(SyncPhase::Transforming, 60, "c");

        assert_eq!(*seen.lock().unwrap(), vec![20, 20, 60]);
    }

    #[test]
    fn test_diff_counters() {
        let previous = CacheSnapshot {
            records: vec![record("a", "A"), record("b", "B"), record("c", "C")],
            metadata: CacheMetadata {
                last_updated_ms: 0,
                schema_version: 1,
                record_count: 3,
                write_duration_ms: 0,
                errors: vec![],
            },
        };
        let mut same_but_new_duration = record("a", "A");
        same_but_new_duration.tracks[0].duration = "4:00".into();
        let fresh = vec![same_but_new_duration, record("b", "B2"), record("d", "D")];

        let counters = diff_counters(Some(&previous), &fresh);

        assert_eq!(
            counters,
            SyncCounters {
                processed: 3,
                added: 1,
                updated: 1,
                removed: 1
            }
        );
    }

    #[test]
    fn test_diff_counters_without_previous() {
        let counters = diff_counters(None, &[record("a", "A")]);
        assert_eq!(counters.added, 1);
        assert_eq!(counters.removed, 0);
    }
}
