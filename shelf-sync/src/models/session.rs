//! Sync session state and results
//!
//! A [`SyncSession`] is created when a run starts and finalized when it
//! completes, fails or is cancelled. It is owned by the orchestrator; callers
//! receive a copy inside the [`SyncResult`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shelf_common::events::SyncPhase;
use uuid::Uuid;

use crate::models::NormalizedRecord;
use crate::services::{ClientMetrics, EnrichmentStats};

/// Why a run was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncKind {
    /// Cache may satisfy the run when still valid
    Normal,
    /// Cache is bypassed
    ForceRefresh,
}

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Severity of an accumulated issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IssueSeverity {
    /// Degraded data for one item, run continues
    Warning,
    /// Phase failed; the result falls back to the cache
    Critical,
}

/// One accumulated problem of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncIssue {
    /// Machine-readable code, e.g. "DETAIL_FETCH_FAILED"
    pub code: String,
    pub message: String,
    pub severity: IssueSeverity,
}

impl SyncIssue {
    pub fn warning(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            severity: IssueSeverity::Warning,
        }
    }

    pub fn critical(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            severity: IssueSeverity::Critical,
        }
    }
}

impl std::fmt::Display for SyncIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// Record counters of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounters {
    /// Records that passed validation
    pub processed: usize,
    /// Ids not present in the previous snapshot
    pub added: usize,
    /// Ids present before whose content changed
    pub updated: usize,
    /// Ids of the previous snapshot missing from this run
    pub removed: usize,
}

/// One end-to-end run of fetch → enrich → transform → cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSession {
    pub session_id: Uuid,
    pub kind: SyncKind,
    pub status: SyncStatus,
    pub phase: SyncPhase,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub counters: SyncCounters,
    pub errors: Vec<SyncIssue>,
    pub duration_ms: u64,
}

impl SyncSession {
    /// Create a pending session
    pub fn new(kind: SyncKind, started_at: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            kind,
            status: SyncStatus::Pending,
            phase: SyncPhase::Connecting,
            started_at,
            ended_at: None,
            counters: SyncCounters::default(),
            errors: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Mark running and move to a phase
    pub fn enter_phase(&mut self, phase: SyncPhase) {
        self.status = SyncStatus::Running;
        self.phase = phase;
    }

    pub fn add_error(&mut self, issue: SyncIssue) {
        self.errors.push(issue);
    }

    /// Finalize the session
    ///
    /// The phase follows the status: COMPLETE, ERROR or CANCELLED.
    pub fn finish(&mut self, status: SyncStatus, ended_at: DateTime<Utc>, duration_ms: u64) {
        self.status = status;
        self.phase = match status {
            SyncStatus::Completed => SyncPhase::Complete,
            SyncStatus::Cancelled => SyncPhase::Cancelled,
            SyncStatus::Failed => SyncPhase::Error,
            SyncStatus::Pending | SyncStatus::Running => self.phase,
        };
        self.ended_at = Some(ended_at);
        self.duration_ms = duration_ms;
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            SyncStatus::Completed | SyncStatus::Failed | SyncStatus::Cancelled
        )
    }
}

/// Structured metrics of one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncMetrics {
    pub client: ClientMetrics,
    pub enrichment: EnrichmentStats,
    /// Collection pages requested
    pub pages_fetched: u32,
    /// Items returned by the collection listing
    pub items_fetched: usize,
    /// Records dropped by validation
    pub records_rejected: usize,
}

/// Outcome of `sync(force_refresh)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    /// Fresh data was fetched and persisted
    pub success: bool,
    /// `records` came from the local cache
    pub from_cache: bool,
    /// `records` are stored in the local cache
    pub persisted: bool,
    /// The run stopped at a cancellation checkpoint
    pub cancelled: bool,
    /// Phase the run was in when it stopped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancelled_in: Option<SyncPhase>,
    pub records: Vec<NormalizedRecord>,
    pub records_processed: usize,
    pub errors: Vec<SyncIssue>,
    pub duration_ms: u64,
    pub session: SyncSession,
    pub metrics: SyncMetrics,
}

impl SyncResult {
    /// No fresh data and no cached data: the caller has nothing to show
    pub fn is_blocking_failure(&self) -> bool {
        !self.success && !self.cancelled && self.records.is_empty()
    }
}
