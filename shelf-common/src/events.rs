//! Sync progress events and the event bus
//!
//! [`SyncProgress`] is the payload handed to the progress callback of a
//! sync run. The service also re-broadcasts it on an [`EventBus`] as a
//! [`SyncEvent`] so SSE clients can follow a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Phase of a sync run
///
/// Normal progression: CONNECTING → FETCHING → TRANSFORMING → CACHING → COMPLETE.
/// ERROR is reachable from any phase, CANCELLED only at cancellation
/// checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SyncPhase {
    /// Checking credentials, resolving the collection owner
    Connecting,
    /// Collection pages and enrichment lookups
    Fetching,
    /// Normalization and validation
    Transforming,
    /// Writing the snapshot
    Caching,
    /// Finished successfully
    Complete,
    /// A phase failed
    Error,
    /// Stopped at a cancellation checkpoint
    Cancelled,
}

impl SyncPhase {
    /// Whether no further phase follows
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncPhase::Complete | SyncPhase::Error | SyncPhase::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Connecting => "CONNECTING",
            SyncPhase::Fetching => "FETCHING",
            SyncPhase::Transforming => "TRANSFORMING",
            SyncPhase::Caching => "CACHING",
            SyncPhase::Complete => "COMPLETE",
            SyncPhase::Error => "ERROR",
            SyncPhase::Cancelled => "CANCELLED",
        }
    }
}

/// Progress report delivered at phase transitions and during long phases
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncProgress {
    pub phase: SyncPhase,
    /// 0-100, never decreasing within one run
    pub progress_percent: u8,
    /// Human-readable description of the current step
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records_processed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_records: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<u32>,
}

impl SyncProgress {
    pub fn new(phase: SyncPhase, progress_percent: u8, message: impl Into<String>) -> Self {
        Self {
            phase,
            progress_percent: progress_percent.min(100),
            message: message.into(),
            records_processed: None,
            total_records: None,
            current_page: None,
            total_pages: None,
        }
    }

    pub fn with_records(mut self, processed: usize, total: usize) -> Self {
        self.records_processed = Some(processed);
        self.total_records = Some(total);
        self
    }

    pub fn with_pages(mut self, current: u32, total: u32) -> Self {
        self.current_page = Some(current);
        self.total_pages = Some(total);
        self
    }
}

/// Events broadcast to SSE subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A sync run started contacting the remote service
    SyncStarted {
        session_id: Uuid,
        force_refresh: bool,
        timestamp: DateTime<Utc>,
    },
    /// Progress within a run
    SyncProgressUpdate {
        session_id: Uuid,
        progress: SyncProgress,
        timestamp: DateTime<Utc>,
    },
    /// Run finished; `from_cache` tells whether the records came from the cache
    SyncCompleted {
        session_id: Uuid,
        records: usize,
        from_cache: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    /// Run failed; the result may still carry cached records
    SyncFailed {
        session_id: Uuid,
        errors: Vec<String>,
        from_cache: bool,
        timestamp: DateTime<Utc>,
    },
    /// Run stopped at a cancellation checkpoint
    SyncCancelled {
        session_id: Uuid,
        phase: SyncPhase,
        timestamp: DateTime<Utc>,
    },
    /// The cached collection changed outside a sync (single-record edit,
    /// import, clear)
    CollectionChanged {
        record_count: usize,
        timestamp: DateTime<Utc>,
    },
}

impl SyncEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &str {
        match self {
            SyncEvent::SyncStarted { .. } => "SyncStarted",
            SyncEvent::SyncProgressUpdate { .. } => "SyncProgressUpdate",
            SyncEvent::SyncCompleted { .. } => "SyncCompleted",
            SyncEvent::SyncFailed { .. } => "SyncFailed",
            SyncEvent::SyncCancelled { .. } => "SyncCancelled",
            SyncEvent::CollectionChanged { .. } => "CollectionChanged",
        }
    }
}

/// Broadcast bus for [`SyncEvent`]s
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity
    ///
    /// Slow subscribers lag and lose the oldest events once `capacity`
    /// events are buffered.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_serializes_uppercase() {
        let json = serde_json::to_string(&SyncPhase::Transforming).unwrap();
        assert_eq!(json, "\"TRANSFORMING\"");
        assert_eq!(SyncPhase::Transforming.as_str(), "TRANSFORMING");
    }

    #[test]
    fn test_terminal_phases() {
        assert!(SyncPhase::Complete.is_terminal());
        assert!(SyncPhase::Error.is_terminal());
        assert!(SyncPhase::Cancelled.is_terminal());
        assert!(!SyncPhase::Fetching.is_terminal());
    }

    #[test]
    fn test_progress_percent_is_capped() {
        let progress = SyncProgress::new(SyncPhase::Complete, 250, "done");
        assert_eq!(progress.progress_percent, 100);
    }

    #[test]
    fn test_progress_optional_fields_omitted() {
        let progress = SyncProgress::new(SyncPhase::Fetching, 10, "Fetching page 1");
        let value = serde_json::to_value(&progress).unwrap();
        assert!(value.get("current_page").is_none());

        let paged = progress.with_pages(1, 3);
        let value = serde_json::to_value(&paged).unwrap();
        assert_eq!(value["current_page"], 1);
        assert_eq!(value["total_pages"], 3);
    }

    #[test]
    fn test_event_tagged_with_type() {
        let event = SyncEvent::CollectionChanged {
            record_count: 3,
            timestamp: Utc::now(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "CollectionChanged");
        assert_eq!(event.event_type(), "CollectionChanged");
    }

    #[tokio::test]
    async fn test_event_bus_delivers_to_subscriber() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit_lossy(SyncEvent::SyncCancelled {
            session_id: Uuid::new_v4(),
            phase: SyncPhase::Fetching,
            timestamp: Utc::now(),
        });

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type(), "SyncCancelled");
    }

    #[test]
    fn test_emit_without_subscribers_is_dropped() {
        let bus = EventBus::new(4);
        bus.emit_lossy(SyncEvent::CollectionChanged {
            record_count: 0,
            timestamp: Utc::now(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }
}
