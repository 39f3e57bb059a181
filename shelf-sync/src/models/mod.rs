//! Data models for shelf-sync
//!
//! - catalog: remote payloads (collection entries, release detail, masters)
//! - record: the normalized domain record
//! - session: sync session state machine and results

pub mod catalog;
pub mod record;
pub mod session;

pub use catalog::{
    ArtistCredit, BasicInformation, CollectionPage, Identity, Image, LabelCredit, MasterRecord,
    Pagination, RawCatalogItem, ReleaseDetail, TrackEntry,
};
pub use record::{NormalizedRecord, Provenance, Track, UNKNOWN};
pub use session::{
    IssueSeverity, SyncCounters, SyncIssue, SyncKind, SyncMetrics, SyncResult, SyncSession,
    SyncStatus,
};
