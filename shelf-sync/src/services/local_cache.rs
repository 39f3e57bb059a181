//! Local collection cache
//!
//! The cache is two entries of a key/value [`CacheStore`]: the serialized
//! record list and its [`CacheMetadata`]. Both are always written together
//! through one `put_many`, and a read only yields a snapshot when both are
//! present and agree with each other.
//!
//! Freshness is judged against an injected [`Clock`], so tests can move time
//! past the TTL without sleeping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shelf_common::time::{epoch_millis_to_datetime, Clock};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::NormalizedRecord;
use crate::services::record_transformer::RecordTransformer;

/// Store key of the serialized record list
pub const RECORDS_KEY: &str = "collection.records";

/// Store key of the snapshot metadata
pub const METADATA_KEY: &str = "collection.metadata";

/// Layout version of the stored snapshot; other versions read as absent
pub const CACHE_SCHEMA_VERSION: u32 = 1;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Key/value persistence behind the cache
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> shelf_common::Result<Option<String>>;

    /// Write all entries as one atomic unit
    async fn put_many(&self, entries: &[(&str, String)]) -> shelf_common::Result<()>;

    async fn delete_many(&self, keys: &[&str]) -> shelf_common::Result<()>;
}

/// In-process store; counts writes and can be told to fail them
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful `put_many` calls so far
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every following `put_many` fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Overwrite one raw entry, bypassing the cache layer
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.lock().insert(key.to_string(), value.to_string());
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> shelf_common::Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn put_many(&self, entries: &[(&str, String)]) -> shelf_common::Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(shelf_common::Error::Internal(
                "memory store rejected write".to_string(),
            ));
        }
        let mut map = self.lock();
        for (key, value) in entries {
            map.insert(key.to_string(), value.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_many(&self, keys: &[&str]) -> shelf_common::Result<()> {
        let mut map = self.lock();
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}

/// Cache errors
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache store error: {0}")]
    Store(#[from] shelf_common::Error),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No cached collection")]
    NoSnapshot,

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Record already exists: {0}")]
    DuplicateRecord(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Schema version mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: u32, found: u32 },
}

/// Metadata stored next to the record list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    /// Epoch millis of the last sync (or import)
    pub last_updated_ms: i64,
    pub schema_version: u32,
    pub record_count: usize,
    /// How long the producing run took
    #[serde(default)]
    pub write_duration_ms: u64,
    /// Issues of the producing run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl CacheMetadata {
    pub fn last_updated(&self) -> Option<DateTime<Utc>> {
        epoch_millis_to_datetime(self.last_updated_ms)
    }
}

/// Records plus metadata, read as one unit
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSnapshot {
    pub records: Vec<NormalizedRecord>,
    pub metadata: CacheMetadata,
}

/// Cache summary for status displays
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatus {
    pub has_cache: bool,
    pub is_valid: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub record_count: usize,
    pub approximate_size_bytes: usize,
    pub age_ms: Option<i64>,
}

/// Portable copy of the cached collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionExport {
    pub exported_at: DateTime<Utc>,
    pub schema_version: u32,
    pub metadata: CacheMetadata,
    pub records: Vec<NormalizedRecord>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub rejected: usize,
}

pub struct LocalCache {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    transformer: RecordTransformer,
}

impl LocalCache {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            transformer: RecordTransformer::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read the snapshot
    ///
    /// Missing, mismatched or undecodable entries read as `None`; only store
    /// failures are errors.
    pub async fn read(&self) -> Result<Option<CacheSnapshot>, CacheError> {
        Ok(self.read_sized().await?.map(|(snapshot, _)| snapshot))
    }

    /// Snapshot plus its stored size in bytes
    async fn read_sized(&self) -> Result<Option<(CacheSnapshot, usize)>, CacheError> {
        let records_json = self.store.get(RECORDS_KEY).await?;
        let metadata_json = self.store.get(METADATA_KEY).await?;

        let (records_json, metadata_json) = match (records_json, metadata_json) {
            (Some(records), Some(metadata)) => (records, metadata),
            (None, None) => return Ok(None),
            _ => {
                warn!("Cache has records or metadata but not both, ignoring it");
                return Ok(None);
            }
        };

        let metadata: CacheMetadata = match serde_json::from_str(&metadata_json) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(error = %e, "Cache metadata unreadable, ignoring cache");
                return Ok(None);
            }
        };

        if metadata.schema_version != CACHE_SCHEMA_VERSION {
            warn!(
                expected = CACHE_SCHEMA_VERSION,
                found = metadata.schema_version,
                "Cache schema version mismatch, ignoring cache"
            );
            return Ok(None);
        }

        let records: Vec<NormalizedRecord> = match serde_json::from_str(&records_json) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Cached records unreadable, ignoring cache");
                return Ok(None);
            }
        };

        if records.len() != metadata.record_count {
            warn!(
                metadata_count = metadata.record_count,
                actual = records.len(),
                "Cache record count disagrees with metadata, ignoring cache"
            );
            return Ok(None);
        }

        let size = records_json.len() + metadata_json.len();
        Ok(Some((CacheSnapshot { records, metadata }, size)))
    }

    /// Milliseconds since the snapshot was written, never negative
    pub fn age_ms(&self, metadata: &CacheMetadata) -> i64 {
        (self.clock.now_millis() - metadata.last_updated_ms).max(0)
    }

    /// Whether a snapshot with this metadata is still within the TTL
    pub fn is_fresh(&self, metadata: &CacheMetadata) -> bool {
        (self.age_ms(metadata) as u128) < self.ttl.as_millis()
    }

    pub async fn is_valid(&self) -> Result<bool, CacheError> {
        Ok(self
            .read()
            .await?
            .map(|snapshot| self.is_fresh(&snapshot.metadata))
            .unwrap_or(false))
    }

    /// Replace the snapshot with freshly synced records
    pub async fn write(
        &self,
        records: &[NormalizedRecord],
        duration_ms: u64,
        errors: Vec<String>,
    ) -> Result<CacheMetadata, CacheError> {
        let metadata = CacheMetadata {
            last_updated_ms: self.clock.now_millis(),
            schema_version: CACHE_SCHEMA_VERSION,
            record_count: records.len(),
            write_duration_ms: duration_ms,
            errors,
        };
        self.persist(records, &metadata).await?;

        info!(records = records.len(), "Collection cached");
        Ok(metadata)
    }

    pub async fn clear(&self) -> Result<(), CacheError> {
        self.store.delete_many(&[RECORDS_KEY, METADATA_KEY]).await?;
        info!("Collection cache cleared");
        Ok(())
    }

    pub async fn status(&self) -> Result<CacheStatus, CacheError> {
        let status = match self.read_sized().await? {
            Some((snapshot, size)) => CacheStatus {
                has_cache: true,
                is_valid: self.is_fresh(&snapshot.metadata),
                last_sync: snapshot.metadata.last_updated(),
                record_count: snapshot.metadata.record_count,
                approximate_size_bytes: size,
                age_ms: Some(self.age_ms(&snapshot.metadata)),
            },
            None => CacheStatus {
                has_cache: false,
                is_valid: false,
                last_sync: None,
                record_count: 0,
                approximate_size_bytes: 0,
                age_ms: None,
            },
        };
        Ok(status)
    }

    /// Replace one cached record; the id must not change
    pub async fn update_one(
        &self,
        id: &str,
        record: NormalizedRecord,
    ) -> Result<CacheMetadata, CacheError> {
        if record.id != id {
            return Err(CacheError::InvalidRecord(format!(
                "record id {} does not match {}",
                record.id, id
            )));
        }
        self.check_record(&record)?;

        let mut snapshot = self.read().await?.ok_or(CacheError::NoSnapshot)?;
        let slot = snapshot
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| CacheError::RecordNotFound(id.to_string()))?;
        *slot = record;

        self.rewrite(snapshot).await
    }

    pub async fn add_one(&self, record: NormalizedRecord) -> Result<CacheMetadata, CacheError> {
        self.check_record(&record)?;

        let mut snapshot = self.read().await?.ok_or(CacheError::NoSnapshot)?;
        if snapshot.records.iter().any(|r| r.id == record.id) {
            return Err(CacheError::DuplicateRecord(record.id));
        }
        snapshot.records.push(record);

        self.rewrite(snapshot).await
    }

    pub async fn remove_one(&self, id: &str) -> Result<CacheMetadata, CacheError> {
        let mut snapshot = self.read().await?.ok_or(CacheError::NoSnapshot)?;
        let before = snapshot.records.len();
        snapshot.records.retain(|r| r.id != id);
        if snapshot.records.len() == before {
            return Err(CacheError::RecordNotFound(id.to_string()));
        }

        self.rewrite(snapshot).await
    }

    pub async fn export(&self) -> Result<CollectionExport, CacheError> {
        let snapshot = self.read().await?.ok_or(CacheError::NoSnapshot)?;
        Ok(CollectionExport {
            exported_at: self.clock.now(),
            schema_version: CACHE_SCHEMA_VERSION,
            metadata: snapshot.metadata,
            records: snapshot.records,
        })
    }

    /// Replace the cache with an exported collection
    ///
    /// Invalid and repeated records are dropped and counted.
    pub async fn import(&self, export: CollectionExport) -> Result<ImportSummary, CacheError> {
        if export.schema_version != CACHE_SCHEMA_VERSION {
            return Err(CacheError::SchemaMismatch {
                expected: CACHE_SCHEMA_VERSION,
                found: export.schema_version,
            });
        }

        let mut seen = HashSet::new();
        let mut rejected = 0;
        let records: Vec<NormalizedRecord> = export
            .records
            .into_iter()
            .filter(|record| {
                let keep =
                    self.transformer.validate(record).is_ok() && seen.insert(record.id.clone());
                if !keep {
                    debug!(record_id = %record.id, "Skipping imported record");
                    rejected += 1;
                }
                keep
            })
            .collect();

        self.write(&records, export.metadata.write_duration_ms, Vec::new())
            .await?;

        info!(imported = records.len(), rejected, "Collection imported");
        Ok(ImportSummary {
            imported: records.len(),
            rejected,
        })
    }

    fn check_record(&self, record: &NormalizedRecord) -> Result<(), CacheError> {
        self.transformer
            .validate(record)
            .map_err(|e| CacheError::InvalidRecord(e.to_string()))
    }

    /// Persist edited records, keeping the sync timestamp
    async fn rewrite(&self, snapshot: CacheSnapshot) -> Result<CacheMetadata, CacheError> {
        let metadata = CacheMetadata {
            record_count: snapshot.records.len(),
            ..snapshot.metadata
        };
        self.persist(&snapshot.records, &metadata).await?;
        Ok(metadata)
    }

    async fn persist(
        &self,
        records: &[NormalizedRecord],
        metadata: &CacheMetadata,
    ) -> Result<(), CacheError> {
        let records_json = serde_json::to_string(records)?;
        let metadata_json = serde_json::to_string(metadata)?;
        self.store
            .put_many(&[(RECORDS_KEY, records_json), (METADATA_KEY, metadata_json)])
            .await?;
        Ok(())
    }
}
