//! Synchronization pipeline services
//!
//! Leaf-first: transport → rate-limited client → collection fetcher →
//! enrichment engine → record transformer → local cache → orchestrator.

pub mod collection_fetcher;
pub mod enrichment_engine;
pub mod local_cache;
pub mod rate_limited_client;
pub mod record_transformer;
pub mod sync_orchestrator;
pub mod transport;

pub use collection_fetcher::{CollectionFetcher, FetchError, FetchOutcome};
pub use enrichment_engine::{EnrichedItem, EnrichmentEngine, EnrichmentOutcome, EnrichmentStats};
pub use local_cache::{
    CacheError, CacheMetadata, CacheSnapshot, CacheStatus, CacheStore, CollectionExport,
    ImportSummary, LocalCache, MemoryCacheStore, CACHE_SCHEMA_VERSION, DEFAULT_CACHE_TTL,
    METADATA_KEY, RECORDS_KEY,
};
pub use rate_limited_client::{ClientMetrics, RateLimitConfig, RateLimitedClient};
pub use record_transformer::{RecordTransformer, TransformOutcome, ValidationError};
pub use sync_orchestrator::{ConnectionInfo, SyncError, SyncOptions, SyncOrchestrator};
pub use transport::{
    ApiRequest, CatalogTransport, ClientError, HttpTransport, RateLimitUsage, RawResponse,
};
