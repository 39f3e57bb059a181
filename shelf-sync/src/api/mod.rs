//! HTTP API handlers for shelf-sync
//!
//! JSON over HTTP plus an SSE stream for sync progress.

pub mod collection;
pub mod health;
pub mod sse;
pub mod sync;

pub use collection::collection_routes;
pub use health::health_routes;
pub use sse::sync_event_stream;
pub use sync::sync_routes;
