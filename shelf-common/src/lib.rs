//! # Shelf Common Library
//!
//! Shared code for the shelf collection mirror:
//! - Error type shared by the store and configuration layers
//! - Configuration file loading and data folder resolution
//! - Clock abstraction for TTL decisions
//! - Sync progress event types and the event bus

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
