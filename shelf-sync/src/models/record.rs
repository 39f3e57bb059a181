//! Normalized collection record
//!
//! The stable domain entity handed to the rest of the application and
//! stored in the local cache.

use serde::{Deserialize, Serialize};

/// Sentinel for unresolvable year and genre values
pub const UNKNOWN: &str = "Unknown";

/// One track of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    /// Side/position label, e.g. "A1"
    pub position: String,
    pub title: String,
    /// "m:ss", empty when unknown
    #[serde(default)]
    pub duration: String,
}

/// Links back to the source item and master
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub release_id: u64,
    #[serde(default)]
    pub master_id: Option<u64>,
    #[serde(default)]
    pub release_url: Option<String>,
    #[serde(default)]
    pub master_url: Option<String>,
}

/// Normalized collection record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    /// Stable id derived from the collection entry (`release-{id}[-{instance}]`)
    pub id: String,
    pub title: String,
    pub artist: String,
    /// Four-digit year, or "Unknown"
    pub year: String,
    pub label: String,
    #[serde(default)]
    pub catalog_number: String,
    pub cover_url: String,
    pub tracks: Vec<Track>,
    pub genres: Vec<String>,
    #[serde(default)]
    pub styles: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub producer: String,
    #[serde(default)]
    pub recording_date: String,
    #[serde(default)]
    pub date_added: Option<String>,
    #[serde(default)]
    pub rating: Option<u8>,
    pub source: Provenance,
}
