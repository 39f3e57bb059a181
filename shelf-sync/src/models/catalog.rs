//! Remote catalog payloads
//!
//! These structs are the boundary schema for provider responses. Every field
//! the pipeline reads is optional or defaulted, `null` collapses to the
//! default, and fields the pipeline does not use are ignored by serde.

use serde::{Deserialize, Deserializer, Serialize};

/// Treat an explicit JSON `null` like a missing field
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `pagination` block of a collection page
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Pagination {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub pages: u32,
    #[serde(default)]
    pub per_page: u32,
    #[serde(default)]
    pub items: u32,
}

/// One page of the user's collection listing
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CollectionPage {
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default, deserialize_with = "null_as_default")]
    pub releases: Vec<RawCatalogItem>,
}

/// One entry of the user's remote collection
///
/// Carries only the summary (`basic_information`) until the enrichment
/// engine attaches the full release detail.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawCatalogItem {
    /// Release id
    pub id: u64,
    /// Collection instance id; distinguishes two copies of one release
    #[serde(default)]
    pub instance_id: Option<u64>,
    #[serde(default)]
    pub date_added: Option<String>,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub basic_information: BasicInformation,
    /// Full release data, attached by enrichment
    #[serde(skip)]
    pub detail: Option<ReleaseDetail>,
}

impl RawCatalogItem {
    /// Master id referenced by this item, preferring the detail payload
    pub fn master_id(&self) -> Option<u64> {
        self.detail
            .as_ref()
            .and_then(|d| d.master_id)
            .or(self.basic_information.master_id)
            .filter(|id| *id > 0)
    }

    /// Stable record id, 1:1 with this collection entry
    pub fn record_id(&self) -> String {
        match self.instance_id {
            Some(instance) => format!("release-{}-{}", self.id, instance),
            None => format!("release-{}", self.id),
        }
    }
}

/// Summary fields included in each collection listing entry
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct BasicInformation {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub master_id: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub thumb: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub artists: Vec<ArtistCredit>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Vec<LabelCredit>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub genres: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub styles: Vec<String>,
}

/// Artist credit; also used for extra artists (credited roles)
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ArtistCredit {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: String,
    /// Artist name variation as printed on the release
    #[serde(default)]
    pub anv: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LabelCredit {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: String,
    /// Catalog number
    #[serde(default)]
    pub catno: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TrackEntry {
    #[serde(default)]
    pub position: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    /// "track", "heading" or "index"
    #[serde(default, rename = "type_")]
    pub kind: Option<String>,
}

impl TrackEntry {
    /// Playable entry with a non-empty title
    pub fn is_playable(&self) -> bool {
        let is_track = self
            .kind
            .as_deref()
            .map(|k| k.eq_ignore_ascii_case("track"))
            .unwrap_or(true);
        let has_title = self
            .title
            .as_deref()
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false);
        is_track && has_title
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Image {
    /// "primary" or "secondary"
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub uri150: Option<String>,
}

impl Image {
    pub fn is_primary(&self) -> bool {
        self.kind.as_deref() == Some("primary")
    }
}

/// Per-release detail payload
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReleaseDetail {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub master_id: Option<u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub artists: Vec<ArtistCredit>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub labels: Vec<LabelCredit>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tracklist: Vec<TrackEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub genres: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub styles: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Release date as printed by the provider, e.g. "1965-08-00"
    #[serde(default)]
    pub released: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub extraartists: Vec<ArtistCredit>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<Image>,
    #[serde(default)]
    pub uri: Option<String>,
}

/// Shared reference metadata for an original work
///
/// One master backs every pressing/edition of that work in the collection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MasterRecord {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub artists: Vec<ArtistCredit>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub genres: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub styles: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub tracklist: Vec<TrackEntry>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub images: Vec<Image>,
    /// Credited roles (producers, engineers, ...)
    #[serde(default, deserialize_with = "null_as_default")]
    pub extraartists: Vec<ArtistCredit>,
    #[serde(default)]
    pub uri: Option<String>,
}

/// Identity endpoint payload
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Identity {
    #[serde(default)]
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub resource_url: Option<String>,
    #[serde(default)]
    pub consumer_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_page_ignores_unknown_fields() {
        let page: CollectionPage = serde_json::from_value(json!({
            "pagination": {"page": 1, "pages": 2, "per_page": 50, "items": 75, "urls": {}},
            "releases": [{
                "id": 42,
                "instance_id": 7,
                "folder_id": 1,
                "basic_information": {
                    "id": 42,
                    "master_id": 900,
                    "title": "Kind of Blue",
                    "year": 1959,
                    "formats": [{"name": "Vinyl"}],
                    "artists": [{"name": "Miles Davis", "id": 1, "join": ""}],
                    "labels": [{"name": "Columbia", "catno": "CL 1355"}],
                    "genres": ["Jazz"]
                }
            }]
        }))
        .unwrap();

        assert_eq!(page.pagination.pages, 2);
        let item = &page.releases[0];
        assert_eq!(item.record_id(), "release-42-7");
        assert_eq!(item.master_id(), Some(900));
        assert_eq!(item.basic_information.labels[0].catno.as_deref(), Some("CL 1355"));
    }

    #[test]
    fn test_null_collections_become_empty() {
        let detail: ReleaseDetail = serde_json::from_value(json!({
            "id": 5,
            "genres": null,
            "tracklist": null,
            "images": null
        }))
        .unwrap();

        assert!(detail.genres.is_empty());
        assert!(detail.tracklist.is_empty());
        assert!(detail.images.is_empty());
    }

    #[test]
    fn test_master_id_zero_means_none() {
        let item = RawCatalogItem {
            id: 1,
            basic_information: BasicInformation {
                master_id: Some(0),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(item.master_id(), None);
        assert_eq!(item.record_id(), "release-1");
    }

    #[test]
    fn test_detail_master_id_preferred() {
        let item = RawCatalogItem {
            id: 1,
            basic_information: BasicInformation {
                master_id: Some(10),
                ..Default::default()
            },
            detail: Some(ReleaseDetail {
                id: 1,
                master_id: Some(11),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(item.master_id(), Some(11));
    }

    #[test]
    fn test_track_entry_playable() {
        let heading = TrackEntry {
            title: Some("Side A".into()),
            kind: Some("heading".into()),
            ..Default::default()
        };
        let untitled = TrackEntry {
            title: Some("  ".into()),
            kind: Some("track".into()),
            ..Default::default()
        };
        let track = TrackEntry {
            title: Some("So What".into()),
            kind: Some("track".into()),
            ..Default::default()
        };
        assert!(!heading.is_playable());
        assert!(!untitled.is_playable());
        assert!(track.is_playable());
    }
}
