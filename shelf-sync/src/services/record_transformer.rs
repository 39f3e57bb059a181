//! Normalization of enriched catalog items into [`NormalizedRecord`]s
//!
//! **Field resolution:**
//! - year: master year, then item year, then "Unknown"
//! - genres: master genres, then item genres, then ["Unknown"]
//! - title: detail, then summary, then master
//! - cover: summary cover, detail primary image, any detail image, master
//!   primary image, summary thumb
//! - tracks: detail tracklist, then master tracklist, then placeholders
//!
//! Normalization never fails; [`RecordTransformer::validate`] decides which
//! records are usable.

use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{
    ArtistCredit, Image, MasterRecord, NormalizedRecord, Provenance, RawCatalogItem, Track,
    TrackEntry, UNKNOWN,
};
use crate::services::enrichment_engine::EnrichedItem;
use crate::utils::text::{
    clean_artist_name, clean_text, format_duration, DESCRIPTION_MAX_CHARS, TITLE_MAX_CHARS,
};

/// Record rejected by validation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Record {record_id} is missing required fields: {}", .missing.join(", "))]
pub struct ValidationError {
    pub record_id: String,
    pub missing: Vec<&'static str>,
}

/// Validated records plus the rejects
#[derive(Debug, Default)]
pub struct TransformOutcome {
    pub records: Vec<NormalizedRecord>,
    pub rejected: Vec<ValidationError>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RecordTransformer;

impl RecordTransformer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize, validate and filter a batch of enriched items
    ///
    /// `on_progress(done, total)` is called after each item.
    pub fn transform_all<F>(&self, items: &[EnrichedItem], on_progress: F) -> TransformOutcome
    where
        F: Fn(usize, usize),
    {
        let total = items.len();
        let mut outcome = TransformOutcome::default();

        for (index, enriched) in items.iter().enumerate() {
            let record = self.normalize(&enriched.item, enriched.master.as_ref());
            match self.validate(&record) {
                Ok(()) => outcome.records.push(record),
                Err(e) => {
                    warn!(record_id = %e.record_id, missing = ?e.missing, "Dropping invalid record");
                    outcome.rejected.push(e);
                }
            }
            on_progress(index + 1, total);
        }

        info!(
            records = outcome.records.len(),
            rejected = outcome.rejected.len(),
            "Transformation complete"
        );
        outcome
    }

    /// Map one catalog item (and its master) to a domain record
    pub fn normalize(&self, item: &RawCatalogItem, master: Option<&MasterRecord>) -> NormalizedRecord {
        let summary = &item.basic_information;
        let detail = item.detail.as_ref();

        let item_year = detail
            .and_then(|d| d.year)
            .filter(|y| *y > 0)
            .or(summary.year);
        let item_genres = match detail {
            Some(d) if !clean_list(&d.genres).is_empty() => d.genres.as_slice(),
            _ => summary.genres.as_slice(),
        };
        let item_styles = match detail {
            Some(d) if !clean_list(&d.styles).is_empty() => d.styles.as_slice(),
            _ => summary.styles.as_slice(),
        };

        let title = first_non_empty([
            detail.and_then(|d| d.title.as_deref()),
            summary.title.as_deref(),
            master.and_then(|m| m.title.as_deref()),
        ]);

        let artist = [
            summary.artists.as_slice(),
            detail.map(|d| d.artists.as_slice()).unwrap_or_default(),
            master.map(|m| m.artists.as_slice()).unwrap_or_default(),
        ]
        .into_iter()
        .map(join_artists)
        .find(|joined| !joined.is_empty())
        .unwrap_or_default();

        let label = detail
            .and_then(|d| d.labels.first())
            .or_else(|| summary.labels.first());

        let tracks = self.resolve_tracks(item, master);

        let description = [
            detail.and_then(|d| d.notes.as_deref()),
            master.and_then(|m| m.notes.as_deref()),
        ]
        .into_iter()
        .flatten()
        .map(|notes| clean_text(notes, DESCRIPTION_MAX_CHARS))
        .find(|notes| !notes.is_empty())
        .unwrap_or_default();

        let producer = [
            detail.map(|d| d.extraartists.as_slice()).unwrap_or_default(),
            master.map(|m| m.extraartists.as_slice()).unwrap_or_default(),
        ]
        .into_iter()
        .map(producers)
        .find(|joined| !joined.is_empty())
        .unwrap_or_default();

        NormalizedRecord {
            id: item.record_id(),
            title,
            artist,
            year: resolve_year(item_year, master.and_then(|m| m.year)),
            label: label.map(|l| clean_artist_name(&l.name)).unwrap_or_default(),
            catalog_number: label
                .and_then(|l| l.catno.as_deref())
                .map(|c| clean_text(c, TITLE_MAX_CHARS))
                .unwrap_or_default(),
            cover_url: resolve_cover(item, master),
            tracks,
            genres: resolve_genres(
                master.map(|m| m.genres.as_slice()).unwrap_or_default(),
                item_genres,
            ),
            styles: resolve_styles(
                master.map(|m| m.styles.as_slice()).unwrap_or_default(),
                item_styles,
            ),
            description,
            producer,
            recording_date: detail
                .and_then(|d| d.released.as_deref())
                .map(|r| clean_text(r, TITLE_MAX_CHARS))
                .unwrap_or_default(),
            date_added: item.date_added.clone(),
            rating: item.rating.filter(|r| *r > 0),
            source: Provenance {
                release_id: item.id,
                master_id: item.master_id().or(master.map(|m| m.id)),
                release_url: detail.and_then(|d| d.uri.clone()),
                master_url: master.and_then(|m| m.uri.clone()),
            },
        }
    }

    /// Check the required fields of a record
    pub fn validate(&self, record: &NormalizedRecord) -> Result<(), ValidationError> {
        let checks: [(&'static str, bool); 8] = [
            ("id", record.id.trim().is_empty()),
            ("title", record.title.trim().is_empty()),
            ("artist", record.artist.trim().is_empty()),
            ("year", record.year.trim().is_empty()),
            ("label", record.label.trim().is_empty()),
            ("genres", record.genres.iter().all(|g| g.trim().is_empty())),
            ("cover_url", record.cover_url.trim().is_empty()),
            ("tracks", record.tracks.is_empty()),
        ];

        let missing: Vec<&'static str> = checks
            .into_iter()
            .filter(|(_, is_missing)| *is_missing)
            .map(|(field, _)| field)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                record_id: record.id.clone(),
                missing,
            })
        }
    }

    fn resolve_tracks(&self, item: &RawCatalogItem, master: Option<&MasterRecord>) -> Vec<Track> {
        let from_detail = item
            .detail
            .as_ref()
            .map(|d| convert_tracklist(&d.tracklist))
            .unwrap_or_default();
        if !from_detail.is_empty() {
            return from_detail;
        }

        let from_master = master
            .map(|m| convert_tracklist(&m.tracklist))
            .unwrap_or_default();
        if !from_master.is_empty() {
            return from_master;
        }

        let placeholders = placeholder_tracks(&mut rand::thread_rng());
        debug!(
            release_id = item.id,
            tracks = placeholders.len(),
            "No tracklist available, generated placeholder tracks"
        );
        placeholders
    }
}

/// Master year, then item year, then "Unknown"; zero counts as missing
pub fn resolve_year(item_year: Option<i32>, master_year: Option<i32>) -> String {
    master_year
        .filter(|y| *y > 0)
        .or(item_year.filter(|y| *y > 0))
        .map(|y| y.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// Master genres, then item genres, then ["Unknown"]
pub fn resolve_genres(master: &[String], item: &[String]) -> Vec<String> {
    let resolved = resolve_styles(master, item);
    if resolved.is_empty() {
        vec![UNKNOWN.to_string()]
    } else {
        resolved
    }
}

/// Master styles, then item styles; may be empty
pub fn resolve_styles(master: &[String], item: &[String]) -> Vec<String> {
    let from_master = clean_list(master);
    if from_master.is_empty() {
        clean_list(item)
    } else {
        from_master
    }
}

/// Cleaned entries without blanks, placeholders or repeats
fn clean_list(values: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = Vec::new();
    for value in values {
        let value = clean_text(value, TITLE_MAX_CHARS);
        if value.is_empty() || value.eq_ignore_ascii_case(UNKNOWN) || cleaned.contains(&value) {
            continue;
        }
        cleaned.push(value);
    }
    cleaned
}

fn first_non_empty<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> String {
    candidates
        .into_iter()
        .flatten()
        .map(|value| clean_text(value, TITLE_MAX_CHARS))
        .find(|value| !value.is_empty())
        .unwrap_or_default()
}

fn join_artists(artists: &[ArtistCredit]) -> String {
    let mut names: Vec<String> = Vec::new();
    for artist in artists {
        let name = clean_artist_name(&artist.name);
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names.join(", ")
}

fn producers(credits: &[ArtistCredit]) -> String {
    let producers: Vec<ArtistCredit> = credits
        .iter()
        .filter(|c| {
            c.role
                .as_deref()
                .map(|r| r.to_ascii_lowercase().contains("producer"))
                .unwrap_or(false)
        })
        .cloned()
        .collect();
    join_artists(&producers)
}

fn resolve_cover(item: &RawCatalogItem, master: Option<&MasterRecord>) -> String {
    let detail_images: &[Image] = item
        .detail
        .as_ref()
        .map(|d| d.images.as_slice())
        .unwrap_or_default();
    let master_images: &[Image] = master.map(|m| m.images.as_slice()).unwrap_or_default();

    let candidates = [
        item.basic_information.cover_image.as_deref(),
        detail_images
            .iter()
            .find(|i| i.is_primary())
            .and_then(|i| i.uri.as_deref()),
        detail_images.iter().find_map(|i| i.uri.as_deref()),
        master_images
            .iter()
            .find(|i| i.is_primary())
            .and_then(|i| i.uri.as_deref()),
        item.basic_information.thumb.as_deref(),
    ];

    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|uri| !uri.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn convert_tracklist(entries: &[TrackEntry]) -> Vec<Track> {
    entries
        .iter()
        .filter(|e| e.is_playable())
        .enumerate()
        .map(|(index, entry)| {
            let position = entry
                .position
                .as_deref()
                .map(|p| clean_text(p, 16))
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| (index + 1).to_string());
            Track {
                position,
                title: clean_text(entry.title.as_deref().unwrap_or_default(), TITLE_MAX_CHARS),
                duration: entry
                    .duration
                    .as_deref()
                    .map(|d| clean_text(d, 16))
                    .unwrap_or_default(),
            }
        })
        .collect()
}

/// 4–6 generic tracks with durations between 2:30 and 5:30
///
/// Sides split in half: A1, A2, A3, B1, B2, B3.
pub fn placeholder_tracks<R: Rng>(rng: &mut R) -> Vec<Track> {
    let count: usize = rng.gen_range(4..=6);
    let side_a = count.div_ceil(2);

    (0..count)
        .map(|index| {
            let position = if index < side_a {
                format!("A{}", index + 1)
            } else {
                format!("B{}", index - side_a + 1)
            };
            Track {
                position,
                title: format!("Track {}", index + 1),
                duration: format_duration(rng.gen_range(150..=330)),
            }
        })
        .collect()
}
