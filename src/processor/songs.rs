//! Song-metadata extraction.
//!
//! Derives the `songs` and `artists` dimensions from song-metadata records.
//! Both are deduplicated on their key with the first record in input order
//! winning, and emitted sorted by key.

use crate::config::EtlConfig;
use crate::error::{Result, Stage};
use crate::jsonl::Sourced;
use crate::models::{ArtistRow, RawSongRecord, ReadStats, SongExtractStats, SongRow};
use crate::processor::discovery::InputReader;
use crate::processor::run_blocking;
use crate::storage::ObjectStore;
use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::sync::Arc;
use tracing::{debug, info};

/// Output of the song-metadata stage
#[derive(Debug, Clone, Default)]
pub struct SongTables {
    pub songs: Vec<SongRow>,
    pub artists: Vec<ArtistRow>,
    pub stats: SongExtractStats,
}

/// Reads the song-data prefix and builds the two song dimensions
#[derive(Debug, Clone)]
pub struct SongMetadataExtractor {
    store: Arc<dyn ObjectStore>,
    config: Arc<EtlConfig>,
}

impl SongMetadataExtractor {
    pub fn new(store: Arc<dyn ObjectStore>, config: Arc<EtlConfig>) -> Self {
        Self { store, config }
    }

    pub async fn extract(&self) -> Result<SongTables> {
        let store = self.store.clone();
        let config = self.config.clone();

        let tables = run_blocking(Stage::SongExtraction, move || {
            let reader = InputReader::new(store.as_ref(), &config.paths.input_pattern)?;
            let (records, read) = reader.read_prefix::<RawSongRecord>(&config.paths.song_data)?;
            Ok(extract_song_tables(&records, read))
        })
        .await?;

        info!(
            "Song metadata: {} songs, {} artists from {} records",
            tables.songs.len(),
            tables.artists.len(),
            tables.stats.read.records
        );
        Ok(tables)
    }
}

/// Project and deduplicate song-metadata records into `songs` and `artists`
pub fn extract_song_tables(records: &[Sourced<RawSongRecord>], read: ReadStats) -> SongTables {
    let mut stats = SongExtractStats {
        read,
        ..Default::default()
    };
    let mut songs: BTreeMap<String, SongRow> = BTreeMap::new();
    let mut artists: BTreeMap<String, ArtistRow> = BTreeMap::new();
    let mut conflicting_artists = 0usize;

    for sourced in records {
        let record = &sourced.record;

        match &record.song_id {
            Some(song_id) => {
                songs.entry(song_id.clone()).or_insert_with(|| SongRow {
                    song_id: song_id.clone(),
                    title: record.title.clone(),
                    artist_id: record.artist_id.clone(),
                    year: record.year,
                    duration: record.duration,
                });
            }
            None => stats.missing_song_id += 1,
        }

        match &record.artist_id {
            Some(artist_id) => match artists.entry(artist_id.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(ArtistRow {
                        artist_id: artist_id.clone(),
                        name: record.artist_name.clone(),
                        location: record.artist_location.clone(),
                        latitude: record.artist_latitude,
                        longitude: record.artist_longitude,
                    });
                }
                Entry::Occupied(existing) => {
                    let kept = existing.get();
                    if kept.name != record.artist_name || kept.location != record.artist_location {
                        conflicting_artists += 1;
                    }
                }
            },
            None => stats.missing_artist_id += 1,
        }
    }

    if conflicting_artists > 0 {
        debug!(
            "{} artist records disagreed with the first record for their artist_id; kept the first",
            conflicting_artists
        );
    }

    SongTables {
        songs: songs.into_values().collect(),
        artists: artists.into_values().collect(),
        stats,
    }
}
