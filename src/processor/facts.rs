//! Fact building: joins song-play events against the song dimensions.
//!
//! Events are matched on exact `(title, artist name, duration)` equality.
//! A miss leaves `song_id`/`artist_id` null; the event still becomes a fact.

use crate::models::{ArtistRow, FactStats, SongPlayEvent, SongRow, SongplayRow};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MatchKey {
    title: String,
    artist_name: String,
    duration_bits: u64,
}

/// Bit pattern used for exact duration equality. NaN never matches and
/// both zeros compare equal.
fn duration_bits(duration: f64) -> Option<u64> {
    if duration.is_nan() {
        None
    } else if duration == 0.0 {
        Some(0.0_f64.to_bits())
    } else {
        Some(duration.to_bits())
    }
}

/// Lookup from `(title, artist name, duration)` to `(song_id, artist_id)`
#[derive(Debug, Default)]
pub struct SongIndex {
    by_key: HashMap<MatchKey, (String, String)>,
}

impl SongIndex {
    /// Index songs whose artist is known; ambiguous keys keep the lowest ids
    pub fn build(songs: &[SongRow], artists: &[ArtistRow]) -> Self {
        let artist_names: HashMap<&str, &str> = artists
            .iter()
            .filter_map(|a| a.name.as_deref().map(|name| (a.artist_id.as_str(), name)))
            .collect();

        let mut by_key: HashMap<MatchKey, (String, String)> = HashMap::new();
        let mut ambiguous = 0usize;

        for song in songs {
            let (Some(title), Some(artist_id), Some(duration)) =
                (&song.title, &song.artist_id, song.duration)
            else {
                continue;
            };
            let Some(artist_name) = artist_names.get(artist_id.as_str()) else {
                continue;
            };
            let Some(duration_bits) = duration_bits(duration) else {
                continue;
            };

            let key = MatchKey {
                title: title.clone(),
                artist_name: artist_name.to_string(),
                duration_bits,
            };
            let candidate = (song.song_id.clone(), artist_id.clone());
            by_key
                .entry(key)
                .and_modify(|current| {
                    ambiguous += 1;
                    if candidate < *current {
                        *current = candidate.clone();
                    }
                })
                .or_insert_with(|| candidate.clone());
        }

        if ambiguous > 0 {
            debug!(
                "{} songs share title, artist and duration with another song; lowest song_id kept",
                ambiguous
            );
        }
        Self { by_key }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// Exact, case-sensitive match for a log event's free-text fields
    pub fn lookup(&self, title: &str, artist_name: &str, duration: f64) -> Option<(&str, &str)> {
        let key = MatchKey {
            title: title.to_string(),
            artist_name: artist_name.to_string(),
            duration_bits: duration_bits(duration)?,
        };
        self.by_key
            .get(&key)
            .map(|(song_id, artist_id)| (song_id.as_str(), artist_id.as_str()))
    }

    fn match_event(&self, event: &SongPlayEvent) -> Option<(&str, &str)> {
        match (&event.song, &event.artist, event.length) {
            (Some(song), Some(artist), Some(length)) => self.lookup(song, artist, length),
            _ => None,
        }
    }
}

/// One fact per event, ids assigned densely from 1 in `(start_time, input order)`
pub fn build_songplays(events: &[SongPlayEvent], index: &SongIndex) -> (Vec<SongplayRow>, FactStats) {
    let mut ordered: Vec<&SongPlayEvent> = events.iter().collect();
    ordered.sort_by_key(|e| (e.ts_ms, e.seq));

    let mut stats = FactStats::default();
    let songplays = ordered
        .into_iter()
        .zip(1_i64..)
        .map(|(event, songplay_id)| {
            let matched = index.match_event(event);
            if matched.is_some() {
                stats.matched += 1;
            } else {
                stats.unmatched += 1;
            }

            SongplayRow {
                songplay_id,
                start_time: event.start_time,
                user_id: event.user_id.clone(),
                level: event.level.clone(),
                song_id: matched.map(|(song_id, _)| song_id.to_string()),
                artist_id: matched.map(|(_, artist_id)| artist_id.to_string()),
                session_id: event.session_id,
                location: event.location.clone(),
                user_agent: event.user_agent.clone(),
            }
        })
        .collect();

    (songplays, stats)
}
