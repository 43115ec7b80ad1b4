//! User-activity log extraction.
//!
//! Keeps only song-play events, converts their epoch-millisecond timestamps,
//! and derives the `users` and `time` dimensions from them.

use crate::config::EtlConfig;
use crate::error::{EtlError, Result, Stage};
use crate::jsonl::Sourced;
use crate::models::{LogExtractStats, RawLogRecord, ReadStats, SongPlayEvent, TimeRow, UserRow};
use crate::processor::calendar::{decompose, parse_epoch_millis, start_time_from_millis};
use crate::processor::discovery::InputReader;
use crate::processor::run_blocking;
use crate::storage::ObjectStore;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, warn};

/// Page value marking a song-play event
pub const SONG_PLAY_PAGE: &str = "NextSong";

/// Output of the log stage
#[derive(Debug, Clone, Default)]
pub struct LogTables {
    /// Song-play events in input order
    pub events: Vec<SongPlayEvent>,
    pub users: Vec<UserRow>,
    pub time: Vec<TimeRow>,
    pub stats: LogExtractStats,
}

/// Reads the log-data prefix and builds the event-derived dimensions
#[derive(Debug, Clone)]
pub struct LogExtractor {
    store: Arc<dyn ObjectStore>,
    config: Arc<EtlConfig>,
}

impl LogExtractor {
    pub fn new(store: Arc<dyn ObjectStore>, config: Arc<EtlConfig>) -> Self {
        Self { store, config }
    }

    pub async fn extract(&self) -> Result<LogTables> {
        let store = self.store.clone();
        let config = self.config.clone();

        let tables = run_blocking(Stage::LogExtraction, move || {
            let reader = InputReader::new(store.as_ref(), &config.paths.input_pattern)?;
            let (records, read) = reader.read_prefix::<RawLogRecord>(&config.paths.log_data)?;
            extract_log_tables(&records, read)
        })
        .await?;

        info!(
            "Activity logs: {} song plays, {} users, {} distinct start times ({} other events dropped)",
            tables.events.len(),
            tables.users.len(),
            tables.time.len(),
            tables.stats.filtered_out
        );
        Ok(tables)
    }
}

/// Filter, validate and derive everything the log stage produces
pub fn extract_log_tables(records: &[Sourced<RawLogRecord>], read: ReadStats) -> Result<LogTables> {
    let mut stats = LogExtractStats {
        read,
        ..Default::default()
    };
    let events = filter_song_plays(records, &mut stats)?;
    let users = build_users(&events);
    let time = build_time(&events);

    Ok(LogTables {
        events,
        users,
        time,
        stats,
    })
}

/// Keep `NextSong` events that carry a user id and a timestamp.
///
/// A timestamp that is present but unusable aborts the run.
pub fn filter_song_plays(
    records: &[Sourced<RawLogRecord>],
    stats: &mut LogExtractStats,
) -> Result<Vec<SongPlayEvent>> {
    let mut events = Vec::new();

    for (seq, sourced) in records.iter().enumerate() {
        let record = &sourced.record;
        if record.page.as_deref() != Some(SONG_PLAY_PAGE) {
            stats.filtered_out += 1;
            continue;
        }

        let Some(raw_ts) = &record.ts else {
            stats.missing_timestamp += 1;
            continue;
        };
        let (ts_ms, start_time) = parse_epoch_millis(raw_ts)
            .and_then(|ms| start_time_from_millis(ms).map(|t| (ms, t)))
            .ok_or_else(|| EtlError::MalformedTimestamp {
                key: sourced.key.to_string(),
                line: sourced.line,
                value: raw_ts.to_string(),
            })?;

        let Some(user_id) = record.user_id.as_ref().and_then(|id| id.normalized()) else {
            stats.missing_user_id += 1;
            continue;
        };

        events.push(SongPlayEvent {
            seq,
            ts_ms,
            start_time,
            user_id,
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            gender: record.gender.clone(),
            level: record.level.clone(),
            song: record.song.clone(),
            artist: record.artist.clone(),
            length: record.length,
            session_id: record.session_id,
            location: record.location.clone(),
            user_agent: record.user_agent.clone(),
        });
    }

    let skipped = stats.missing_timestamp + stats.missing_user_id;
    if skipped > 0 {
        warn!(
            "Skipped {} song plays without a user id or timestamp",
            skipped
        );
    }
    Ok(events)
}

/// One row per user, taken from their latest event (later input wins ties)
pub fn build_users(events: &[SongPlayEvent]) -> Vec<UserRow> {
    let mut ordered: Vec<&SongPlayEvent> = events.iter().collect();
    ordered.sort_by_key(|e| (e.ts_ms, e.seq));

    let mut users: BTreeMap<&str, UserRow> = BTreeMap::new();
    for event in ordered {
        users.insert(
            event.user_id.as_str(),
            UserRow {
                user_id: event.user_id.clone(),
                first_name: event.first_name.clone(),
                last_name: event.last_name.clone(),
                gender: event.gender.clone(),
                level: event.level.clone(),
            },
        );
    }
    users.into_values().collect()
}

/// One row per distinct start time, ascending
pub fn build_time(events: &[SongPlayEvent]) -> Vec<TimeRow> {
    events
        .iter()
        .map(|e| e.start_time)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(decompose)
        .collect()
}
