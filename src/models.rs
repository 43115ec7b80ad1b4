//! Core data structures for the star-schema ETL.
//!
//! Defines the raw record shapes read from JSON lines, the row types of the
//! five output tables, and the statistics collected while a run progresses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Output tables produced by every run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableName {
    Songs,
    Artists,
    Users,
    Time,
    Songplays,
}

impl TableName {
    pub const ALL: [TableName; 5] = [
        TableName::Songs,
        TableName::Artists,
        TableName::Users,
        TableName::Time,
        TableName::Songplays,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TableName::Songs => "songs",
            TableName::Artists => "artists",
            TableName::Users => "users",
            TableName::Time => "time",
            TableName::Songplays => "songplays",
        }
    }

    /// Hive partition columns, outermost first. Empty for unpartitioned tables.
    pub fn partition_columns(&self) -> &'static [&'static str] {
        match self {
            TableName::Songs => &["year", "artist_id"],
            TableName::Time | TableName::Songplays => &["year", "month"],
            TableName::Artists | TableName::Users => &[],
        }
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One song-metadata record as stored in the song-data prefix
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSongRecord {
    pub song_id: Option<String>,
    pub title: Option<String>,
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<f64>,
    pub artist_longitude: Option<f64>,
    pub year: Option<i32>,
    pub duration: Option<f64>,
    pub num_songs: Option<i32>,
}

/// User ids show up both as JSON strings and as integers
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FlexibleId {
    Text(String),
    Integer(i64),
}

impl FlexibleId {
    /// Canonical string form; `None` for blank text ids (logged-out users)
    pub fn normalized(&self) -> Option<String> {
        match self {
            FlexibleId::Text(text) => {
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            FlexibleId::Integer(value) => Some(value.to_string()),
        }
    }
}

/// One user-activity record as stored in the log-data prefix
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLogRecord {
    pub artist: Option<String>,
    pub auth: Option<String>,
    pub first_name: Option<String>,
    pub gender: Option<String>,
    pub item_in_session: Option<i64>,
    pub last_name: Option<String>,
    pub length: Option<f64>,
    pub level: Option<String>,
    pub location: Option<String>,
    pub method: Option<String>,
    pub page: Option<String>,
    pub registration: Option<f64>,
    pub session_id: Option<i64>,
    pub song: Option<String>,
    pub status: Option<i64>,
    /// Kept untyped so a malformed value can be told apart from a missing one
    pub ts: Option<serde_json::Value>,
    pub user_agent: Option<String>,
    pub user_id: Option<FlexibleId>,
}

/// A `NextSong` log event that survived filtering and validation
#[derive(Debug, Clone, PartialEq)]
pub struct SongPlayEvent {
    /// Position in input order
    pub seq: usize,
    pub ts_ms: i64,
    pub start_time: DateTime<Utc>,
    pub user_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: Option<String>,
    pub song: Option<String>,
    pub artist: Option<String>,
    pub length: Option<f64>,
    pub session_id: Option<i64>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongRow {
    pub song_id: String,
    pub title: Option<String>,
    pub artist_id: Option<String>,
    /// `Some(0)` means the year is unknown; it is kept as-is
    pub year: Option<i32>,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtistRow {
    pub artist_id: String,
    pub name: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub user_id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeRow {
    pub start_time: DateTime<Utc>,
    pub hour: i32,
    pub day: i32,
    /// ISO-8601 week of year
    pub week: i32,
    pub month: i32,
    pub year: i32,
    /// Three-letter English abbreviation, `Mon` through `Sun`
    pub weekday: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongplayRow {
    pub songplay_id: i64,
    pub start_time: DateTime<Utc>,
    pub user_id: String,
    pub level: Option<String>,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: Option<i64>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

/// All five tables of one run, ready to be written
#[derive(Debug, Clone, Default)]
pub struct StarSchema {
    pub songs: Vec<SongRow>,
    pub artists: Vec<ArtistRow>,
    pub users: Vec<UserRow>,
    pub time: Vec<TimeRow>,
    pub songplays: Vec<SongplayRow>,
}

impl StarSchema {
    pub fn row_count(&self, table: TableName) -> usize {
        match table {
            TableName::Songs => self.songs.len(),
            TableName::Artists => self.artists.len(),
            TableName::Users => self.users.len(),
            TableName::Time => self.time.len(),
            TableName::Songplays => self.songplays.len(),
        }
    }
}

/// Counters for reading JSON-lines objects
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadStats {
    pub objects: usize,
    pub records: usize,
    pub malformed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SongExtractStats {
    pub read: ReadStats,
    pub missing_song_id: usize,
    pub missing_artist_id: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogExtractStats {
    pub read: ReadStats,
    /// Events dropped because they were not song plays
    pub filtered_out: usize,
    pub missing_user_id: usize,
    pub missing_timestamp: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FactStats {
    pub matched: usize,
    pub unmatched: usize,
}

/// Outcome of a successful run
#[derive(Debug, Default)]
pub struct RunReport {
    pub songs: SongExtractStats,
    pub logs: LogExtractStats,
    pub facts: FactStats,
    pub tables: Vec<(TableName, usize)>,
    pub output_prefix: String,
    pub processing_time_ms: u128,
}

impl RunReport {
    pub fn rows_written(&self, table: TableName) -> Option<usize> {
        self.tables
            .iter()
            .find(|(name, _)| *name == table)
            .map(|(_, rows)| *rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flexible_id_normalization() {
        assert_eq!(FlexibleId::Integer(8).normalized(), Some("8".to_string()));
        assert_eq!(
            FlexibleId::Text(" 26 ".to_string()).normalized(),
            Some("26".to_string())
        );
        assert_eq!(FlexibleId::Text(String::new()).normalized(), None);
    }

    #[test]
    fn test_raw_log_record_field_names() {
        let record: RawLogRecord = serde_json::from_str(
            r#"{"page":"NextSong","userId":"8","firstName":"Kaylee","sessionId":139,
                "userAgent":"Mozilla","ts":1541107493796,"itemInSession":3}"#,
        )
        .unwrap();

        assert_eq!(record.page.as_deref(), Some("NextSong"));
        assert_eq!(record.user_id, Some(FlexibleId::Text("8".to_string())));
        assert_eq!(record.first_name.as_deref(), Some("Kaylee"));
        assert_eq!(record.session_id, Some(139));
        assert_eq!(record.item_in_session, Some(3));
        assert!(record.ts.is_some());
        assert!(record.artist.is_none());
    }

    #[test]
    fn test_null_timestamp_reads_as_missing() {
        let record: RawLogRecord = serde_json::from_str(r#"{"page":"NextSong","ts":null}"#).unwrap();
        assert!(record.ts.is_none());
    }

    #[test]
    fn test_partition_columns() {
        assert_eq!(TableName::Songs.partition_columns(), &["year", "artist_id"]);
        assert_eq!(TableName::Songplays.partition_columns(), &["year", "month"]);
        assert!(TableName::Users.partition_columns().is_empty());
    }
}
