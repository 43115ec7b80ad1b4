//! Polars schemas for the five output tables.
//!
//! Converts typed table rows into `DataFrame`s and exposes each row's Hive
//! partition values. Partition columns live in the directory layout, so the
//! frames built here leave them out.

use crate::models::{ArtistRow, SongRow, SongplayRow, TableName, TimeRow, UserRow};
use polars::prelude::*;

/// A row type that can be written as one of the output tables
pub trait TableRecord: Send + Sync + 'static {
    const TABLE: TableName;

    /// Values of `TABLE.partition_columns()`, in the same order
    fn partition_values(&self) -> Vec<Option<String>>;

    /// Build a frame holding `rows`, without partition columns
    fn to_frame(rows: &[&Self]) -> PolarsResult<DataFrame>;
}

fn datetime_ms() -> DataType {
    DataType::Datetime(TimeUnit::Milliseconds, None)
}

/// Cast epoch-millisecond columns to `Datetime`
fn with_datetime_column(df: DataFrame, name: &str) -> PolarsResult<DataFrame> {
    df.lazy()
        .with_columns([col(name).cast(datetime_ms())])
        .collect()
}

impl TableRecord for SongRow {
    const TABLE: TableName = TableName::Songs;

    fn partition_values(&self) -> Vec<Option<String>> {
        vec![self.year.map(|y| y.to_string()), self.artist_id.clone()]
    }

    fn to_frame(rows: &[&Self]) -> PolarsResult<DataFrame> {
        df!(
            "song_id" => rows.iter().map(|r| r.song_id.as_str()).collect::<Vec<_>>(),
            "title" => rows.iter().map(|r| r.title.as_deref()).collect::<Vec<_>>(),
            "duration" => rows.iter().map(|r| r.duration).collect::<Vec<_>>(),
        )
    }
}

impl TableRecord for ArtistRow {
    const TABLE: TableName = TableName::Artists;

    fn partition_values(&self) -> Vec<Option<String>> {
        Vec::new()
    }

    fn to_frame(rows: &[&Self]) -> PolarsResult<DataFrame> {
        df!(
            "artist_id" => rows.iter().map(|r| r.artist_id.as_str()).collect::<Vec<_>>(),
            "name" => rows.iter().map(|r| r.name.as_deref()).collect::<Vec<_>>(),
            "location" => rows.iter().map(|r| r.location.as_deref()).collect::<Vec<_>>(),
            "latitude" => rows.iter().map(|r| r.latitude).collect::<Vec<_>>(),
            "longitude" => rows.iter().map(|r| r.longitude).collect::<Vec<_>>(),
        )
    }
}

impl TableRecord for UserRow {
    const TABLE: TableName = TableName::Users;

    fn partition_values(&self) -> Vec<Option<String>> {
        Vec::new()
    }

    fn to_frame(rows: &[&Self]) -> PolarsResult<DataFrame> {
        df!(
            "user_id" => rows.iter().map(|r| r.user_id.as_str()).collect::<Vec<_>>(),
            "first_name" => rows.iter().map(|r| r.first_name.as_deref()).collect::<Vec<_>>(),
            "last_name" => rows.iter().map(|r| r.last_name.as_deref()).collect::<Vec<_>>(),
            "gender" => rows.iter().map(|r| r.gender.as_deref()).collect::<Vec<_>>(),
            "level" => rows.iter().map(|r| r.level.as_deref()).collect::<Vec<_>>(),
        )
    }
}

impl TableRecord for TimeRow {
    const TABLE: TableName = TableName::Time;

    fn partition_values(&self) -> Vec<Option<String>> {
        vec![Some(self.year.to_string()), Some(self.month.to_string())]
    }

    fn to_frame(rows: &[&Self]) -> PolarsResult<DataFrame> {
        let df = df!(
            "start_time" => rows.iter().map(|r| r.start_time.timestamp_millis()).collect::<Vec<_>>(),
            "hour" => rows.iter().map(|r| r.hour).collect::<Vec<_>>(),
            "day" => rows.iter().map(|r| r.day).collect::<Vec<_>>(),
            "week" => rows.iter().map(|r| r.week).collect::<Vec<_>>(),
            "weekday" => rows.iter().map(|r| r.weekday.as_str()).collect::<Vec<_>>(),
        )?;
        with_datetime_column(df, "start_time")
    }
}

impl TableRecord for SongplayRow {
    const TABLE: TableName = TableName::Songplays;

    fn partition_values(&self) -> Vec<Option<String>> {
        use chrono::Datelike;
        vec![
            Some(self.start_time.year().to_string()),
            Some(self.start_time.month().to_string()),
        ]
    }

    fn to_frame(rows: &[&Self]) -> PolarsResult<DataFrame> {
        let df = df!(
            "songplay_id" => rows.iter().map(|r| r.songplay_id).collect::<Vec<_>>(),
            "start_time" => rows.iter().map(|r| r.start_time.timestamp_millis()).collect::<Vec<_>>(),
            "user_id" => rows.iter().map(|r| r.user_id.as_str()).collect::<Vec<_>>(),
            "level" => rows.iter().map(|r| r.level.as_deref()).collect::<Vec<_>>(),
            "song_id" => rows.iter().map(|r| r.song_id.as_deref()).collect::<Vec<_>>(),
            "artist_id" => rows.iter().map(|r| r.artist_id.as_deref()).collect::<Vec<_>>(),
            "session_id" => rows.iter().map(|r| r.session_id).collect::<Vec<_>>(),
            "location" => rows.iter().map(|r| r.location.as_deref()).collect::<Vec<_>>(),
            "user_agent" => rows.iter().map(|r| r.user_agent.as_deref()).collect::<Vec<_>>(),
        )?;
        with_datetime_column(df, "start_time")
    }
}
