//! Timestamp decomposition for the `time` dimension.
//!
//! Everything is computed in UTC so the same epoch value always yields the
//! same calendar fields.

use crate::models::TimeRow;
use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde_json::Value;

/// Interpret a raw `ts` value as epoch milliseconds.
///
/// Accepts integers, integral floats and integer strings; anything else is
/// malformed and yields `None`.
pub fn parse_epoch_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
}

pub fn start_time_from_millis(ts_ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ts_ms)
}

pub fn weekday_abbrev(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "Mon",
        Weekday::Tue => "Tue",
        Weekday::Wed => "Wed",
        Weekday::Thu => "Thu",
        Weekday::Fri => "Fri",
        Weekday::Sat => "Sat",
        Weekday::Sun => "Sun",
    }
}

/// Derive every `time` column from a start time
pub fn decompose(start_time: DateTime<Utc>) -> TimeRow {
    TimeRow {
        start_time,
        hour: start_time.hour() as i32,
        day: start_time.day() as i32,
        week: start_time.iso_week().week() as i32,
        month: start_time.month() as i32,
        year: start_time.year(),
        weekday: weekday_abbrev(start_time.weekday()).to_string(),
    }
}
