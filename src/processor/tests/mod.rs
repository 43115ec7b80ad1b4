//! Integration tests for the processor module
//!
//! Runs the whole pipeline against song-data and log-data prefixes laid out
//! in a temporary directory.

pub mod basic_processing;

use crate::config::EtlConfig;
use crate::processor::EtlPipeline;
use polars::prelude::{DataFrame, ParquetReader, SerReader};
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use walkdir::WalkDir;

pub const REFERENCE_TS: i64 = 1541107493796;

/// Song record in the layout of the song-data prefix
pub fn song_json(song_id: &str, title: &str, artist_id: &str, artist_name: &str, duration: f64) -> Value {
    json!({
        "num_songs": 1,
        "artist_id": artist_id,
        "artist_latitude": null,
        "artist_longitude": null,
        "artist_location": "",
        "artist_name": artist_name,
        "song_id": song_id,
        "title": title,
        "duration": duration,
        "year": 1994
    })
}

/// Log record in the layout of the log-data prefix
pub fn log_json(page: &str, user_id: Value, ts: Value, level: &str, song: Option<(&str, &str, f64)>) -> Value {
    let (title, artist, length) = match song {
        Some((title, artist, length)) => (json!(title), json!(artist), json!(length)),
        None => (Value::Null, Value::Null, Value::Null),
    };
    json!({
        "artist": artist,
        "auth": "Logged In",
        "firstName": "Kaylee",
        "gender": "F",
        "itemInSession": 0,
        "lastName": "Summers",
        "length": length,
        "level": level,
        "location": "Phoenix-Mesa-Scottsdale, AZ",
        "method": "PUT",
        "page": page,
        "registration": 1540344794796.0,
        "sessionId": 139,
        "song": title,
        "status": 200,
        "ts": ts,
        "userAgent": "Mozilla/5.0",
        "userId": user_id
    })
}

/// Write records as one JSON object per line
pub fn write_json_lines(root: &Path, key: &str, records: &[Value]) {
    let path = root.join(key);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let body: Vec<String> = records.iter().map(|r| r.to_string()).collect();
    fs::write(path, body.join("\n")).unwrap();
}

/// The reference dataset: one matching song, a Home event and a level change
pub fn create_reference_dataset(temp_dir: &TempDir) {
    let root = temp_dir.path();
    write_json_lines(
        root,
        "song_data/A/A/A/TRAAAAW128F429D538.json",
        &[song_json("SONRWUU12AF72A4283", "You Gotta Be", "ARPDVPJ1187B9ADBE9", "Des'ree", 246.3)],
    );
    write_json_lines(
        root,
        "song_data/A/A/B/TRAABCL128F4286650.json",
        &[song_json("SOXVLOJ12AB0189215", "Amor De Cabaret", "ARKFYS91187B98E58F", "Jeff And Sheri Easter", 207.77751)],
    );
    write_json_lines(
        root,
        "log_data/2018/11/2018-11-01-events.json",
        &[
            log_json("Home", json!(8), json!(REFERENCE_TS - 5_000), "free", None),
            log_json("NextSong", json!(8), json!(REFERENCE_TS), "free", Some(("You Gotta Be", "Des'ree", 246.3))),
            log_json("NextSong", json!("8"), json!(REFERENCE_TS + 60_000), "paid", Some(("Unknown Song", "Nobody", 99.0))),
        ],
    );
}

pub fn pipeline_for(temp_dir: &TempDir) -> EtlPipeline {
    let config = EtlConfig::default().with_endpoint(temp_dir.path().to_string_lossy().to_string());
    EtlPipeline::new(config).unwrap()
}

/// Read every Parquet file under a table directory, in path order
pub fn read_table(root: &Path, table_dir: &str) -> Vec<(String, DataFrame)> {
    let mut files: Vec<_> = WalkDir::new(root.join(table_dir))
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "parquet"))
        .map(|entry| entry.path().to_path_buf())
        .collect();
    files.sort();

    files
        .into_iter()
        .map(|path| {
            let relative = path
                .strip_prefix(root.join(table_dir))
                .unwrap()
                .to_string_lossy()
                .to_string();
            let df = ParquetReader::new(fs::File::open(&path).unwrap())
                .finish()
                .unwrap();
            (relative, df)
        })
        .collect()
}

pub fn total_rows(tables: &[(String, DataFrame)]) -> usize {
    tables.iter().map(|(_, df)| df.height()).sum()
}
