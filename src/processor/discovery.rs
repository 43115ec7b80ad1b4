//! Input discovery for the song-data and log-data prefixes
//!
//! Lists the objects under a prefix, keeps those whose file name matches the
//! configured glob, and decodes them as JSON lines in key order. Key order
//! plus line order is the input order every tie-break relies on.

use crate::error::{EtlError, Result};
use crate::jsonl::{Sourced, parse_json_lines};
use crate::models::ReadStats;
use crate::storage::ObjectStore;
use glob::Pattern;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

/// Discovers and reads JSON-lines objects from one store
#[derive(Debug)]
pub struct InputReader<'a> {
    store: &'a dyn ObjectStore,
    pattern: Pattern,
}

impl<'a> InputReader<'a> {
    pub fn new(store: &'a dyn ObjectStore, pattern: &str) -> Result<Self> {
        let pattern = Pattern::new(pattern).map_err(|e| {
            EtlError::configuration(format!("invalid input pattern '{}': {}", pattern, e))
        })?;
        Ok(Self { store, pattern })
    }

    /// Object keys under `prefix` that count as input, in key order
    pub fn discover(&self, prefix: &str) -> Result<Vec<String>> {
        let keys: Vec<String> = self
            .store
            .list(prefix)?
            .into_iter()
            .filter(|key| self.is_input_key(key))
            .collect();

        if keys.is_empty() {
            warn!(
                "No objects matching '{}' under {}",
                self.pattern.as_str(),
                prefix
            );
        } else {
            debug!("Discovered {} input objects under {}", keys.len(), prefix);
        }
        Ok(keys)
    }

    /// Read every input object under `prefix` into records of type `T`
    pub fn read_prefix<T: DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> Result<(Vec<Sourced<T>>, ReadStats)> {
        let mut records = Vec::new();
        let mut stats = ReadStats::default();

        for key in self.discover(prefix)? {
            let bytes = self.store.get(&key)?;
            parse_json_lines(&key, &bytes, &mut records, &mut stats);
        }

        if stats.malformed > 0 {
            warn!(
                "Skipped {} malformed records under {}",
                stats.malformed, prefix
            );
        }
        Ok((records, stats))
    }

    /// Hidden and bookkeeping files (`.crc`, `_SUCCESS`) are never input
    fn is_input_key(&self, key: &str) -> bool {
        let name = key.rsplit('/').next().unwrap_or(key);
        !name.starts_with('.') && !name.starts_with('_') && self.pattern.matches(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawSongRecord;
    use crate::storage::LocalStore;
    use std::fs;
    use tempfile::TempDir;

    fn create_song_data(temp_dir: &TempDir) {
        let base = temp_dir.path().join("song_data").join("A").join("B");
        fs::create_dir_all(&base).unwrap();
        fs::write(
            base.join("TRABB.json"),
            r#"{"song_id":"S2","artist_id":"A2","title":"Second"}"#,
        )
        .unwrap();
        fs::write(
            base.join("TRAAA.json"),
            r#"{"song_id":"S1","artist_id":"A1","title":"First"}"#,
        )
        .unwrap();
        fs::write(base.join("_SUCCESS"), "").unwrap();
        fs::write(base.join(".TRAAA.json.crc"), "crc").unwrap();
        fs::write(base.join("notes.txt"), "ignore me").unwrap();
    }

    #[test]
    fn test_discover_filters_by_pattern() {
        let temp_dir = TempDir::new().unwrap();
        create_song_data(&temp_dir);
        let store = LocalStore::new(temp_dir.path());

        let reader = InputReader::new(&store, "*.json").unwrap();
        let keys = reader.discover("song_data").unwrap();

        assert_eq!(
            keys,
            vec!["song_data/A/B/TRAAA.json", "song_data/A/B/TRABB.json"]
        );
    }

    #[test]
    fn test_read_prefix_preserves_key_order() {
        let temp_dir = TempDir::new().unwrap();
        create_song_data(&temp_dir);
        let store = LocalStore::new(temp_dir.path());

        let reader = InputReader::new(&store, "*.json").unwrap();
        let (records, stats) = reader.read_prefix::<RawSongRecord>("song_data").unwrap();

        assert_eq!(stats.objects, 2);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record.song_id.as_deref(), Some("S1"));
        assert_eq!(records[1].record.song_id.as_deref(), Some("S2"));
    }

    #[test]
    fn test_empty_prefix_yields_no_records() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("log_data")).unwrap();
        let store = LocalStore::new(temp_dir.path());

        let reader = InputReader::new(&store, "*.json").unwrap();
        let (records, stats) = reader.read_prefix::<RawSongRecord>("log_data").unwrap();

        assert!(records.is_empty());
        assert_eq!(stats, ReadStats::default());
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(temp_dir.path());

        let result = InputReader::new(&store, "[");
        assert!(matches!(result, Err(EtlError::Configuration { .. })));
    }
}
