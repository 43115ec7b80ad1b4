//! Object-storage access.
//!
//! The pipeline talks to storage only through [`ObjectStore`]: listing keys
//! under a prefix, fetching an object, and replacing everything under a
//! prefix in one step. [`LocalStore`] maps keys onto a filesystem root.

use crate::config::StorageConfig;
use crate::error::{EtlError, Result};
use chrono::Utc;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// An object to be written, keyed relative to the prefix being replaced
#[derive(Debug, Clone)]
pub struct StagedObject {
    pub key: String,
    pub bytes: Vec<u8>,
}

pub trait ObjectStore: Send + Sync + fmt::Debug {
    /// All object keys under `prefix`, sorted
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Replace the whole contents of `prefix` with `objects`.
    ///
    /// Either every object becomes visible or the previous contents remain.
    fn replace_prefix(&self, prefix: &str, objects: Vec<StagedObject>) -> Result<()>;
}

/// Build the store described by the storage configuration
pub fn connect(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    let root = match config.endpoint.as_deref() {
        None => PathBuf::from("."),
        Some(endpoint) => match endpoint.split_once("://") {
            Some(("file", path)) => PathBuf::from(path),
            Some((scheme, _)) => {
                return Err(EtlError::configuration(format!(
                    "unsupported storage scheme '{}'",
                    scheme
                )));
            }
            None => PathBuf::from(endpoint),
        },
    };

    if config.access_key_id.is_some() || config.region.is_some() {
        debug!("Local storage ignores region and credentials");
    }

    let store = LocalStore::new(root);
    debug!("Using local storage rooted at {}", store.root().display());
    Ok(Arc::new(store))
}

/// Filesystem-backed store. Absolute keys bypass the root.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn write_staging(&self, staging: &Path, objects: &[StagedObject]) -> Result<()> {
        fs::create_dir_all(staging)?;
        for object in objects {
            let path = staging.join(&object.key);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, &object.bytes)?;
        }
        Ok(())
    }
}

fn join_key(prefix: &str, relative: &Path) -> String {
    let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if relative.is_empty() {
        prefix.to_string()
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), relative)
    }
}

/// Staged keys must stay inside the prefix being replaced
fn is_contained_key(key: &str) -> bool {
    let path = Path::new(key);
    !key.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

impl ObjectStore for LocalStore {
    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let base = self.resolve(prefix);
        if !base.exists() {
            return Err(EtlError::InputNotFound {
                prefix: prefix.to_string(),
            });
        }

        let mut keys = Vec::new();
        for entry in WalkDir::new(&base).sort_by_file_name() {
            let entry = entry.map_err(|e| EtlError::storage(prefix, e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&base)
                .map_err(|e| EtlError::storage(prefix, e.to_string()))?;
            keys.push(join_key(prefix, relative));
        }

        keys.sort();
        debug!("Listed {} objects under {}", keys.len(), prefix);
        Ok(keys)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        fs::read(self.resolve(key)).map_err(|e| EtlError::storage(key, e.to_string()))
    }

    fn replace_prefix(&self, prefix: &str, objects: Vec<StagedObject>) -> Result<()> {
        if let Some(bad) = objects.iter().find(|o| !is_contained_key(&o.key)) {
            return Err(EtlError::storage(
                prefix,
                format!("staged key '{}' escapes the prefix", bad.key),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = objects.iter().find(|o| !seen.insert(o.key.as_str())) {
            return Err(EtlError::storage(
                prefix,
                format!("staged key '{}' appears more than once", duplicate.key),
            ));
        }

        let target = self.resolve(prefix.trim_end_matches('/'));
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| EtlError::storage(prefix, "prefix has no final component"))?;
        let parent = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&parent).map_err(|e| EtlError::storage(prefix, e.to_string()))?;

        let stamp = format!("{}-{}", std::process::id(), Utc::now().timestamp_micros());
        let staging = parent.join(format!(".{}.staging-{}", name, stamp));
        let backup = parent.join(format!(".{}.replaced-{}", name, stamp));

        if let Err(e) = self.write_staging(&staging, &objects) {
            let _ = fs::remove_dir_all(&staging);
            return Err(EtlError::storage(prefix, format!("staging failed: {}", e)));
        }

        let had_previous = target.exists();
        if had_previous {
            if let Err(e) = fs::rename(&target, &backup) {
                let _ = fs::remove_dir_all(&staging);
                return Err(EtlError::storage(
                    prefix,
                    format!("could not move previous contents aside: {}", e),
                ));
            }
        }

        if let Err(e) = fs::rename(&staging, &target) {
            if had_previous {
                let _ = fs::rename(&backup, &target);
            }
            let _ = fs::remove_dir_all(&staging);
            return Err(EtlError::storage(
                prefix,
                format!("could not publish staged contents: {}", e),
            ));
        }

        if had_previous {
            if let Err(e) = fs::remove_dir_all(&backup) {
                warn!("Failed to remove old contents of {}: {}", prefix, e);
            }
        }

        debug!("Replaced {} with {} objects", prefix, objects.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn staged(key: &str, bytes: &[u8]) -> StagedObject {
        StagedObject {
            key: key.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_list_is_recursive_and_sorted() {
        let temp_dir = TempDir::new().unwrap();
        let base = temp_dir.path().join("song_data");
        fs::create_dir_all(base.join("B/A")).unwrap();
        fs::create_dir_all(base.join("A/B")).unwrap();
        fs::write(base.join("B/A/x.json"), "{}").unwrap();
        fs::write(base.join("A/B/y.json"), "{}").unwrap();
        fs::write(base.join("A/a.json"), "{}").unwrap();

        let store = LocalStore::new(temp_dir.path());
        let keys = store.list("song_data").unwrap();

        assert_eq!(
            keys,
            vec![
                "song_data/A/B/y.json",
                "song_data/A/a.json",
                "song_data/B/A/x.json"
            ]
        );
        assert_eq!(store.get(&keys[0]).unwrap(), b"{}");
    }

    #[test]
    fn test_missing_prefix_is_input_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(temp_dir.path());

        match store.list("nowhere") {
            Err(EtlError::InputNotFound { prefix }) => assert_eq!(prefix, "nowhere"),
            other => panic!("Expected InputNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_replace_prefix_overwrites_previous_contents() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(temp_dir.path());

        store
            .replace_prefix("out/users", vec![staged("old.parquet", b"old")])
            .unwrap();
        store
            .replace_prefix("out/users", vec![staged("part-00000.parquet", b"new")])
            .unwrap();

        let keys = store.list("out/users").unwrap();
        assert_eq!(keys, vec!["out/users/part-00000.parquet"]);

        // no staging or backup directories left behind
        let leftovers: Vec<_> = fs::read_dir(temp_dir.path().join("out"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_rejected_replace_keeps_previous_contents() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(temp_dir.path());

        store
            .replace_prefix("out/time", vec![staged("year=2018/part-00000.parquet", b"v1")])
            .unwrap();

        let result = store.replace_prefix(
            "out/time",
            vec![staged("ok.parquet", b"v2"), staged("../escape.parquet", b"x")],
        );
        assert!(matches!(result, Err(EtlError::Storage { .. })));

        let keys = store.list("out/time").unwrap();
        assert_eq!(keys, vec!["out/time/year=2018/part-00000.parquet"]);
        assert_eq!(store.get(&keys[0]).unwrap(), b"v1");
    }

    #[test]
    fn test_duplicate_staged_keys_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalStore::new(temp_dir.path());

        store
            .replace_prefix("out/songs", vec![staged("part-00000.parquet", b"v1")])
            .unwrap();

        let result = store.replace_prefix(
            "out/songs",
            vec![
                staged("year=2000/part-00000.parquet", b"a"),
                staged("year=2000/part-00000.parquet", b"b"),
            ],
        );
        assert!(matches!(result, Err(EtlError::Storage { .. })));

        let keys = store.list("out/songs").unwrap();
        assert_eq!(keys, vec!["out/songs/part-00000.parquet"]);
    }

    #[test]
    fn test_connect_handles_file_urls() {
        let config = StorageConfig {
            endpoint: Some("file:///tmp/lake".to_string()),
            ..Default::default()
        };
        assert!(connect(&config).is_ok());

        let config = StorageConfig {
            endpoint: Some("s3://bucket".to_string()),
            ..Default::default()
        };
        assert!(connect(&config).is_err());
    }
}
