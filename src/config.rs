//! Configuration management and validation.
//!
//! Provides the configuration built once at job start: storage location and
//! credentials, input/output path prefixes, and the Parquet encoding
//! settings used by the table writer.

use crate::error::{EtlError, Result};
use crate::models::TableName;
use polars::prelude::ParquetCompression;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Supported compression algorithms for parquet files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionAlgorithm {
    /// Snappy compression - good balance of speed and compression
    Snappy,
    /// ZSTD compression - better compression ratio, slower
    Zstd,
    /// LZ4 compression - fastest, lower compression ratio
    Lz4,
    /// No compression
    Uncompressed,
}

impl CompressionAlgorithm {
    /// Convert to polars ParquetCompression type
    pub fn to_polars_compression(&self) -> ParquetCompression {
        match self {
            CompressionAlgorithm::Snappy => ParquetCompression::Snappy,
            CompressionAlgorithm::Zstd => ParquetCompression::Zstd(None),
            CompressionAlgorithm::Lz4 => ParquetCompression::Lz4Raw,
            CompressionAlgorithm::Uncompressed => ParquetCompression::Uncompressed,
        }
    }
}

/// Parquet encoding settings for every table file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParquetConfig {
    pub compression_algorithm: CompressionAlgorithm,

    /// Enable column statistics for query pruning
    pub enable_statistics: bool,

    /// Rows per row group; `None` lets polars decide
    pub row_group_size: Option<usize>,
}

impl Default for ParquetConfig {
    fn default() -> Self {
        Self {
            compression_algorithm: CompressionAlgorithm::Snappy,
            enable_statistics: true,
            row_group_size: None,
        }
    }
}

/// Object-storage location and credentials
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// `file://` URL or filesystem path used as the storage root
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

/// Input and output path prefixes inside the object store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub song_data: String,
    pub log_data: String,
    pub output: String,

    /// File-name glob an input object must match
    pub input_pattern: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            song_data: "song_data".to_string(),
            log_data: "log_data".to_string(),
            output: "analytics".to_string(),
            input_pattern: "*.json".to_string(),
        }
    }
}

/// Job configuration, immutable once the run starts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EtlConfig {
    pub storage: StorageConfig,
    pub paths: PathsConfig,

    /// Encoding settings are not part of the config file
    #[serde(skip)]
    pub parquet: ParquetConfig,
}

impl EtlConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            EtlError::configuration(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: EtlConfig = toml::from_str(&contents)?;
        debug!("Loaded config file {}", path.display());
        Ok(config)
    }

    /// Default config file location, e.g. `~/.config/songplay-etl/config.toml`
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("songplay-etl").join("config.toml"))
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.storage.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_song_data(mut self, prefix: impl Into<String>) -> Self {
        self.paths.song_data = prefix.into();
        self
    }

    pub fn with_log_data(mut self, prefix: impl Into<String>) -> Self {
        self.paths.log_data = prefix.into();
        self
    }

    pub fn with_output(mut self, prefix: impl Into<String>) -> Self {
        self.paths.output = prefix.into();
        self
    }

    pub fn with_parquet(mut self, parquet: ParquetConfig) -> Self {
        self.parquet = parquet;
        self
    }

    /// Output prefix for one table
    pub fn table_prefix(&self, table: TableName) -> String {
        format!("{}/{}", self.paths.output.trim_end_matches('/'), table)
    }

    /// Reject configurations that cannot produce a consistent run
    pub fn validate(&self) -> Result<()> {
        let paths = &self.paths;
        for (name, value) in [
            ("song_data", &paths.song_data),
            ("log_data", &paths.log_data),
            ("output", &paths.output),
            ("input_pattern", &paths.input_pattern),
        ] {
            if value.trim().is_empty() {
                return Err(EtlError::configuration(format!(
                    "paths.{} must not be empty",
                    name
                )));
            }
        }

        let output = normalize_prefix(&paths.output);
        for input in [&paths.song_data, &paths.log_data] {
            if normalize_prefix(input) == output {
                return Err(EtlError::configuration(format!(
                    "output prefix '{}' must differ from input prefix '{}'",
                    paths.output, input
                )));
            }
        }

        glob::Pattern::new(&paths.input_pattern).map_err(|e| {
            EtlError::configuration(format!(
                "invalid input pattern '{}': {}",
                paths.input_pattern, e
            ))
        })?;

        let storage = &self.storage;
        if storage.access_key_id.is_some() != storage.secret_access_key.is_some() {
            return Err(EtlError::configuration(
                "access_key_id and secret_access_key must be set together",
            ));
        }

        if let Some(endpoint) = &storage.endpoint {
            if let Some((scheme, _)) = endpoint.split_once("://") {
                if scheme != "file" {
                    return Err(EtlError::configuration(format!(
                        "unsupported storage scheme '{}'; only file:// endpoints and paths are handled",
                        scheme
                    )));
                }
            }
        }

        Ok(())
    }
}

fn normalize_prefix(prefix: &str) -> &str {
    prefix.trim().trim_end_matches('/')
}
