//! Error handling for ETL operations.
//!
//! Provides error types with enough context to tell which stage of a run
//! failed (extraction, fact build or write) and, for writes, which table.

use crate::models::TableName;
use std::fmt;
use thiserror::Error;

/// Pipeline stage an error surfaced from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    SongExtraction,
    LogExtraction,
    FactBuild,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::SongExtraction => "song extraction",
            Stage::LogExtraction => "log extraction",
            Stage::FactBuild => "fact build",
            Stage::Write => "write",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("No input found under prefix: {prefix}")]
    InputNotFound { prefix: String },

    #[error("Storage error for '{key}': {reason}")]
    Storage { key: String, reason: String },

    #[error("Malformed timestamp in {key} line {line}: {value}")]
    MalformedTimestamp {
        key: String,
        line: usize,
        value: String,
    },

    #[error("Failed to write table '{table}': {reason}")]
    TableWrite { table: TableName, reason: String },

    /// Every failed table with the reason it failed
    #[error("{} table write(s) failed: {}", .tables.len(), join_failures(.tables))]
    WritesFailed { tables: Vec<(TableName, String)> },

    #[error("{stage} failed")]
    StageFailed {
        stage: Stage,
        #[source]
        source: Box<EtlError>,
    },

    #[error("Processing interrupted: {reason}")]
    Interrupted { reason: String },
}

fn join_failures(tables: &[(TableName, String)]) -> String {
    tables
        .iter()
        .map(|(table, reason)| format!("{} ({})", table, reason))
        .collect::<Vec<_>>()
        .join("; ")
}

impl EtlError {
    /// Attach the failing stage to an error, leaving already-tagged errors alone
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            tagged @ EtlError::StageFailed { .. } => tagged,
            other => EtlError::StageFailed {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Stage this error was tagged with, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            EtlError::StageFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn storage(key: impl Into<String>, reason: impl Into<String>) -> Self {
        EtlError::Storage {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        EtlError::Configuration {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
