//! Songplay ETL Library
//!
//! Reshapes song-metadata records and user-activity logs into a star schema
//! (`songplays` facts with `songs`, `artists`, `users` and `time`
//! dimensions) and writes it as Hive-partitioned Parquet.
//!
//! This library provides tools for:
//! - Discovering and decoding JSON-lines input from an object store
//! - Deduplicating the song, artist and user dimensions deterministically
//! - Decomposing epoch-millisecond timestamps into calendar fields (UTC)
//! - Joining play events to known songs without ever dropping a fact
//! - Writing each table as an independent, all-or-nothing Parquet dataset

pub mod cli;
pub mod config;
pub mod error;
pub mod jsonl;
pub mod models;
pub mod processor;
pub mod schema;
pub mod storage;

// Re-export commonly used types
pub use config::EtlConfig;
pub use error::{EtlError, Result, Stage};
pub use models::{RunReport, StarSchema, TableName};
pub use processor::EtlPipeline;
