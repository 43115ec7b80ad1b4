//! Parquet writing module for the star-schema tables
//!
//! Encodes each table into Hive-partitioned Parquet files in memory and
//! then swaps the whole table prefix in one storage call, so a failed table
//! never leaves a half-written directory behind. Tables are written
//! independently of each other.

use crate::config::{EtlConfig, ParquetConfig};
use crate::error::{EtlError, Result};
use crate::models::{StarSchema, TableName};
use crate::schema::TableRecord;
use crate::storage::{ObjectStore, StagedObject};

use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use polars::prelude::{DataFrame, ParquetWriter as PolarsParquetWriter, StatisticsOptions};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::task::{self, JoinHandle};
use tracing::{debug, error, info};

/// Directory value Hive readers treat as null
pub const NULL_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

/// Marker written into every successfully replaced table prefix
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Writes tables under `<output>/<table>`
#[derive(Debug, Clone)]
pub struct TableWriter {
    store: Arc<dyn ObjectStore>,
    config: Arc<EtlConfig>,
}

impl TableWriter {
    pub fn new(store: Arc<dyn ObjectStore>, config: Arc<EtlConfig>) -> Self {
        Self { store, config }
    }

    /// Encode and publish one table, returning the number of rows written
    pub fn write_table<R: TableRecord>(&self, rows: &[R]) -> Result<usize> {
        let table = R::TABLE;
        let prefix = self.config.table_prefix(table);

        let objects = encode_table(rows, &self.config.parquet).map_err(|e| EtlError::TableWrite {
            table,
            reason: e.to_string(),
        })?;
        let files = objects.len() - 1;

        self.store
            .replace_prefix(&prefix, objects)
            .map_err(|e| EtlError::TableWrite {
                table,
                reason: e.to_string(),
            })?;

        debug!("Wrote {} rows to {} in {} files", rows.len(), prefix, files);
        Ok(rows.len())
    }

    fn spawn_write<R: TableRecord>(&self, rows: Vec<R>) -> JoinHandle<Result<usize>> {
        let writer = self.clone();
        task::spawn_blocking(move || writer.write_table(&rows))
    }

    /// Write all five tables concurrently.
    ///
    /// Every table is attempted; failures are logged one by one and reported
    /// together once the others have finished.
    pub async fn write_all(&self, schema: StarSchema) -> Result<Vec<(TableName, usize)>> {
        let progress_bar = ProgressBar::new_spinner();
        progress_bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        progress_bar.set_message("Writing tables...");

        let StarSchema {
            songs,
            artists,
            users,
            time,
            songplays,
        } = schema;

        let handles = vec![
            (TableName::Songs, self.spawn_write(songs)),
            (TableName::Artists, self.spawn_write(artists)),
            (TableName::Users, self.spawn_write(users)),
            (TableName::Time, self.spawn_write(time)),
            (TableName::Songplays, self.spawn_write(songplays)),
        ];
        let (tables, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let results = join_all(handles).await;

        let mut written = Vec::new();
        let mut failed = Vec::new();
        for (table, result) in tables.into_iter().zip(results) {
            match result.map_err(EtlError::from).and_then(|r| r) {
                Ok(rows) => {
                    info!("Wrote table {} ({} rows)", table, rows);
                    progress_bar.set_message(format!("Wrote {}", table));
                    written.push((table, rows));
                }
                Err(e) => {
                    error!("Failed to write table {}: {:#}", table, e);
                    let reason = match e {
                        EtlError::TableWrite { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    failed.push((table, reason));
                }
            }
        }

        if failed.is_empty() {
            progress_bar.finish_with_message("All tables written");
            Ok(written)
        } else {
            progress_bar.abandon_with_message("Some tables failed to write");
            Err(EtlError::WritesFailed { tables: failed })
        }
    }
}

/// Encode a table into staged objects keyed relative to the table prefix.
///
/// Rows are grouped by partition values (nulls first, then ascending) and
/// each partition becomes one `part-00000.parquet`. Empty strings group with
/// nulls. The last object is always the success marker.
pub fn encode_table<R: TableRecord>(rows: &[R], parquet: &ParquetConfig) -> Result<Vec<StagedObject>> {
    let columns = R::TABLE.partition_columns();
    let mut objects = Vec::new();

    if columns.is_empty() {
        let all: Vec<&R> = rows.iter().collect();
        let df = R::to_frame(&all)?;
        objects.push(StagedObject {
            key: "part-00000.parquet".to_string(),
            bytes: encode_frame(df, parquet)?,
        });
    } else {
        let mut partitions: BTreeMap<Vec<Option<String>>, Vec<&R>> = BTreeMap::new();
        for row in rows {
            let values = row
                .partition_values()
                .into_iter()
                .map(|value| value.filter(|v| !v.is_empty()))
                .collect();
            partitions.entry(values).or_default().push(row);
        }

        for (values, members) in partitions {
            let df = R::to_frame(&members)?;
            objects.push(StagedObject {
                key: format!("{}/part-00000.parquet", partition_path(columns, &values)),
                bytes: encode_frame(df, parquet)?,
            });
        }
    }

    objects.push(StagedObject {
        key: SUCCESS_MARKER.to_string(),
        bytes: Vec::new(),
    });

    let mut seen = HashSet::new();
    if let Some(duplicate) = objects.iter().find(|o| !seen.insert(o.key.as_str())) {
        return Err(EtlError::storage(
            duplicate.key.clone(),
            format!("two partitions of {} map to the same file", R::TABLE),
        ));
    }
    Ok(objects)
}

/// Write a frame to an in-memory Parquet file
fn encode_frame(mut df: DataFrame, parquet: &ParquetConfig) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let writer = PolarsParquetWriter::new(&mut buffer)
        .with_compression(parquet.compression_algorithm.to_polars_compression())
        .with_statistics(if parquet.enable_statistics {
            StatisticsOptions::full()
        } else {
            StatisticsOptions::empty()
        });

    // Apply row group size if specified
    let writer = if let Some(row_group_size) = parquet.row_group_size {
        writer.with_row_group_size(Some(row_group_size))
    } else {
        writer
    };

    writer.finish(&mut df)?;
    Ok(buffer)
}

/// `col=value/col=value` directory path for one partition
pub fn partition_path(columns: &[&str], values: &[Option<String>]) -> String {
    columns
        .iter()
        .zip(values)
        .map(|(column, value)| match value {
            Some(value) => format!("{}={}", column, escape_partition_value(value)),
            None => format!("{}={}", column, NULL_PARTITION),
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Percent-encode characters that would break a directory name
pub fn escape_partition_value(value: &str) -> String {
    if value.is_empty() {
        return NULL_PARTITION.to_string();
    }
    // A literal null marker must not land in the null directory
    if value == NULL_PARTITION {
        return format!("%5F{}", &value[1..]);
    }

    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ' ') {
            escaped.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                escaped.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    if escaped == "." || escaped == ".." {
        escaped = escaped.replace('.', "%2E");
    }
    escaped
}
