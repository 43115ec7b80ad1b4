//! JSON-lines record parsing.
//!
//! Each input object holds one JSON record per line. Lines that cannot be
//! decoded into the target record type are skipped and counted rather than
//! failing the whole object.

use crate::models::ReadStats;
use serde::de::DeserializeOwned;
use std::io::BufRead;
use std::sync::Arc;
use tracing::{debug, warn};

/// A decoded record together with where it came from
#[derive(Debug, Clone)]
pub struct Sourced<T> {
    pub key: Arc<str>,
    /// 1-based line number within the object
    pub line: usize,
    pub record: T,
}

/// Decode every line of `bytes`, appending records to `out` in line order
pub fn parse_json_lines<T: DeserializeOwned>(
    key: &str,
    bytes: &[u8],
    out: &mut Vec<Sourced<T>>,
    stats: &mut ReadStats,
) {
    let key: Arc<str> = Arc::from(key);
    let before = out.len();

    for (index, line) in bytes.lines().enumerate() {
        let line_num = index + 1;
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Skipping unreadable line {} in {}: {}", line_num, key, e);
                stats.malformed += 1;
                continue;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<T>(trimmed) {
            Ok(record) => {
                stats.records += 1;
                out.push(Sourced {
                    key: key.clone(),
                    line: line_num,
                    record,
                });
            }
            Err(e) => {
                warn!("Skipping malformed record at {}:{}: {}", key, line_num, e);
                stats.malformed += 1;
            }
        }
    }

    stats.objects += 1;
    debug!("Parsed {} records from {}", out.len() - before, key);
}
