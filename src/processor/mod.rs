//! Main processing engine with a staged pipeline.
//!
//! Runs the song-metadata and log extractors side by side, builds the
//! `songplays` fact table from their outputs, and hands all five tables to
//! the table writer. Each stage consumes the previous stage's immutable
//! output.

pub mod calendar;
pub mod discovery;
pub mod facts;
pub mod logs;
pub mod songs;
pub mod writer;

#[cfg(test)]
pub mod tests;

use self::{
    facts::{SongIndex, build_songplays},
    logs::{LogExtractor, LogTables},
    songs::{SongMetadataExtractor, SongTables},
    writer::TableWriter,
};

use crate::config::EtlConfig;
use crate::error::{EtlError, Result, Stage};
use crate::models::{FactStats, RunReport, StarSchema};
use crate::storage::{self, ObjectStore};

use std::sync::Arc;
use std::time::Instant;
use tokio::task;
use tracing::{debug, info};

/// Run blocking work off the async runtime and tag any failure with `stage`
pub(crate) async fn run_blocking<T, F>(stage: Stage, work: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    task::spawn_blocking(work)
        .await
        .map_err(EtlError::from)
        .and_then(|result| result)
        .map_err(|e| e.in_stage(stage))
}

/// Extracted dimensions plus the fact table, before anything is written
#[derive(Debug, Default)]
pub struct Transformed {
    pub schema: StarSchema,
    pub report: RunReport,
}

/// The ETL job: extract, build facts, write
#[derive(Debug)]
pub struct EtlPipeline {
    config: Arc<EtlConfig>,
    store: Arc<dyn ObjectStore>,
}

impl EtlPipeline {
    /// Validate the configuration and connect to storage
    pub fn new(config: EtlConfig) -> Result<Self> {
        config.validate()?;
        let store = storage::connect(&config.storage)?;
        Ok(Self::with_store(config, store))
    }

    /// Use an already constructed store
    pub fn with_store(config: EtlConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    /// Run every stage except writing
    pub async fn transform(&self) -> Result<Transformed> {
        let song_extractor = SongMetadataExtractor::new(self.store.clone(), self.config.clone());
        let log_extractor = LogExtractor::new(self.store.clone(), self.config.clone());

        // The extractors share nothing, so they run side by side
        let (song_tables, log_tables) =
            tokio::try_join!(song_extractor.extract(), log_extractor.extract())?;

        let SongTables {
            songs,
            artists,
            stats: song_stats,
        } = song_tables;
        let LogTables {
            events,
            users,
            time,
            stats: log_stats,
        } = log_tables;

        let (songs, artists, songplays, fact_stats) =
            run_blocking(Stage::FactBuild, move || {
                let index = SongIndex::build(&songs, &artists);
                debug!("Song index holds {} match keys", index.len());
                let (songplays, stats) = build_songplays(&events, &index);
                Ok((songs, artists, songplays, stats))
            })
            .await?;
        log_fact_stats(&fact_stats);

        Ok(Transformed {
            schema: StarSchema {
                songs,
                artists,
                users,
                time,
                songplays,
            },
            report: RunReport {
                songs: song_stats,
                logs: log_stats,
                facts: fact_stats,
                output_prefix: self.config.paths.output.clone(),
                ..Default::default()
            },
        })
    }

    /// Main processing entry point
    pub async fn run(&self) -> Result<RunReport> {
        let start_time = Instant::now();
        info!(
            "Starting ETL run: songs from '{}', logs from '{}', output to '{}'",
            self.config.paths.song_data, self.config.paths.log_data, self.config.paths.output
        );

        let Transformed { schema, mut report } = self.transform().await?;

        let writer = TableWriter::new(self.store.clone(), self.config.clone());
        report.tables = writer
            .write_all(schema)
            .await
            .map_err(|e| e.in_stage(Stage::Write))?;

        report.processing_time_ms = start_time.elapsed().as_millis();
        info!("ETL run finished in {}ms", report.processing_time_ms);
        Ok(report)
    }
}

fn log_fact_stats(stats: &FactStats) {
    info!(
        "Built {} song plays ({} matched a known song, {} did not)",
        stats.matched + stats.unmatched,
        stats.matched,
        stats.unmatched
    );
}
