//! Command-line interface components.

use crate::config::EtlConfig;
use crate::error::Result;
use crate::models::{RunReport, TableName};
use clap::Parser;
use colored::*;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "songplay-etl")]
#[command(about = "Reshape song metadata and activity logs into a partitioned Parquet star schema")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Args {
    /// TOML config file (defaults to <config dir>/songplay-etl/config.toml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Storage endpoint: a file:// URL or a directory used as the storage root
    #[arg(long, env = "STORAGE_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Storage region
    #[arg(long, env = "AWS_REGION")]
    pub region: Option<String>,

    /// Storage access key id
    #[arg(long, env = "AWS_ACCESS_KEY_ID", hide_env_values = true)]
    pub access_key_id: Option<String>,

    /// Storage secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_access_key: Option<String>,

    /// Prefix holding song-metadata JSON files
    #[arg(long, env = "SONG_DATA")]
    pub song_data: Option<String>,

    /// Prefix holding activity-log JSON files
    #[arg(long, env = "LOG_DATA")]
    pub log_data: Option<String>,

    /// Prefix the five tables are written under
    #[arg(short, long, env = "OUTPUT_PATH")]
    pub output: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Args {
    pub fn log_level(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "warn"
        } else {
            "info"
        }
    }

    /// Build the run configuration: defaults, then config file, then flags/env
    pub fn load_config(&self) -> Result<EtlConfig> {
        let default_path = EtlConfig::default_config_path().filter(|path| path.exists());
        let config_file = self.config.clone().or(default_path);

        let mut config = match &config_file {
            Some(path) => {
                info!("Using config file: {}", path.display());
                EtlConfig::from_file(path)?
            }
            None => {
                info!("No config file found, using defaults and environment variables");
                EtlConfig::default()
            }
        };

        self.apply_overrides(&mut config);
        config.validate()?;
        debug!("Loaded configuration: {:?}", config);
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut EtlConfig) {
        let storage = &mut config.storage;
        override_option(&mut storage.endpoint, &self.endpoint);
        override_option(&mut storage.region, &self.region);
        override_option(&mut storage.access_key_id, &self.access_key_id);
        override_option(&mut storage.secret_access_key, &self.secret_access_key);

        let paths = &mut config.paths;
        override_value(&mut paths.song_data, &self.song_data);
        override_value(&mut paths.log_data, &self.log_data);
        override_value(&mut paths.output, &self.output);
    }
}

fn override_option(target: &mut Option<String>, value: &Option<String>) {
    if value.is_some() {
        target.clone_from(value);
    }
}

fn override_value(target: &mut String, value: &Option<String>) {
    if let Some(value) = value {
        target.clone_from(value);
    }
}

/// Set up structured logging based on CLI arguments
pub fn setup_logging(args: &Args) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = args.log_level();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("songplay_etl={}", log_level)));

    if args.quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_level(true)
                    .with_timer(fmt::time::uptime())
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    debug!("Logging initialized at level: {}", log_level);
}

/// Print the end-of-run summary
pub fn print_summary(report: &RunReport) {
    println!("\n{}", "ETL Summary".bright_green().bold());
    println!(
        "  {} {}ms",
        "Time elapsed:".bright_cyan(),
        report.processing_time_ms.to_string().bright_white()
    );
    println!(
        "  {} {}",
        "Output:".bright_cyan(),
        report.output_prefix.bright_white()
    );

    for table in TableName::ALL {
        let rows = report
            .rows_written(table)
            .map(|rows| rows.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "  {:<12} {}",
            format!("{}:", table).bright_cyan(),
            rows.bright_white().bold()
        );
    }

    println!(
        "  {} {} matched, {} unmatched",
        "Song plays:".bright_cyan(),
        report.facts.matched.to_string().bright_white(),
        report.facts.unmatched.to_string().bright_white()
    );

    let malformed = report.songs.read.malformed + report.logs.read.malformed;
    let skipped = report.logs.missing_user_id + report.logs.missing_timestamp;
    if malformed > 0 || skipped > 0 {
        println!(
            "  {} {} malformed records, {} song plays missing user or timestamp",
            "Skipped:".bright_yellow(),
            malformed.to_string().bright_yellow().bold(),
            skipped.to_string().bright_yellow().bold()
        );
    }
}
