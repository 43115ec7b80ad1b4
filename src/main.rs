use anyhow::Context;
use clap::Parser;
use songplay_etl::{EtlError, EtlPipeline};
use songplay_etl::cli::{self, Args};
use songplay_etl::models::RunReport;
use std::process;

fn main() {
    // Parse command line arguments
    let args = Args::parse();
    cli::setup_logging(&args);

    // Create async runtime and run the job with signal handling
    let runtime = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to create async runtime: {}", e);
        process::exit(1);
    });

    let result = runtime.block_on(async {
        tokio::select! {
            result = run(&args) => result,
            signal = tokio::signal::ctrl_c() => {
                eprintln!("\nReceived CTRL+C, shutting down...");
                let reason = match signal {
                    Ok(()) => "interrupted by user".to_string(),
                    Err(e) => format!("signal handler failed: {}", e),
                };
                Err(anyhow::Error::from(EtlError::Interrupted { reason }))
            }
        }
    });

    match result {
        Ok(report) => {
            cli::print_summary(&report);
            process::exit(0);
        }
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}

async fn run(args: &Args) -> anyhow::Result<RunReport> {
    let config = args.load_config().context("Failed to load configuration")?;
    let pipeline = EtlPipeline::new(config).context("Failed to initialise the ETL pipeline")?;
    let report = pipeline.run().await.context("ETL run failed")?;
    Ok(report)
}
