//! # Embedding Benchmark - Main Entry Point
//!
//! Runs one load-generation pass against the selected embedding provider and
//! prints the latency and throughput report.
//!
//! ## Architecture Overview
//!
//! The main function performs these key operations:
//! 1. **Parse arguments**: Flags and environment variables, with typed defaults
//! 2. **Initialize logging**: Colorized console output, optional log file
//! 3. **Create run config and provider**: Validate parameters, build the client
//! 4. **Run the benchmark**: Until the deadline or Ctrl-C
//! 5. **Generate results**: Human-readable report and optional JSON file
//!
//! ## Error Handling
//!
//! Invalid configuration and provider construction errors abort before the
//! run starts. Request failures during the run never do; they are reflected
//! in the report.

use anyhow::Result;
use clap::Parser;
use embedding_benchmark::{
    benchmark::{BenchmarkRunner, RunConfig},
    cli::Args,
    embedding::ProviderFactory,
    logging::init_logging,
    results::{LogReporter, ResultsManager},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Held until main returns so the file writer flushes on every exit path.
    let _logging = init_logging(&args)?;

    info!("Starting Embedding Benchmark v{}", embedding_benchmark::VERSION);

    let config = RunConfig::from_args(&args)?;
    let provider = ProviderFactory::create(&args)?;
    info!("Using {} provider ({})", args.provider, provider.name());

    let results_manager = args
        .output_file
        .as_deref()
        .map(ResultsManager::new)
        .transpose()?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping run");
                shutdown.cancel();
            }
        });
    }

    let report = BenchmarkRunner::new(config, provider, Arc::new(LogReporter::new()))
        .with_cancellation(shutdown)
        .run()
        .await?;

    // Quiet mode filters info-level logs, so print the report directly.
    if args.quiet {
        println!("{}", report);
    }

    if let Some(manager) = results_manager {
        manager.write_json(&report)?;
    }

    Ok(())
}
