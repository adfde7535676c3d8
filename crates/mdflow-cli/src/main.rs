//! mdflow command-line entry point.
//!
//! Binary name: `mdflow`
//!
//! Loads `mdflow.toml`, initializes tracing, then dispatches to the command
//! handler.

mod cli;

use std::sync::Arc;

use clap::Parser;
use mdflow_core::IngestionPipeline;
use mdflow_infra::config::load_config;
use mdflow_infra::hash::Sha256ContentHasher;
use mdflow_observe::tracing_setup::{init_tracing, shutdown_tracing};
use mdflow_types::config::MdflowConfig;

use cli::{Cli, Commands};

/// Build the ingestion pipeline described by the configuration.
pub(crate) fn pipeline(config: &MdflowConfig) -> IngestionPipeline {
    IngestionPipeline::new(Arc::new(Sha256ContentHasher::new()))
        .with_options(config.parser.clone(), config.converter.clone())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.log_format, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let config = load_config(&cli.config).await;

    let result = match cli.command {
        Commands::Check { file, strict } => cli::check::run(&config, &file, strict, cli.json),
        Commands::Graph { file, waves } => cli::graph::run(&config, &file, waves, cli.json),
        Commands::Watch { dir } => cli::watch::run(&config, dir, cli.json).await,
    };

    shutdown_tracing();
    result
}
