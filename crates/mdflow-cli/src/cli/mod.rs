//! CLI command definitions for the `mdflow` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod check;
pub mod graph;
pub mod watch;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mdflow_observe::tracing_setup::LogFormat;

/// Parse, validate, and convert markdown workflow documents.
#[derive(Parser)]
#[command(name = "mdflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, env = "MDFLOW_CONFIG", default_value = "mdflow.toml")]
    pub config: PathBuf,

    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Log output format (pretty or json). Logs go to stderr.
    #[arg(long, global = true, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse and validate a document, then report issues and complexity.
    Check {
        /// Markdown workflow file.
        file: PathBuf,

        /// Parse in strict mode regardless of configuration.
        #[arg(long)]
        strict: bool,
    },

    /// Convert a document and print the workflow graph.
    Graph {
        /// Markdown workflow file.
        file: PathBuf,

        /// Print parallel execution waves instead of the full graph.
        #[arg(long)]
        waves: bool,
    },

    /// Load every workflow in a directory and reload on change until Ctrl-C.
    Watch {
        /// Directory to watch (defaults to `watch.directory` from config).
        dir: Option<PathBuf>,
    },
}
