//! Command line interface definition

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// grouplimit - per-group concurrency limits
#[derive(Parser)]
#[command(name = "grouplimit")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect group limits and simulate contention against them")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global arguments available for all commands
#[derive(Parser)]
pub struct GlobalArgs {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Commands {
    /// Show resolved limits for groups
    Limits {
        /// Group names
        #[arg(required = true)]
        groups: Vec<String>,
    },

    /// Run concurrent workers that all reserve the same groups
    Simulate {
        /// Number of concurrent workers
        #[arg(short, long, default_value_t = 8)]
        workers: usize,

        /// How long each granted reservation is held, in milliseconds
        #[arg(long, default_value_t = 100)]
        hold_ms: u64,

        /// How long a worker waits for capacity (defaults to the config value)
        #[arg(long)]
        wait_ms: Option<u64>,

        /// Group names every worker reserves
        #[arg(required = true)]
        groups: Vec<String>,
    },
}
