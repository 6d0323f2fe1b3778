//! grouplimit - per-group concurrency limits
//!
//! Small front end over the limiter crate: resolves limits from the
//! configuration and exercises them with concurrent workers.

mod cli;
mod error;
mod simulate;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use clap::Parser;
use grouplimit_config::Config;
use serde::Serialize;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.global.json;

    init_tracing(json_mode, cli.global.debug);

    if let Err(e) = run(cli).await {
        error!("Application error: {}", e);
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Main application logic
async fn run(cli: Cli) -> Result<(), CliError> {
    info!("Starting grouplimit v{}", env!("CARGO_PKG_VERSION"));

    // file (or defaults), then environment
    let mut config = Config::load_or_default(cli.global.config.as_deref()).await?;
    config.merge_env()?;

    match cli.command {
        Commands::Limits { groups } => show_limits(&config, &groups, cli.global.json),
        Commands::Simulate {
            workers,
            hold_ms,
            wait_ms,
            groups,
        } => {
            if workers == 0 {
                return Err(CliError::InvalidArguments(
                    "--workers must be at least 1".to_string(),
                ));
            }
            let wait = match wait_ms {
                Some(0) => None,
                Some(ms) => Some(Duration::from_millis(ms)),
                None => config.default_wait(),
            };
            let report = simulate::run(
                Arc::new(config.limiter()),
                groups,
                workers,
                Duration::from_millis(hold_ms),
                wait,
            )
            .await?;

            if cli.global.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "{} workers: {} granted, {} denied in {} ms",
                    report.workers, report.granted, report.denied, report.elapsed_ms
                );
                for peak in &report.peaks {
                    println!("  {:<24} peak {}/{}", peak.name, peak.peak, peak.limit);
                }
            }
            Ok(())
        }
    }
}

#[derive(Serialize)]
struct GroupLimit {
    name: String,
    limit: Option<usize>,
}

#[derive(Serialize)]
struct LimitsReport {
    groups: Vec<GroupLimit>,
    lowest_limit: Option<usize>,
    remaining_capacity: Option<usize>,
}

fn show_limits(config: &Config, groups: &[String], json: bool) -> Result<(), CliError> {
    let limiter = config.limiter();
    let report = LimitsReport {
        groups: groups
            .iter()
            .map(|name| GroupLimit {
                name: name.clone(),
                limit: limiter.get_limit(name),
            })
            .collect(),
        lowest_limit: limiter.lowest_limit(groups),
        remaining_capacity: limiter.remaining_capacity(groups),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let describe = |limit: Option<usize>| limit.map_or_else(|| "unlimited".to_string(), |n| n.to_string());
    for group in &report.groups {
        println!("{:<24} {}", group.name, describe(group.limit));
    }
    println!("lowest limit:       {}", describe(report.lowest_limit));
    println!("remaining capacity: {}", describe(report.remaining_capacity));
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(json_mode: bool, debug_enabled: bool) {
    let default_filter = if debug_enabled {
        "info,grouplimit=debug,grouplimit_limiter=debug"
    } else {
        "warn,grouplimit=info,grouplimit_limiter=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    if json_mode {
        // keep stdout clean for the JSON report
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .init();
    }
}
