//! `asset-pipeline` — a thin command-line harness wiring together
//! `asset-scheduler`, `asset-fs` and `asset-loader` for manual
//! smoke-testing.

use std::path::PathBuf;

use anyhow::Result;
use asset_core::Config;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::demo::DemoCommand;
use commands::load::LoadCommand;

#[derive(Debug, Parser)]
#[command(name = "asset-pipeline", version, about = "Asset pipeline scheduler/fs/loader smoke-test harness")]
struct Cli {
    /// Verbose output (can be repeated: -v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Optional YAML config file (see `asset_core::Config`). Missing file
    /// falls back to defaults; a present-but-malformed file is an error.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Scheduler worker thread count. Overrides the config file's
    /// `scheduler.worker_threads`; 0 picks a value from available
    /// parallelism.
    #[arg(long, default_value_t = 0, global = true)]
    workers: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Load a single file through the loader and print what was read.
    Load(LoadCommand),
    /// Run Scenarios A/B end-to-end against a fresh temp directory.
    Demo(DemoCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    let configured_workers = if cli.workers != 0 { cli.workers } else { config.scheduler.worker_threads };
    let worker_threads = if configured_workers == 0 {
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    } else {
        configured_workers
    };

    match cli.command {
        Commands::Load(cmd) => cmd.run(worker_threads, config.filesystem),
        Commands::Demo(cmd) => cmd.run(worker_threads, config.filesystem),
    }
}
