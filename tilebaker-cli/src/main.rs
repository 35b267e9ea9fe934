//! TileBaker CLI - Command-line interface
//!
//! Downloads map tiles for one or more regions and bakes them into an
//! MBTiles file.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tilebaker::logging::{default_log_dir, init_logging, DEFAULT_LOG_FILE};

use commands::build::BuildArgs;
use commands::cache::CacheAction;
use commands::estimate::EstimateArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "tilebaker")]
#[command(version)]
#[command(about = "Download map tiles and bake them into MBTiles", long_about = None)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Directory for the log file
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the configured coverage and build the container
    Build(BuildArgs),
    /// Estimate the container size and download time
    Estimate(EstimateArgs),
    /// Manage the tile cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_dir = cli.log_dir.clone().unwrap_or_else(default_log_dir);
    let _logging_guard = match init_logging(&log_dir, DEFAULT_LOG_FILE, &cli.log_level) {
        Ok(guard) => guard,
        Err(e) => CliError::LoggingInit(e.to_string()).exit(),
    };

    let config_path = cli.config.as_deref();
    let result = match cli.command {
        Commands::Build(args) => commands::build::run(config_path, args),
        Commands::Estimate(args) => commands::estimate::run(config_path, args),
        Commands::Cache { action } => commands::cache::run(config_path, action),
    };

    if let Err(e) = result {
        e.exit();
    }
}
