//! Cache management CLI commands.

use std::path::Path;

use clap::Subcommand;
use tilebaker::{JobCallbacks, JobController};

use super::common::{resolve_config, JobArgs};
use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Clear the tile cache, removing all cached tiles
    Clear {
        #[command(flatten)]
        job: JobArgs,
    },
}

/// Run a cache subcommand.
pub fn run(config_path: Option<&Path>, action: CacheAction) -> Result<(), CliError> {
    match action {
        CacheAction::Clear { job } => {
            let config = resolve_config(config_path, &job)?;
            println!("Clearing tile cache at: {}", config.cache_dir().display());

            let controller = JobController::from_config(&config, JobCallbacks::new())?;
            controller.clear_cache()?;
            println!("Cache cleared");
            Ok(())
        }
    }
}
