//! `tilebaker estimate` - predict container size and download time.

use std::path::Path;
use std::sync::mpsc;

use clap::Args;
use tilebaker::job::{format_duration, DEFAULT_MAX_SAMPLES};
use tilebaker::{JobCallbacks, JobController};

use super::common::{require_coverage, resolve_config, JobArgs};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct EstimateArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Maximum number of tiles probed per region
    #[arg(long, default_value_t = DEFAULT_MAX_SAMPLES)]
    pub samples: usize,
}

/// Run the estimate command.
pub fn run(config_path: Option<&Path>, args: EstimateArgs) -> Result<(), CliError> {
    let config = resolve_config(config_path, &args.job)?;
    require_coverage(&config)?;

    let controller = JobController::from_config(&config, JobCallbacks::new())?;
    let job = controller.job();

    println!("Regions:  {}", job.coverage().len());
    println!("Tiles:    {}", job.tile_set().len());
    if let Some((min_lon, min_lat, max_lon, max_lat)) = job.bounds() {
        println!(
            "Bounds:   {:.5},{:.5},{:.5},{:.5}",
            min_lon, min_lat, max_lon, max_lat
        );
    }

    let (tx, rx) = mpsc::channel();
    let sampler = controller.estimate_size_mb(args.samples, move |mb| {
        let _ = tx.send(mb);
    })?;
    sampler
        .join()
        .map_err(|_| CliError::Controller(tilebaker::ControllerError::WorkerPanicked))?;

    match rx.try_recv() {
        Ok(mb) if mb > 0.0 => println!("Size:     ~{:.1} MB", mb),
        _ => println!("Size:     unknown (sample downloads failed)"),
    }
    println!(
        "Duration: ~{}",
        format_duration(controller.estimate_time_remaining(false))
    );
    Ok(())
}
