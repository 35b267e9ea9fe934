//! `tilebaker build` - download coverage and bake the container.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use tilebaker::job::format_duration;
use tilebaker::{JobCallbacks, JobController};
use tracing::info;

use super::common::{require_coverage, resolve_config, JobArgs};
use crate::error::CliError;

#[derive(Debug, Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Replace the output file if it already exists
    #[arg(long)]
    pub overwrite: bool,
}

/// Outcome flags collected from the job callbacks.
#[derive(Default)]
struct RunReport {
    succeeded: AtomicBool,
    error: Mutex<Option<String>>,
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.enable_steady_tick(Duration::from_millis(250));
    let style = ProgressStyle::with_template(
        "{msg} ▕{wide_bar}▏ {pos}/{len} ({percent}%) {per_sec} eta {eta}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ");
    bar.set_style(style);
    bar.set_message("tiles");
    bar
}

fn callbacks(bar: &ProgressBar, report: &Arc<RunReport>) -> JobCallbacks {
    let progress_bar = bar.clone();
    let lost_bar = bar.clone();
    let success = Arc::clone(report);
    let failure = Arc::clone(report);

    JobCallbacks::new()
        .on_progress(move |fetched, total| {
            progress_bar.set_length(total);
            progress_bar.set_position(fetched);
        })
        .on_connection_lost(move || {
            lost_bar.println("Connection lost, waiting for the tile server...");
        })
        .on_success(move || success.succeeded.store(true, Ordering::SeqCst))
        .on_error(move |e| {
            if let Ok(mut slot) = failure.error.lock() {
                *slot = Some(e.to_string());
            }
        })
}

/// Run the build command.
pub fn run(config_path: Option<&Path>, args: BuildArgs) -> Result<(), CliError> {
    let config = resolve_config(config_path, &args.job)?;
    require_coverage(&config)?;

    let bar = progress_bar();
    let report = Arc::new(RunReport::default());
    let controller = Arc::new(JobController::from_config(
        &config,
        callbacks(&bar, &report),
    )?);

    let tiles = controller.job().tile_set().len();
    println!("Output:   {}", config.output_path().display());
    println!("Tiles:    {}", tiles);
    println!(
        "Estimate: {}",
        format_duration(controller.estimate_time_remaining(false))
    );
    println!();

    let stopper = Arc::clone(&controller);
    ctrlc::set_handler(move || {
        eprintln!();
        eprintln!("Received interrupt, stopping...");
        stopper.stop();
    })
    .map_err(|e| CliError::Signal(e.to_string()))?;

    // the job skips an existing output unless asked to overwrite
    let skipped = !args.overwrite && config.output_path().exists();

    info!(output = %config.output_path().display(), tiles, "Starting build");
    controller.run(args.overwrite)?;
    controller.wait()?;
    bar.finish_and_clear();

    let error = report.error.lock().ok().and_then(|slot| slot.clone());
    if let Some(message) = error {
        return Err(CliError::Build(message));
    }
    println!(
        "{}",
        completion_message(
            report.succeeded.load(Ordering::SeqCst),
            skipped,
            config.output_path()
        )
    );
    Ok(())
}

fn completion_message(succeeded: bool, skipped: bool, output: &Path) -> String {
    match (succeeded, skipped) {
        (true, true) => format!(
            "{} already exists, nothing was written (use --overwrite to rebuild)",
            output.display()
        ),
        (true, false) => format!("Container written to {}", output.display()),
        (false, _) => "Build stopped; no container was written.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_message_reports_skip() {
        let output = Path::new("kyiv.mbtiles");
        let message = completion_message(true, true, output);
        assert!(message.contains("already exists"));
        assert!(!message.contains("written to"));
    }

    #[test]
    fn test_completion_message_reports_written_container() {
        let output = Path::new("kyiv.mbtiles");
        assert_eq!(
            completion_message(true, false, output),
            "Container written to kyiv.mbtiles"
        );
        assert!(completion_message(false, false, output).starts_with("Build stopped"));
    }
}
