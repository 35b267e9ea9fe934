//! Cooperative job controller.
//!
//! [`JobController`] runs a [`BuildJob`] on a worker thread and exposes a
//! non-blocking control surface:
//!
//! ```text
//! IDLE ──run──► RUNNING ──(stop | success | failure)──► IDLE
//!                  │  ▲
//!               pause resume
//!                  ▼  │
//!                 PAUSED
//! ```
//!
//! Only one run is active at a time. Size estimates run on their own workers:
//! while a run is active they share its signals, otherwise each sampler gets
//! a private signal set that [`JobController::stop`] still reaches.
//!
//! # Example
//!
//! ```ignore
//! use tilebaker::config::BuilderConfig;
//! use tilebaker::controller::{JobCallbacks, JobController};
//!
//! let config = BuilderConfig::load()?;
//! let callbacks = JobCallbacks::new()
//!     .on_progress(|fetched, total| println!("{}/{}", fetched, total))
//!     .on_final(|| println!("finished"));
//!
//! let controller = JobController::from_config(&config, callbacks)?;
//! controller.run(false)?;
//! controller.wait()?;
//! ```

mod callbacks;
mod gate;
mod signals;

pub use callbacks::{ErrorCallback, JobCallbacks, NotifyCallback, ProgressCallback};
pub use signals::ControlSignals;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{error, info, warn};

use self::gate::ControlledGate;
use crate::cache::CacheError;
use crate::config::{BuilderConfig, ConfigError};
use crate::job::{BuildJob, RunOutcome};
use crate::retry::Backoff;
use crate::source::SourceError;

/// Errors returned by the control surface.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The configuration is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The tile source could not be created
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Clearing the cache failed
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// The operation is refused while a run or sampler is active
    #[error("A run or size estimate is in progress")]
    WorkerActive,

    /// A worker thread could not be started
    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// A worker thread panicked
    #[error("Worker thread panicked")]
    WorkerPanicked,
}

/// Point-in-time view of a job's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub fetched: u64,
    pub total: u64,
    pub is_running: bool,
    pub is_paused: bool,
}

/// State shared with worker threads.
struct Shared {
    job: BuildJob,
    callbacks: JobCallbacks,
    signals: Arc<ControlSignals>,
    backoff: Backoff,
    wait_connection: bool,
    samplers: Mutex<Vec<Weak<ControlSignals>>>,
    active_samplers: AtomicUsize,
}

impl Shared {
    fn poll_interval(&self) -> Duration {
        self.backoff.unit / 2
    }

    fn run_worker(&self, overwrite: bool) {
        let _guard = RunGuard(self);
        let gate = ControlledGate::new(
            &self.signals,
            &self.callbacks,
            &self.backoff,
            self.wait_connection,
        );

        match self.job.run(overwrite, &gate) {
            Ok(RunOutcome::Skipped) => {
                info!("Run skipped, container already present");
                self.callbacks.success();
            }
            Ok(RunOutcome::Built { tiles, skipped }) => {
                info!(tiles, skipped, "Run succeeded");
                self.callbacks.success();
            }
            Err(e) if e.is_cancelled() => info!("Run stopped"),
            Err(e) => {
                error!(error = %e, "Run failed");
                self.callbacks.error(&e);
            }
        }
    }

    fn prune_samplers(&self) {
        self.samplers.lock().retain(|s| s.strong_count() > 0);
    }
}

/// Returns the signals to idle and fires `on_final` when a run worker ends,
/// also when a callback panicked.
struct RunGuard<'a>(&'a Shared);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.signals.finish_run();
        if thread::panicking() {
            // a second panic while unwinding aborts the process
            let finished = panic::catch_unwind(AssertUnwindSafe(|| self.0.callbacks.finished()));
            if finished.is_err() {
                error!("on_final callback panicked");
            }
        } else {
            self.0.callbacks.finished();
        }
    }
}

/// Decrements the active sampler count when a sampler worker ends.
struct SamplerGuard(Arc<Shared>);

impl Drop for SamplerGuard {
    fn drop(&mut self) {
        self.0.active_samplers.fetch_sub(1, Ordering::AcqRel);
        self.0.prune_samplers();
    }
}

/// Runs a [`BuildJob`] on worker threads with pause/resume/stop control.
pub struct JobController {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl JobController {
    /// Wraps an existing job.
    pub fn new(config: &BuilderConfig, job: BuildJob, callbacks: JobCallbacks) -> Self {
        let backoff = config.backoff();
        let signals = Arc::new(ControlSignals::new(backoff.unit / 2));
        Self {
            shared: Arc::new(Shared {
                job,
                callbacks,
                signals,
                backoff,
                wait_connection: config.wait_connection(),
                samplers: Mutex::new(Vec::new()),
                active_samplers: AtomicUsize::new(0),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Validates `config` and builds the job with its configured source and
    /// cache.
    ///
    /// Unless set explicitly, the source does not retry on its own; failed
    /// downloads are retried by the controller so that stop and pause stay
    /// responsive.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the tile source
    /// cannot be created.
    pub fn from_config(
        config: &BuilderConfig,
        callbacks: JobCallbacks,
    ) -> Result<Self, ControllerError> {
        config.validate()?;
        let job = BuildJob::from_config_controlled(config)?;
        Ok(Self::new(config, job, callbacks))
    }

    /// The controlled job, for coverage management and queries.
    pub fn job(&self) -> &BuildJob {
        &self.shared.job
    }

    /// Starts a run on a worker thread.
    ///
    /// Returns `Ok(false)` without doing anything when a run is already
    /// active.
    pub fn run(&self, overwrite: bool) -> Result<bool, ControllerError> {
        if !self.shared.signals.try_begin_run() {
            warn!("Run requested while another run is active");
            return Ok(false);
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("tilebaker-run".to_string())
            .spawn(move || shared.run_worker(overwrite));

        match spawned {
            Ok(handle) => {
                *self.worker.lock() = Some(handle);
                Ok(true)
            }
            Err(e) => {
                self.shared.signals.finish_run();
                Err(ControllerError::Spawn(e))
            }
        }
    }

    pub fn pause(&self) {
        self.shared.signals.pause();
    }

    pub fn resume(&self) {
        self.shared.signals.resume();
    }

    /// Stops the active run and every size sampler.
    pub fn stop(&self) {
        self.shared.signals.stop();
        for sampler in self.shared.samplers.lock().iter() {
            if let Some(signals) = sampler.upgrade() {
                signals.stop();
            }
        }
    }

    /// Estimates the container size on a worker thread.
    ///
    /// `callback` receives the estimate in megabytes, or 0 when a download
    /// failed. It is not called when the estimate is stopped.
    pub fn estimate_size_mb(
        &self,
        max_samples: usize,
        callback: impl FnOnce(f64) + Send + 'static,
    ) -> Result<JoinHandle<()>, ControllerError> {
        let shared = Arc::clone(&self.shared);
        let signals = if shared.signals.is_running() {
            Arc::clone(&shared.signals)
        } else {
            let private = Arc::new(ControlSignals::new(shared.poll_interval()));
            shared.samplers.lock().push(Arc::downgrade(&private));
            private
        };

        shared.active_samplers.fetch_add(1, Ordering::AcqRel);
        let guard = SamplerGuard(Arc::clone(&shared));

        thread::Builder::new()
            .name("tilebaker-sampler".to_string())
            .spawn(move || {
                let _guard = guard;
                let gate = ControlledGate::new(
                    &signals,
                    &shared.callbacks,
                    &shared.backoff,
                    shared.wait_connection,
                );
                match shared.job.approximate_size_mb_full(max_samples, &gate) {
                    Ok(mb) => {
                        info!(size_mb = mb, "Size estimate complete");
                        callback(mb);
                    }
                    Err(e) if e.is_cancelled() => info!("Size estimate stopped"),
                    Err(e) => {
                        warn!(error = %e, "Size estimate failed");
                        callback(0.0);
                    }
                }
            })
            .map_err(ControllerError::Spawn)
    }

    /// Expected time to fetch the remaining tiles.
    pub fn estimate_time_remaining(&self, reset: bool) -> Duration {
        self.shared.job.average_download_time(None, reset)
    }

    /// Removes every cached tile.
    ///
    /// # Errors
    ///
    /// [`ControllerError::WorkerActive`] while a run or size estimate is in
    /// progress.
    pub fn clear_cache(&self) -> Result<(), ControllerError> {
        if self.shared.signals.is_running()
            || self.shared.active_samplers.load(Ordering::Acquire) > 0
        {
            return Err(ControllerError::WorkerActive);
        }
        self.shared.job.clear_cache()?;
        info!("Cache cleared");
        Ok(())
    }

    /// Blocks until the current run worker has finished.
    pub fn wait(&self) -> Result<(), ControllerError> {
        let handle = self.worker.lock().take();
        match handle {
            Some(handle) => handle.join().map_err(|_| ControllerError::WorkerPanicked),
            None => Ok(()),
        }
    }

    pub fn progress(&self) -> ProgressSnapshot {
        let counters = self.shared.job.counters();
        ProgressSnapshot {
            fetched: counters.fetched,
            total: counters.total,
            is_running: self.shared.signals.is_running(),
            is_paused: self.shared.signals.is_paused(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.signals.is_running()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::TileAcquisitionService;
    use crate::cache::{DiskCache, NullCache};
    use crate::coord::{GeoBBox, TileCoord, TileScheme};
    use crate::source::TileSource;
    use std::sync::mpsc;
    use tempfile::TempDir;

    /// Source that blocks each fetch for a fixed time.
    struct SlowSource {
        delay: Duration,
    }

    impl TileSource for SlowSource {
        fn fetch(&self, tile: &TileCoord) -> Result<Vec<u8>, SourceError> {
            thread::sleep(self.delay);
            Ok(vec![tile.zoom; 4])
        }

        fn name(&self) -> &str {
            "slow"
        }

        fn namespace(&self) -> &str {
            "slow"
        }
    }

    fn config(temp: &TempDir) -> BuilderConfig {
        BuilderConfig::new()
            .with_time_unit(Duration::from_millis(20))
            .with_staging_dir(temp.path().join("staging"))
            .with_output_path(temp.path().join("out.mbtiles"))
    }

    fn controller(temp: &TempDir, delay: Duration, callbacks: JobCallbacks) -> JobController {
        let config = config(temp);
        let acquisition =
            TileAcquisitionService::new(Box::new(SlowSource { delay }), Box::new(NullCache));
        let job = BuildJob::new(&config, acquisition);
        job.add_coverage(GeoBBox::new(-85.0, -180.0, 85.0, 180.0), [0, 1, 2])
            .unwrap();
        JobController::new(&config, job, callbacks)
    }

    #[test]
    fn test_second_run_is_refused() {
        let temp = TempDir::new().unwrap();
        let controller = controller(&temp, Duration::from_millis(20), JobCallbacks::new());

        assert!(controller.run(false).unwrap());
        assert!(!controller.run(false).unwrap());
        controller.stop();
        controller.wait().unwrap();
        assert!(!controller.is_running());
    }

    #[test]
    fn test_success_then_final() {
        let temp = TempDir::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let callbacks = {
            let (s, f) = (tx.clone(), tx);
            JobCallbacks::new()
                .on_success(move || s.send("success").unwrap())
                .on_final(move || f.send("final").unwrap())
        };
        let controller = controller(&temp, Duration::ZERO, callbacks);

        controller.run(false).unwrap();
        controller.wait().unwrap();

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events, vec!["success", "final"]);
        assert!(temp.path().join("out.mbtiles").is_file());
        assert_eq!(controller.progress(), ProgressSnapshot::default());
    }

    #[test]
    fn test_panicking_callback_leaves_controller_idle() {
        let temp = TempDir::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let callbacks = JobCallbacks::new()
            .on_success(|| panic!("callback failure"))
            .on_final(move || tx.send("final").unwrap());
        let controller = controller(&temp, Duration::ZERO, callbacks);

        controller.run(false).unwrap();
        assert!(matches!(
            controller.wait(),
            Err(ControllerError::WorkerPanicked)
        ));

        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec!["final"]);
        assert!(!controller.is_running());
        controller.clear_cache().unwrap();
        assert!(controller.run(true).unwrap());
        assert!(controller.wait().is_err());
    }

    #[test]
    fn test_pause_holds_progress() {
        let temp = TempDir::new().unwrap();
        let controller = controller(&temp, Duration::from_millis(5), JobCallbacks::new());

        controller.run(false).unwrap();
        controller.pause();
        thread::sleep(Duration::from_millis(30));
        let paused = controller.progress();
        assert!(paused.is_paused);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(controller.progress().fetched, paused.fetched);

        controller.resume();
        controller.wait().unwrap();
        assert!(temp.path().join("out.mbtiles").is_file());
    }

    #[test]
    fn test_clear_cache_refused_while_running() {
        let temp = TempDir::new().unwrap();
        let config = config(&temp);
        let cache_dir = temp.path().join("cache");
        let acquisition = TileAcquisitionService::new(
            Box::new(SlowSource {
                delay: Duration::from_millis(20),
            }),
            Box::new(DiskCache::new(&cache_dir, "slow", TileScheme::Tms, "png")),
        );
        let job = BuildJob::new(&config, acquisition);
        job.add_coverage(GeoBBox::new(-85.0, -180.0, 85.0, 180.0), [0, 1, 2])
            .unwrap();
        let controller = JobController::new(&config, job, JobCallbacks::new());

        controller.run(false).unwrap();
        assert!(matches!(
            controller.clear_cache(),
            Err(ControllerError::WorkerActive)
        ));
        controller.stop();
        controller.wait().unwrap();

        controller.clear_cache().unwrap();
        assert!(!cache_dir.exists());
    }

    #[test]
    fn test_idle_estimate_reports_size() {
        let temp = TempDir::new().unwrap();
        let controller = controller(&temp, Duration::ZERO, JobCallbacks::new());
        let (tx, rx) = mpsc::channel();

        controller
            .estimate_size_mb(20, move |mb| tx.send(mb).unwrap())
            .unwrap()
            .join()
            .unwrap();

        let mb = rx.recv().unwrap();
        assert!((mb - crate::job::bytes_to_mb(21.0 * 4.0)).abs() < 1e-12);
    }

    #[test]
    fn test_stop_reaches_idle_sampler() {
        let temp = TempDir::new().unwrap();
        let controller = controller(&temp, Duration::from_millis(100), JobCallbacks::new());
        let (tx, rx) = mpsc::channel();

        let handle = controller
            .estimate_size_mb(20, move |mb| tx.send(mb).unwrap())
            .unwrap();
        thread::sleep(Duration::from_millis(30));
        controller.stop();
        handle.join().unwrap();

        assert!(rx.try_recv().is_err(), "no callback after stop");
        // the sampler's signals were private; the controller can still run
        assert!(controller.run(false).unwrap());
        controller.stop();
        controller.wait().unwrap();
    }

    #[test]
    fn test_estimate_time_remaining_uses_projection_when_idle() {
        let temp = TempDir::new().unwrap();
        let controller = controller(&temp, Duration::ZERO, JobCallbacks::new());
        // seeded with 0.25 s + 0.15 s, 21 tiles projected
        let eta = controller.estimate_time_remaining(false);
        assert!((eta.as_secs_f64() - 0.4 * 21.0).abs() < 1e-6);
    }
}
