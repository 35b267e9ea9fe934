//! Tile build job.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rand::seq::IndexedRandom;
use tracing::{debug, info, warn};

use super::estimate::{bytes_to_mb, sample_count, TimingSamples, INITIAL_SAMPLE_OVERHEAD};
use super::gate::{FetchGate, FetchPurpose};
use super::metadata::{MetadataRecord, METADATA_FILE_NAME};
use crate::acquisition::TileAcquisitionService;
use crate::cache::{tile_path, write_atomic, CacheError};
use crate::config::BuilderConfig;
use crate::coord::{GeoBBox, TileCoord, TileScheme};
use crate::coverage::{CoverageError, CoverageRegion};
use crate::error::JobError;
use crate::package::{journal_path, remove_container, ContainerPackager};
use crate::source::{format_extension, SourceError};

/// Name of the container built inside the staging directory.
pub const STAGING_CONTAINER_NAME: &str = "tmp.mbtiles";

/// Outcome of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The destination already existed and overwriting was not requested.
    Skipped,
    /// The container was built and moved into place.
    Built {
        /// Tiles written to the container.
        tiles: u64,
        /// Tiles skipped because of ignored per-tile errors.
        skipped: u64,
    },
}

/// Settings of a job that do not change between runs.
#[derive(Debug, Clone)]
struct JobSettings {
    output_path: PathBuf,
    staging_dir: PathBuf,
    tile_format: String,
    extension: String,
    staging_scheme: TileScheme,
    attribution: Option<String>,
    ignore_errors: bool,
}

/// Snapshot of a job's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobCounters {
    pub fetched: u64,
    pub total: u64,
}

/// A tile build: coverage, acquisition, progress and packaging.
///
/// All methods take `&self`; the job is shared between the run worker and
/// estimation workers. Counters and timing samples are written only by the
/// tile fetch path.
pub struct BuildJob {
    settings: JobSettings,
    acquisition: TileAcquisitionService,
    coverage: RwLock<Vec<CoverageRegion>>,
    fetched: AtomicU64,
    total: AtomicU64,
    timings: Mutex<TimingSamples>,
}

impl BuildJob {
    /// Creates a job from a configuration and an acquisition service.
    pub fn new(config: &BuilderConfig, acquisition: TileAcquisitionService) -> Self {
        let tile_format = config.effective_tile_format();
        let stem = config
            .output_path()
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tiles".to_string());

        let settings = JobSettings {
            output_path: config.output_path().to_path_buf(),
            staging_dir: config.staging_dir().join(stem),
            extension: format_extension(&tile_format),
            tile_format,
            staging_scheme: config.cache_scheme(),
            attribution: config
                .attribution()
                .filter(|_| config.use_attribution())
                .map(str::to_string),
            ignore_errors: config.ignore_errors(),
        };

        Self {
            settings,
            acquisition,
            coverage: RwLock::new(config.coverage().to_vec()),
            fetched: AtomicU64::new(0),
            total: AtomicU64::new(0),
            timings: Mutex::new(TimingSamples::seeded(
                config.request_delay() + INITIAL_SAMPLE_OVERHEAD,
            )),
        }
    }

    // =========================================================================
    // Coverage
    // =========================================================================

    /// Adds a coverage region.
    pub fn add_coverage(
        &self,
        bbox: GeoBBox,
        zoom_levels: impl IntoIterator<Item = u8>,
    ) -> Result<(), CoverageError> {
        let region = CoverageRegion::new(bbox, zoom_levels)?;
        self.coverage.write().push(region);
        Ok(())
    }

    /// Replaces all coverage with a single region.
    pub fn set_coverage(
        &self,
        bbox: GeoBBox,
        zoom_levels: impl IntoIterator<Item = u8>,
    ) -> Result<(), CoverageError> {
        let region = CoverageRegion::new(bbox, zoom_levels)?;
        *self.coverage.write() = vec![region];
        Ok(())
    }

    pub fn clear_coverage(&self) {
        self.coverage.write().clear();
    }

    pub fn coverage(&self) -> Vec<CoverageRegion> {
        self.coverage.read().clone()
    }

    /// Union of the covered zoom levels, ascending.
    pub fn zoom_levels(&self) -> BTreeSet<u8> {
        zoom_levels_of(&self.coverage.read())
    }

    /// Smallest box containing every coverage region.
    pub fn covered_bbox(&self) -> Option<GeoBBox> {
        covered_bbox_of(&self.coverage.read())
    }

    /// Union of all regions' tiles.
    pub fn tile_set(&self) -> BTreeSet<TileCoord> {
        tile_set_of(&self.coverage.read())
    }

    /// Extent of the lowest zoom's tiles as `(min_lon, min_lat, max_lon, max_lat)`.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        super::metadata::tile_bounds(&self.tile_set())
    }

    // =========================================================================
    // Progress and estimates
    // =========================================================================

    pub fn counters(&self) -> JobCounters {
        JobCounters {
            fetched: self.fetched.load(Ordering::Acquire),
            total: self.total.load(Ordering::Acquire),
        }
    }

    /// Expected time to fetch `remaining` tiles.
    ///
    /// `remaining` defaults to `total - fetched`, where `total` is the
    /// current run's tile count or, when idle, the projected count. With
    /// `reset` the timing samples are cleared afterwards.
    pub fn average_download_time(&self, remaining: Option<u64>, reset: bool) -> Duration {
        let remaining = remaining.unwrap_or_else(|| {
            let counters = self.counters();
            let total = if counters.total > 0 {
                counters.total
            } else {
                self.projected_tile_count()
            };
            total.saturating_sub(counters.fetched)
        });

        let mut timings = self.timings.lock();
        let estimate = timings.estimate(remaining);
        if reset {
            timings.clear();
        }
        estimate
    }

    /// Number of tiles the current coverage would gather.
    fn projected_tile_count(&self) -> u64 {
        self.tile_set().len() as u64
    }

    /// Approximate container size of one region in megabytes.
    ///
    /// Fetches a random sample of the region's tiles (not counted as
    /// progress), averages their size and scales by the tile count.
    pub fn approximate_size_mb(
        &self,
        region: &CoverageRegion,
        max_samples: usize,
        gate: &dyn FetchGate,
    ) -> Result<f64, JobError> {
        let tiles: Vec<TileCoord> = region.tiles().into_iter().collect();
        if tiles.is_empty() {
            return Ok(0.0);
        }

        let count = sample_count(tiles.len(), max_samples);
        let sample: Vec<TileCoord> = {
            let mut rng = rand::rng();
            tiles.choose_multiple(&mut rng, count).copied().collect()
        };

        let mut sizes = Vec::with_capacity(sample.len());
        for tile in &sample {
            match self.fetch_tile(tile, FetchPurpose::Sample, gate) {
                Ok(data) if !data.is_empty() => sizes.push(data.len() as f64),
                Ok(_) => {}
                Err(e) if self.is_ignorable(&e) => {
                    warn!(tile = %tile, error = %e, "Ignoring failed sample");
                }
                Err(e) => return Err(e),
            }
        }

        if sizes.is_empty() {
            return Ok(0.0);
        }
        let mean = sizes.iter().sum::<f64>() / sizes.len() as f64;
        Ok(bytes_to_mb(mean * tiles.len() as f64))
    }

    /// Sum of [`approximate_size_mb`](Self::approximate_size_mb) over all regions.
    pub fn approximate_size_mb_full(
        &self,
        max_samples: usize,
        gate: &dyn FetchGate,
    ) -> Result<f64, JobError> {
        let mut total = 0.0;
        for region in self.coverage() {
            total += self.approximate_size_mb(&region, max_samples, gate)?;
        }
        Ok(total)
    }

    // =========================================================================
    // Run
    // =========================================================================

    pub fn output_path(&self) -> &Path {
        &self.settings.output_path
    }

    /// Per-output staging directory, `<staging root>/<output stem>`.
    pub fn staging_dir(&self) -> &Path {
        &self.settings.staging_dir
    }

    pub fn tile_format(&self) -> &str {
        &self.settings.tile_format
    }

    /// Removes every cached tile.
    pub fn clear_cache(&self) -> Result<(), CacheError> {
        self.acquisition.cache().clear()
    }

    /// Builds the container.
    ///
    /// Does nothing when the destination exists and `overwrite` is false.
    /// Otherwise gathers every tile in `(zoom, col, row)` order into the
    /// staging directory, writes the metadata record, packages and moves the
    /// result into place. Staging is cleaned and counters reset on every exit
    /// path; on failure the destination is left untouched.
    pub fn run(&self, overwrite: bool, gate: &dyn FetchGate) -> Result<RunOutcome, JobError> {
        let result = self.run_inner(overwrite, gate);
        self.clean_run();
        result
    }

    fn run_inner(&self, overwrite: bool, gate: &dyn FetchGate) -> Result<RunOutcome, JobError> {
        let output = &self.settings.output_path;
        if output.exists() {
            if !overwrite {
                info!(path = %output.display(), "Container already exists, nothing to do");
                return Ok(RunOutcome::Skipped);
            }
            warn!(path = %output.display(), "Container exists and will be overwritten");
        }

        self.clean_run();

        // coverage may change through `&self` while the run is in progress
        let coverage = self.coverage();
        let tiles = tile_set_of(&coverage);
        let total = tiles.len() as u64;
        if total == 0 {
            return Err(JobError::EmptyCoverage);
        }
        self.total.store(total, Ordering::Release);
        info!(tiles = total, staging = %self.settings.staging_dir.display(), "Gathering tiles");

        let staging = &self.settings.staging_dir;
        fs::create_dir_all(staging).map_err(|e| JobError::io(staging, e))?;

        let mut skipped = 0u64;
        for tile in &tiles {
            if !self.gather(tile, gate)? {
                skipped += 1;
            }
        }

        let metadata = MetadataRecord::compute(
            &self.settings.tile_format,
            &zoom_levels_of(&coverage),
            &covered_bbox_of(&coverage).ok_or(JobError::EmptyCoverage)?,
            &tiles,
            self.settings.attribution.as_deref(),
        )
        .ok_or(JobError::EmptyCoverage)?;
        let metadata_path = staging.join(METADATA_FILE_NAME);
        metadata.write_to(&metadata_path)?;

        info!(path = %output.display(), "Building container");
        let temp_container = staging.join(STAGING_CONTAINER_NAME);
        let stats = ContainerPackager::new(self.settings.staging_scheme).package(
            staging,
            &metadata_path,
            &temp_container,
        )?;

        let overwritten = output.exists();
        move_into_place(&temp_container, output)?;
        if overwritten {
            warn!(path = %output.display(), "Container was overwritten");
        }
        info!(path = %output.display(), tiles = stats.tiles, skipped, "Container built");

        Ok(RunOutcome::Built {
            tiles: stats.tiles,
            skipped,
        })
    }

    /// Fetches one tile into staging. Returns false when it was skipped.
    fn gather(&self, tile: &TileCoord, gate: &dyn FetchGate) -> Result<bool, JobError> {
        let data = match self.fetch_tile(tile, FetchPurpose::Gather, gate) {
            Ok(data) => data,
            Err(e) if self.is_ignorable(&e) => {
                warn!(tile = %tile, error = %e, "Skipping tile");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        let path = tile_path(
            &self.settings.staging_dir,
            tile,
            self.settings.staging_scheme,
            &self.settings.extension,
        );
        write_atomic(&path, &data)?;

        let fetched = self.fetched.fetch_add(1, Ordering::AcqRel) + 1;
        let total = self.total.load(Ordering::Acquire);
        debug!(tile = %tile, fetched, total, "Gathered tile");
        gate.gathered(fetched, total);
        Ok(true)
    }

    /// Runs one tile fetch through the gate, recording timing samples.
    fn fetch_tile(
        &self,
        tile: &TileCoord,
        purpose: FetchPurpose,
        gate: &dyn FetchGate,
    ) -> Result<Vec<u8>, JobError> {
        gate.fetch(purpose, tile, &mut || {
            let started = Instant::now();
            let result = self.acquisition.fetch(tile);
            let mut timings = self.timings.lock();
            match &result {
                Ok(_) => timings.push(started.elapsed()),
                Err(_) => timings.push_failure(),
            }
            result
        })
    }

    /// Per-tile failures that `ignore_errors` allows to skip.
    fn is_ignorable(&self, error: &JobError) -> bool {
        self.settings.ignore_errors
            && matches!(
                error.source_error(),
                Some(SourceError::Extraction(_)) | Some(SourceError::Download { status: Some(_), .. })
            )
    }

    /// Removes staging (and its parent when empty) and the destination's
    /// journal, and resets the counters.
    fn clean_run(&self) {
        let staging = &self.settings.staging_dir;
        debug!(dir = %staging.display(), "Cleaning staging directory");
        match fs::remove_dir_all(staging) {
            Ok(()) => {
                if let Some(parent) = staging.parent() {
                    // only succeeds when empty
                    let _ = fs::remove_dir(parent);
                }
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(dir = %staging.display(), error = %e, "Failed to clean staging"),
        }

        let journal = journal_path(&self.settings.output_path);
        if let Err(e) = fs::remove_file(&journal) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %journal.display(), error = %e, "Failed to remove journal");
            }
        }

        self.fetched.store(0, Ordering::Release);
        self.total.store(0, Ordering::Release);
    }
}

fn zoom_levels_of(coverage: &[CoverageRegion]) -> BTreeSet<u8> {
    coverage
        .iter()
        .flat_map(|r| r.zoom_levels().iter().copied())
        .collect()
}

fn covered_bbox_of(coverage: &[CoverageRegion]) -> Option<GeoBBox> {
    coverage
        .iter()
        .map(|r| *r.bbox())
        .reduce(|a, b| a.union(&b))
}

fn tile_set_of(coverage: &[CoverageRegion]) -> BTreeSet<TileCoord> {
    let mut tiles = BTreeSet::new();
    for region in coverage {
        region.extend_tiles(&mut tiles);
    }
    tiles
}

/// Moves the built container to its destination.
///
/// A rename is tried first. When that fails (for example across file
/// systems) the file is copied next to the destination and renamed over it,
/// so an existing destination is only replaced by a complete file.
fn move_into_place(from: &Path, to: &Path) -> Result<(), JobError> {
    if let Some(parent) = to.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| JobError::io(parent, e))?;
    }

    if fs::rename(from, to).is_ok() {
        return Ok(());
    }

    let mut partial_name = to.as_os_str().to_owned();
    partial_name.push(".partial");
    let partial = PathBuf::from(partial_name);

    let copied = fs::copy(from, &partial).and_then(|_| fs::rename(&partial, to));
    if let Err(e) = copied {
        remove_container(&partial);
        return Err(JobError::io(to, e));
    }
    let _ = fs::remove_file(from);
    Ok(())
}
