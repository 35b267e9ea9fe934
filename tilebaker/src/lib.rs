//! TileBaker - raster tile acquisition, caching and MBTiles packaging.
//!
//! This library downloads map tiles covering geographic regions across a set
//! of zoom levels, caches them on disk, and bakes them into a single MBTiles
//! container. Builds run on a worker thread under a controller that supports
//! pause, resume and stop, and waits out lost connectivity.
//!
//! # Modules
//!
//! - [`coord`] - Web Mercator tile math
//! - [`coverage`] - Bounding box + zoom levels to tile sets
//! - [`source`] - Tile origins (HTTP template, existing MBTiles)
//! - [`cache`] - Persistent read-through tile cache
//! - [`acquisition`] - Cache-first tile resolution
//! - [`job`] - Build jobs: progress, estimates, gather and package
//! - [`controller`] - Worker threads and cooperative control
//! - [`package`] - MBTiles writer
//! - [`retry`] - Backoff schedule and retry loop
//! - [`config`] - Build configuration and INI loading
//! - [`logging`] - Tracing subscriber setup

pub mod acquisition;
pub mod cache;
pub mod config;
pub mod controller;
pub mod coord;
pub mod coverage;
pub mod error;
pub mod job;
pub mod logging;
pub mod package;
pub mod retry;
pub mod source;

pub use acquisition::TileAcquisitionService;
pub use config::BuilderConfig;
pub use controller::{ControllerError, JobCallbacks, JobController, ProgressSnapshot};
pub use coord::{GeoBBox, TileCoord, TileScheme};
pub use coverage::{CoverageError, CoverageRegion};
pub use error::JobError;
pub use job::{BuildJob, RunOutcome};
pub use package::ContainerPackager;
pub use source::{ContainerTileSource, RemoteTileSource, SourceError, TileSource};
