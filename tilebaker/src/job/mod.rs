//! Build jobs.
//!
//! A [`BuildJob`] owns the coverage of one container build, tracks its
//! progress and timing samples, and drives the gather → package pipeline.
//! Flow control around each tile fetch is delegated to a [`FetchGate`].
//!
//! # Pipeline
//!
//! ```text
//! coverage regions ──► tile set (zoom, col, row) ──► gather into staging
//!                                                          │
//!          destination ◄── move ◄── tmp.mbtiles ◄── package + metadata.json
//! ```

mod build;
mod estimate;
mod gate;
mod metadata;

pub use build::{BuildJob, JobCounters, RunOutcome, STAGING_CONTAINER_NAME};
pub use estimate::{
    bytes_to_mb, format_duration, sample_count, TimingSamples, DEFAULT_MAX_SAMPLES,
    INITIAL_SAMPLE_OVERHEAD, MAX_DOWNLOAD_TIME,
};
pub use gate::{DirectGate, FetchAttempt, FetchGate, FetchPurpose};
pub use metadata::{tile_bounds, MetadataRecord, METADATA_FILE_NAME};

use crate::acquisition::TileAcquisitionService;
use crate::cache::{DiskCache, NullCache, TileCache};
use crate::config::BuilderConfig;
use crate::source::{
    format_extension, ContainerTileSource, RemoteTileSource, ReqwestClient, SourceError,
    TileSource,
};

impl BuildJob {
    /// Creates a job with the source and cache described by `config`.
    ///
    /// A configured source container selects [`ContainerTileSource`];
    /// otherwise tiles are downloaded through [`RemoteTileSource`]. The cache
    /// lives under `<cache dir>/<source namespace>/<scheme>` when enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the source container cannot be opened, the URL
    /// template is invalid, or the HTTP client cannot be created.
    pub fn from_config(config: &BuilderConfig) -> Result<Self, SourceError> {
        Self::with_source_retries(config, config.download_retries())
    }

    /// Like [`from_config`](Self::from_config), with the source retry budget
    /// used under a job controller.
    pub fn from_config_controlled(config: &BuilderConfig) -> Result<Self, SourceError> {
        Self::with_source_retries(config, config.controlled_download_retries())
    }

    fn with_source_retries(config: &BuilderConfig, retries: u32) -> Result<Self, SourceError> {
        let source = build_source(config, retries)?;
        let cache = build_cache(config, source.namespace());
        Ok(Self::new(config, TileAcquisitionService::new(source, cache)))
    }
}

fn build_source(
    config: &BuilderConfig,
    retries: u32,
) -> Result<Box<dyn TileSource>, SourceError> {
    if let Some(path) = config.source_container() {
        return Ok(Box::new(ContainerTileSource::open(path)?));
    }

    let client = ReqwestClient::with_options(config.http_timeout(), config.headers())?;
    let source = RemoteTileSource::new(client, config.url_template())?
        .with_subdomains(config.subdomains().to_vec())?
        .with_tile_size(config.tile_size())
        .with_request_delay(config.request_delay())
        .with_retries(retries)
        .with_backoff(config.backoff());
    Ok(Box::new(source))
}

fn build_cache(config: &BuilderConfig, namespace: &str) -> Box<dyn TileCache> {
    if !config.cache_enabled() {
        return Box::new(NullCache);
    }
    Box::new(DiskCache::new(
        config.cache_dir(),
        namespace,
        config.cache_scheme(),
        format_extension(&config.effective_tile_format()),
    ))
}
