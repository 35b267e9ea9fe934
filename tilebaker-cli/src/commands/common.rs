//! Common arguments and helpers shared across CLI commands.

use std::path::{Path, PathBuf};

use clap::Args;
use tilebaker::coverage::CoverageRegion;
use tilebaker::{BuilderConfig, GeoBBox};

use crate::error::CliError;

/// Inclusive zoom range given as `N` or `MIN-MAX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomRange {
    pub min: u8,
    pub max: u8,
}

/// Job settings that override the configuration file.
#[derive(Debug, Args, Default)]
pub struct JobArgs {
    /// Tile URL template, e.g. https://{s}.tile.example.com/{z}/{x}/{y}.png
    #[arg(long)]
    pub url: Option<String>,

    /// Read tiles from an existing MBTiles file instead of a tile server
    #[arg(long, conflicts_with = "url")]
    pub source_mbtiles: Option<PathBuf>,

    /// Output MBTiles path
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Region as south,west,north,east; repeatable, replaces configured coverage
    #[arg(long = "bbox", value_parser = parse_bbox, allow_hyphen_values = true)]
    pub bboxes: Vec<GeoBBox>,

    /// Zoom levels for --bbox regions, e.g. 12 or 10-14
    #[arg(long, value_parser = parse_zoom_range)]
    pub zoom: Option<ZoomRange>,

    /// Disable the tile cache for this run
    #[arg(long)]
    pub no_cache: bool,
}

/// Parses `south,west,north,east`.
pub fn parse_bbox(value: &str) -> Result<GeoBBox, String> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid number in '{}': {}", value, e))?;

    match parts.as_slice() {
        [south, west, north, east] => Ok(GeoBBox::new(*south, *west, *north, *east)),
        _ => Err(format!(
            "expected south,west,north,east but got {} values",
            parts.len()
        )),
    }
}

/// Parses `N` or `MIN-MAX`.
pub fn parse_zoom_range(value: &str) -> Result<ZoomRange, String> {
    let parse = |s: &str| {
        s.trim()
            .parse::<u8>()
            .map_err(|_| format!("invalid zoom level '{}'", s.trim()))
    };

    let (min, max) = match value.split_once('-') {
        Some((min, max)) => (parse(min)?, parse(max)?),
        None => {
            let zoom = parse(value)?;
            (zoom, zoom)
        }
    };
    if min > max {
        return Err(format!("zoom range {}-{} is reversed", min, max));
    }
    Ok(ZoomRange { min, max })
}

/// Loads the configuration file and applies command-line overrides.
///
/// An explicitly named file must exist; the default location falls back to
/// built-in defaults.
pub fn resolve_config(path: Option<&Path>, args: &JobArgs) -> Result<BuilderConfig, CliError> {
    let mut config = match path {
        Some(path) if !path.exists() => {
            return Err(CliError::Argument(format!(
                "config file not found: {}",
                path.display()
            )))
        }
        Some(path) => BuilderConfig::load_from(path)?,
        None => BuilderConfig::load()?,
    };

    if let Some(url) = &args.url {
        config = config.with_url_template(url.clone());
    }
    if let Some(source) = &args.source_mbtiles {
        config = config.with_source_container(source.clone());
    }
    if let Some(output) = &args.output {
        config = config.with_output_path(output.clone());
    }
    if args.no_cache {
        config = config.with_cache_enabled(false);
    }

    if !args.bboxes.is_empty() {
        let zoom = args
            .zoom
            .ok_or_else(|| CliError::Argument("--bbox requires --zoom".to_string()))?;
        let regions = args
            .bboxes
            .iter()
            .map(|bbox| CoverageRegion::with_zoom_range(*bbox, zoom.min, zoom.max))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CliError::Argument(e.to_string()))?;
        config = config.with_coverages(regions);
    }

    config.validate()?;
    Ok(config)
}

/// Fails when no coverage is configured.
pub fn require_coverage(config: &BuilderConfig) -> Result<(), CliError> {
    if config.coverage().is_empty() {
        return Err(CliError::Argument(
            "no coverage configured; pass --bbox and --zoom or add a [coverage] section"
                .to_string(),
        ));
    }
    Ok(())
}
