//! Coverage projection.
//!
//! A [`CoverageRegion`] pairs a geographic bounding box with a set of zoom
//! levels. Projecting it yields the set of tiles (XYZ) that intersect the box
//! at each level. Regions are validated when they are constructed, so every
//! region held by a job is known to be well formed.

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use crate::coord::{project, tiles_per_side, GeoBBox, TileCoord, MAX_ZOOM};

/// Errors raised while registering a coverage region.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoverageError {
    /// The bounding box is malformed.
    #[error("Invalid coverage {bbox}: {reason}")]
    InvalidBounds { bbox: GeoBBox, reason: String },

    /// No zoom levels were given.
    #[error("Coverage has no zoom levels")]
    NoZoomLevels,

    /// A zoom level is beyond the supported range.
    #[error("Zoom level {0} exceeds maximum {max}", max = MAX_ZOOM)]
    InvalidZoom(u8),
}

/// A bounding box plus the zoom levels to acquire inside it.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageRegion {
    bbox: GeoBBox,
    zoom_levels: BTreeSet<u8>,
}

impl CoverageRegion {
    /// Creates a validated coverage region.
    ///
    /// Fails when south ≥ north, west ≥ east, any coordinate is outside
    /// `[-180, 180]` / `[-90, 90]` or not finite, or the zoom set is empty or
    /// exceeds [`MAX_ZOOM`].
    pub fn new(
        bbox: GeoBBox,
        zoom_levels: impl IntoIterator<Item = u8>,
    ) -> Result<Self, CoverageError> {
        validate_bbox(&bbox)?;

        let zoom_levels: BTreeSet<u8> = zoom_levels.into_iter().collect();
        if zoom_levels.is_empty() {
            return Err(CoverageError::NoZoomLevels);
        }
        if let Some(&zoom) = zoom_levels.iter().find(|&&z| z > MAX_ZOOM) {
            return Err(CoverageError::InvalidZoom(zoom));
        }

        Ok(Self { bbox, zoom_levels })
    }

    /// Convenience constructor for an inclusive zoom range.
    pub fn with_zoom_range(bbox: GeoBBox, min_zoom: u8, max_zoom: u8) -> Result<Self, CoverageError> {
        Self::new(bbox, min_zoom..=max_zoom)
    }

    pub fn bbox(&self) -> &GeoBBox {
        &self.bbox
    }

    pub fn zoom_levels(&self) -> &BTreeSet<u8> {
        &self.zoom_levels
    }

    /// Projects the region to its tile set.
    pub fn tiles(&self) -> BTreeSet<TileCoord> {
        let mut tiles = BTreeSet::new();
        self.extend_tiles(&mut tiles);
        tiles
    }

    /// Adds the region's tiles to an existing set.
    ///
    /// Identical coordinates are produced for overlapping regions, so a union
    /// built this way holds each shared tile once.
    pub fn extend_tiles(&self, tiles: &mut BTreeSet<TileCoord>) {
        for &zoom in &self.zoom_levels {
            let (cols, rows) = self.tile_ranges(zoom);
            for col in cols.clone() {
                for row in rows.clone() {
                    tiles.insert(TileCoord {
                        zoom,
                        col: col as u32,
                        row: row as u32,
                    });
                }
            }
        }
    }

    /// Number of tiles the region covers, computed without enumerating them.
    pub fn tile_count(&self) -> u64 {
        self.zoom_levels
            .iter()
            .map(|&zoom| {
                let (cols, rows) = self.tile_ranges(zoom);
                (cols.end - cols.start) * (rows.end - rows.start)
            })
            .sum()
    }

    /// Column and row ranges (exclusive ends) at one zoom level.
    fn tile_ranges(&self, zoom: u8) -> (std::ops::Range<u64>, std::ops::Range<u64>) {
        let max = tiles_per_side(zoom) as f64;
        // north-west corner gives the smallest column/row
        let (x0, y0) = project(self.bbox.north, self.bbox.west, zoom);
        let (x1, y1) = project(self.bbox.south, self.bbox.east, zoom);

        let clip = |v: f64| v.clamp(0.0, max) as u64;
        let cols = clip(x0.floor())..clip(x1.ceil());
        let rows = clip(y0.floor())..clip(y1.ceil());
        (cols, rows)
    }
}

impl fmt::Display for CoverageRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let zooms: Vec<String> = self.zoom_levels.iter().map(|z| z.to_string()).collect();
        write!(f, "{} @ z[{}]", self.bbox, zooms.join(","))
    }
}

fn validate_bbox(bbox: &GeoBBox) -> Result<(), CoverageError> {
    let invalid = |reason: &str| CoverageError::InvalidBounds {
        bbox: *bbox,
        reason: reason.to_string(),
    };

    let values = [bbox.south, bbox.west, bbox.north, bbox.east];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(invalid("coordinates must be finite"));
    }
    if bbox.west.abs() > 180.0 || bbox.east.abs() > 180.0 {
        return Err(invalid("longitude exceeds [-180, 180]"));
    }
    if bbox.south.abs() > 90.0 || bbox.north.abs() > 90.0 {
        return Err(invalid("latitude exceeds [-90, 90]"));
    }
    if bbox.south >= bbox.north {
        return Err(invalid("south must be less than north"));
    }
    if bbox.west >= bbox.east {
        return Err(invalid("west must be less than east"));
    }
    Ok(())
}
