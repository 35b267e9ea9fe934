//! Container metadata record.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::coord::{corner_to_lat_lon, GeoBBox, TileCoord};
use crate::error::JobError;
use crate::source::format_extension;

/// File name of the staged metadata record.
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Metadata written into the `metadata` table of a built container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Random UUID identifying the build.
    pub name: String,
    /// Tile file extension (`png`, `jpeg`, ...).
    pub format: String,
    pub minzoom: u8,
    pub maxzoom: u8,
    /// `minlon,minlat,maxlon,maxlat` of the lowest zoom's tile extent.
    pub bounds: String,
    /// `lon,lat,midzoom`.
    pub center: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribution: Option<String>,
}

impl MetadataRecord {
    /// Computes the record for a build.
    ///
    /// # Arguments
    ///
    /// * `tile_format` - Tile MIME type
    /// * `zoom_levels` - Covered zoom levels
    /// * `covered_bbox` - Union of the coverage boxes, used for the center
    /// * `tiles` - Tile set of the build, used for the bounds
    /// * `attribution` - Attribution to record, if any
    ///
    /// Returns `None` when there are no zoom levels or tiles.
    pub fn compute(
        tile_format: &str,
        zoom_levels: &BTreeSet<u8>,
        covered_bbox: &GeoBBox,
        tiles: &BTreeSet<TileCoord>,
        attribution: Option<&str>,
    ) -> Option<Self> {
        let zooms: Vec<u8> = zoom_levels.iter().copied().collect();
        let minzoom = *zooms.first()?;
        let maxzoom = *zooms.last()?;
        let midzoom = zooms[zooms.len() / 2];

        let (min_lon, min_lat, max_lon, max_lat) = tile_bounds(tiles)?;
        let (center_lon, center_lat) = covered_bbox.center();

        Some(Self {
            name: Uuid::new_v4().to_string(),
            format: format_extension(tile_format),
            minzoom,
            maxzoom,
            bounds: format!("{},{},{},{}", min_lon, min_lat, max_lon, max_lat),
            center: format!("{},{},{}", center_lon, center_lat, midzoom),
            attribution: attribution.map(str::to_string),
        })
    }

    /// Writes the record as JSON.
    pub fn write_to(&self, path: &Path) -> Result<(), JobError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| JobError::io(path, e))
    }

    pub fn read_from(path: &Path) -> Result<Self, JobError> {
        let content = fs::read_to_string(path).map_err(|e| JobError::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Geographic extent of the tiles at the lowest zoom present, as
/// `(min_lon, min_lat, max_lon, max_lat)`.
pub fn tile_bounds(tiles: &BTreeSet<TileCoord>) -> Option<(f64, f64, f64, f64)> {
    let min_zoom = tiles.first()?.zoom;
    let level = tiles.iter().take_while(|t| t.zoom == min_zoom);

    let (mut min_col, mut max_col, mut min_row, mut max_row) = (u32::MAX, 0, u32::MAX, 0);
    for tile in level {
        min_col = min_col.min(tile.col);
        max_col = max_col.max(tile.col);
        min_row = min_row.min(tile.row);
        max_row = max_row.max(tile.row);
    }

    let (max_lat, min_lon) = corner_to_lat_lon(u64::from(min_col), u64::from(min_row), min_zoom);
    let (min_lat, max_lon) =
        corner_to_lat_lon(u64::from(max_col) + 1, u64::from(max_row) + 1, min_zoom);
    Some((min_lon, min_lat, max_lon, max_lat))
}
