//! Coordinate conversion module
//!
//! Provides conversions between geographic coordinates (latitude/longitude)
//! and Web Mercator tile coordinates, plus the quadkey addressing used by
//! some imagery providers.

mod types;

pub use types::{
    flip_row, tiles_per_side, CoordError, GeoBBox, TileCoord, TileScheme, MAX_LAT, MAX_LON,
    MAX_ZOOM, MIN_LAT, MIN_LON, MIN_ZOOM,
};

use std::f64::consts::PI;

/// Projects geographic coordinates to fractional tile coordinates `(x, y)`.
///
/// Latitude is clamped to the Web Mercator limits so that the poles map to
/// the edges of the tile grid instead of infinity.
///
/// `x = 2^z·(lon+180)/360`, `y = 2^z·(1 - ln(tan(lat) + sec(lat))/π)/2`
#[inline]
pub fn project(lat: f64, lon: f64, zoom: u8) -> (f64, f64) {
    let n = tiles_per_side(zoom) as f64;
    let lat_rad = lat.clamp(MIN_LAT, MAX_LAT).to_radians();

    let x = n * (lon + 180.0) / 360.0;
    let y = n * (1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0;
    (x, y)
}

/// Converts geographic coordinates to tile coordinates.
///
/// # Arguments
///
/// * `lat` - Latitude in degrees (-85.05112878 to 85.05112878)
/// * `lon` - Longitude in degrees (-180.0 to 180.0)
/// * `zoom` - Zoom level (0 to 30)
///
/// # Returns
///
/// A `Result` containing the tile coordinates or an error if inputs are invalid.
#[inline]
pub fn to_tile_coords(lat: f64, lon: f64, zoom: u8) -> Result<TileCoord, CoordError> {
    if !(MIN_LAT..=MAX_LAT).contains(&lat) {
        return Err(CoordError::InvalidLatitude(lat));
    }
    if !(MIN_LON..=MAX_LON).contains(&lon) {
        return Err(CoordError::InvalidLongitude(lon));
    }
    if zoom > MAX_ZOOM {
        return Err(CoordError::InvalidZoom(zoom));
    }

    let (x, y) = project(lat, lon, zoom);
    let max = tiles_per_side(zoom) - 1;

    // lon = 180 lands exactly on the grid edge
    let col = (x.floor() as u64).min(max) as u32;
    let row = (y.floor() as u64).min(max) as u32;

    Ok(TileCoord { zoom, col, row })
}

/// Converts tile coordinates back to geographic coordinates.
///
/// Returns the latitude/longitude of the tile's northwest corner.
#[inline]
pub fn tile_to_lat_lon(tile: &TileCoord) -> (f64, f64) {
    corner_to_lat_lon(u64::from(tile.col), u64::from(tile.row), tile.zoom)
}

/// Latitude/longitude of the grid corner at `(col, row)`.
///
/// Unlike [`tile_to_lat_lon`] this accepts `2^zoom` so the southeast corner
/// of the last tile can be addressed.
#[inline]
pub fn corner_to_lat_lon(col: u64, row: u64, zoom: u8) -> (f64, f64) {
    let n = tiles_per_side(zoom) as f64;

    let lon = col as f64 / n * 360.0 - 180.0;

    let y = row as f64 / n;
    let lat_rad = (PI * (1.0 - 2.0 * y)).sinh().atan();
    let lat = lat_rad.to_degrees();

    (lat, lon)
}

/// Computes the quadkey for a tile.
///
/// For each level from `zoom` down to 1 a digit is emitted: bit `i-1` of the
/// column contributes 1 and bit `i-1` of the row contributes 2.
pub fn tile_to_quadkey(tile: &TileCoord) -> String {
    let mut quadkey = String::with_capacity(tile.zoom as usize);
    for i in (1..=tile.zoom).rev() {
        let mask = 1u32 << (i - 1);
        let mut digit = b'0';
        if tile.col & mask != 0 {
            digit += 1;
        }
        if tile.row & mask != 0 {
            digit += 2;
        }
        quadkey.push(digit as char);
    }
    quadkey
}
