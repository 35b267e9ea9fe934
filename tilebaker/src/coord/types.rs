//! Coordinate type definitions

use std::fmt;
use std::str::FromStr;

/// Web Mercator valid latitude range
pub const MIN_LAT: f64 = -85.05112878;
pub const MAX_LAT: f64 = 85.05112878;

/// Valid longitude range
pub const MIN_LON: f64 = -180.0;
pub const MAX_LON: f64 = 180.0;

/// Supported zoom levels
pub const MIN_ZOOM: u8 = 0;
pub const MAX_ZOOM: u8 = 30;

/// Tile coordinates in the Web Mercator / Slippy Map (XYZ) system.
///
/// Field order gives the derived ordering `(zoom, col, row)`, which is the
/// order tiles are gathered and packaged in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    /// Zoom level
    pub zoom: u8,
    /// X coordinate (east-west), 0 at west
    pub col: u32,
    /// Y coordinate (north-south), 0 at north
    pub row: u32,
}

impl TileCoord {
    /// Creates a tile coordinate, checking `0 <= col,row < 2^zoom`.
    pub fn new(zoom: u8, col: u32, row: u32) -> Result<Self, CoordError> {
        if zoom > MAX_ZOOM {
            return Err(CoordError::InvalidZoom(zoom));
        }
        let max = tiles_per_side(zoom);
        if u64::from(col) >= max || u64::from(row) >= max {
            return Err(CoordError::OutOfRange { zoom, col, row });
        }
        Ok(Self { zoom, col, row })
    }

    /// Returns the row of this tile in the given scheme.
    ///
    /// `TileCoord` always stores XYZ rows; TMS counts rows from the south.
    #[inline]
    pub fn row_in(&self, scheme: TileScheme) -> u32 {
        match scheme {
            TileScheme::Xyz => self.row,
            TileScheme::Tms => flip_row(self.row, self.zoom),
        }
    }

    /// Builds an XYZ coordinate from a row expressed in `scheme`.
    #[inline]
    pub fn from_scheme_row(zoom: u8, col: u32, row: u32, scheme: TileScheme) -> Self {
        let row = match scheme {
            TileScheme::Xyz => row,
            TileScheme::Tms => flip_row(row, zoom),
        };
        Self { zoom, col, row }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.col, self.row)
    }
}

/// Number of tiles along one side of the world at `zoom`.
#[inline]
pub fn tiles_per_side(zoom: u8) -> u64 {
    1u64 << zoom
}

/// Converts a row between XYZ and TMS orientation (the mapping is its own inverse).
#[inline]
pub fn flip_row(row: u32, zoom: u8) -> u32 {
    (tiles_per_side(zoom) - 1 - u64::from(row)) as u32
}

/// Row numbering convention for stored tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TileScheme {
    /// Rows counted from the north (Slippy Map / WMTS).
    Xyz,
    /// Rows counted from the south (TMS / MBTiles).
    #[default]
    Tms,
}

impl TileScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            TileScheme::Xyz => "xyz",
            TileScheme::Tms => "tms",
        }
    }
}

impl fmt::Display for TileScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TileScheme {
    type Err = CoordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "xyz" | "wmts" => Ok(TileScheme::Xyz),
            "tms" => Ok(TileScheme::Tms),
            other => Err(CoordError::InvalidScheme(other.to_string())),
        }
    }
}

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl GeoBBox {
    /// Creates a bounding box from `(south, west, north, east)` without validation.
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        Self {
            south,
            west,
            north,
            east,
        }
    }

    /// Smallest box containing both `self` and `other`.
    pub fn union(&self, other: &GeoBBox) -> GeoBBox {
        GeoBBox {
            south: self.south.min(other.south),
            west: self.west.min(other.west),
            north: self.north.max(other.north),
            east: self.east.max(other.east),
        }
    }

    /// Center point as `(lon, lat)`.
    pub fn center(&self) -> (f64, f64) {
        (
            self.west + (self.east - self.west) / 2.0,
            self.south + (self.north - self.south) / 2.0,
        )
    }
}

impl fmt::Display for GeoBBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.south, self.west, self.north, self.east
        )
    }
}

/// Errors that can occur during coordinate conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordError {
    /// Latitude is outside valid range (-85.05112878 to 85.05112878)
    InvalidLatitude(f64),
    /// Longitude is outside valid range (-180.0 to 180.0)
    InvalidLongitude(f64),
    /// Zoom level is outside valid range
    InvalidZoom(u8),
    /// Column or row outside `0..2^zoom`
    OutOfRange { zoom: u8, col: u32, row: u32 },
    /// Unknown tile scheme name
    InvalidScheme(String),
}

impl fmt::Display for CoordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoordError::InvalidLatitude(lat) => {
                write!(
                    f,
                    "Invalid latitude: {} (must be between {} and {})",
                    lat, MIN_LAT, MAX_LAT
                )
            }
            CoordError::InvalidLongitude(lon) => {
                write!(
                    f,
                    "Invalid longitude: {} (must be between {} and {})",
                    lon, MIN_LON, MAX_LON
                )
            }
            CoordError::InvalidZoom(zoom) => {
                write!(
                    f,
                    "Invalid zoom level: {} (must be between {} and {})",
                    zoom, MIN_ZOOM, MAX_ZOOM
                )
            }
            CoordError::OutOfRange { zoom, col, row } => {
                write!(
                    f,
                    "Tile {}/{}/{} is outside the tile grid at zoom {}",
                    zoom, col, row, zoom
                )
            }
            CoordError::InvalidScheme(s) => {
                write!(f, "Invalid tile scheme: '{}' (must be 'xyz' or 'tms')", s)
            }
        }
    }
}

impl std::error::Error for CoordError {}
