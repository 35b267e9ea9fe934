//! Tile path construction.
//!
//! The same layout is used for the persistent cache and for a build's
//! staging area:
//!
//! ```text
//! <dir>/<zoom>/<col>/<row>.<ext>
//! ```
//!
//! where `row` is expressed in the store's [`TileScheme`].

use std::path::{Path, PathBuf};

use crate::coord::{TileCoord, TileScheme};

/// Construct the full path of a stored tile.
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
/// use tilebaker::cache::tile_path;
/// use tilebaker::coord::{TileCoord, TileScheme};
///
/// let tile = TileCoord { zoom: 2, col: 1, row: 0 };
/// assert_eq!(
///     tile_path(&PathBuf::from("/cache"), &tile, TileScheme::Tms, "png"),
///     PathBuf::from("/cache/2/1/3.png")
/// );
/// ```
pub fn tile_path(dir: &Path, tile: &TileCoord, scheme: TileScheme, extension: &str) -> PathBuf {
    dir.join(tile.zoom.to_string())
        .join(tile.col.to_string())
        .join(format!("{}.{}", tile.row_in(scheme), extension))
}

/// Directory holding one source's tiles under a given scheme.
pub fn namespace_directory(cache_dir: &Path, namespace: &str, scheme: TileScheme) -> PathBuf {
    cache_dir.join(namespace).join(scheme.as_str())
}

/// Parses a `<zoom>/<col>/<row>.<ext>` path relative to `dir` back into an
/// XYZ coordinate. Returns `None` for anything that is not a numeric tile path.
pub fn parse_tile_path(dir: &Path, path: &Path, scheme: TileScheme) -> Option<TileCoord> {
    let relative = path.strip_prefix(dir).ok()?;
    let mut parts = relative.components().map(|c| c.as_os_str().to_str());

    let zoom: u8 = parts.next()??.parse().ok()?;
    let col: u32 = parts.next()??.parse().ok()?;
    let file = parts.next()??;
    if parts.next().is_some() {
        return None;
    }

    let (stem, _ext) = file.split_once('.')?;
    let row: u32 = stem.parse().ok()?;

    // range check before flipping
    let stored = TileCoord::new(zoom, col, row).ok()?;
    Some(TileCoord::from_scheme_row(
        stored.zoom,
        stored.col,
        stored.row,
        scheme,
    ))
}
