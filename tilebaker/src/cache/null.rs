//! Cache that stores nothing.

use super::traits::{CacheError, TileCache};
use crate::coord::TileCoord;

/// No-op cache implementation that never caches.
///
/// Always returns cache misses. Used when caching is disabled so every tile
/// is fetched from its source.
///
/// # Example
///
/// ```
/// use tilebaker::cache::{NullCache, TileCache};
/// use tilebaker::coord::TileCoord;
///
/// let cache = NullCache;
/// let tile = TileCoord { zoom: 1, col: 0, row: 0 };
///
/// cache.put(&tile, &[1, 2, 3]).unwrap();
/// assert_eq!(cache.get(&tile), None);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCache;

impl TileCache for NullCache {
    fn get(&self, _tile: &TileCoord) -> Option<Vec<u8>> {
        None
    }

    fn put(&self, _tile: &TileCoord, _data: &[u8]) -> Result<(), CacheError> {
        Ok(())
    }

    fn contains(&self, _tile: &TileCoord) -> bool {
        false
    }

    fn clear(&self) -> Result<(), CacheError> {
        Ok(())
    }
}
