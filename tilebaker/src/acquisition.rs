//! Read-through tile acquisition.
//!
//! [`TileAcquisitionService`] answers a tile request from the cache when it
//! can and otherwise delegates to the source, writing the result through to
//! the cache before returning it.

use tracing::{debug, warn};

use crate::cache::TileCache;
use crate::coord::TileCoord;
use crate::source::{SourceError, TileSource};

/// Combines a tile source with a cache.
pub struct TileAcquisitionService {
    source: Box<dyn TileSource>,
    cache: Box<dyn TileCache>,
}

impl TileAcquisitionService {
    pub fn new(source: Box<dyn TileSource>, cache: Box<dyn TileCache>) -> Self {
        Self { source, cache }
    }

    /// Resolves a tile.
    ///
    /// A failed cache write is logged and does not fail the fetch; the bytes
    /// obtained from the source are still returned.
    pub fn fetch(&self, tile: &TileCoord) -> Result<Vec<u8>, SourceError> {
        if let Some(data) = self.cache.get(tile) {
            return Ok(data);
        }

        debug!(tile = %tile, source = self.source.name(), "Cache miss, fetching from source");
        let data = self.source.fetch(tile)?;

        if let Err(e) = self.cache.put(tile, &data) {
            warn!(tile = %tile, error = %e, "Failed to write tile to cache");
        }
        Ok(data)
    }

    pub fn source(&self) -> &dyn TileSource {
        self.source.as_ref()
    }

    pub fn cache(&self) -> &dyn TileCache {
        self.cache.as_ref()
    }
}
