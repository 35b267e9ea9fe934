//! Cache trait definition for dependency injection.

use std::path::PathBuf;

use thiserror::Error;

use crate::coord::TileCoord;

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error during cache operations
    #[error("Cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Read-through tile cache.
///
/// Enables persistent and no-op caching to be used interchangeably by
/// [`crate::acquisition::TileAcquisitionService`].
pub trait TileCache: Send + Sync {
    /// Get cached bytes for a tile.
    ///
    /// Returns `Some(data)` if found in cache, `None` otherwise.
    fn get(&self, tile: &TileCoord) -> Option<Vec<u8>>;

    /// Store bytes for a tile.
    ///
    /// Entries are write-once: storing a tile that is already cached leaves
    /// the existing entry in place.
    fn put(&self, tile: &TileCoord, data: &[u8]) -> Result<(), CacheError>;

    /// Check if a tile is cached.
    fn contains(&self, tile: &TileCoord) -> bool;

    /// Remove every cached entry.
    fn clear(&self) -> Result<(), CacheError>;
}

impl<T: TileCache + ?Sized> TileCache for Box<T> {
    fn get(&self, tile: &TileCoord) -> Option<Vec<u8>> {
        (**self).get(tile)
    }

    fn put(&self, tile: &TileCoord, data: &[u8]) -> Result<(), CacheError> {
        (**self).put(tile, data)
    }

    fn contains(&self, tile: &TileCoord) -> bool {
        (**self).contains(tile)
    }

    fn clear(&self) -> Result<(), CacheError> {
        (**self).clear()
    }
}
