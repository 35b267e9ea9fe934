//! Persistent on-disk tile cache.
//!
//! # File Layout
//!
//! ```text
//! {cache_dir}/{namespace}/{scheme}/{zoom}/{col}/{row}.{ext}
//! ```
//!
//! The namespace separates sources so that two tile servers never share
//! entries. Entries are written once through a temporary sibling file and an
//! atomic rename, so readers never see partial data. Nothing is evicted;
//! [`DiskCache::clear`] removes the whole cache directory.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::path::{namespace_directory, tile_path};
use super::traits::{CacheError, TileCache};
use crate::coord::{TileCoord, TileScheme};

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = "cached_tiles";

/// Writes `data` to `path` atomically.
///
/// The bytes go to a uniquely named hidden file in the target directory which
/// is then renamed over `path`. Missing parent directories are created.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<(), CacheError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| CacheError::io(parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    if let Err(e) = fs::write(&temp, data) {
        let _ = fs::remove_file(&temp);
        return Err(CacheError::io(&temp, e));
    }
    if let Err(e) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(CacheError::io(path, e));
    }
    Ok(())
}

/// On-disk tile cache for one source.
#[derive(Debug, Clone)]
pub struct DiskCache {
    /// Root cache directory shared by all sources.
    cache_dir: PathBuf,
    /// Directory holding this source's entries.
    directory: PathBuf,
    scheme: TileScheme,
    extension: String,
}

impl DiskCache {
    /// Creates a cache rooted at `cache_dir`.
    ///
    /// # Arguments
    ///
    /// * `cache_dir` - Root directory shared by all sources
    /// * `namespace` - Directory-safe source identifier
    /// * `scheme` - Row orientation of the stored file names
    /// * `extension` - Tile file extension (`png`, `jpeg`, ...)
    ///
    /// Directories are created lazily on the first write.
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        namespace: &str,
        scheme: TileScheme,
        extension: impl Into<String>,
    ) -> Self {
        let cache_dir = cache_dir.into();
        let directory = namespace_directory(&cache_dir, namespace, scheme);
        debug!(dir = %directory.display(), "Disk cache configured");
        Self {
            cache_dir,
            directory,
            scheme,
            extension: extension.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Directory holding this source's entries.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn scheme(&self) -> TileScheme {
        self.scheme
    }

    /// Path where a tile is (or would be) stored.
    pub fn path_for(&self, tile: &TileCoord) -> PathBuf {
        tile_path(&self.directory, tile, self.scheme, &self.extension)
    }
}

impl TileCache for DiskCache {
    fn get(&self, tile: &TileCoord) -> Option<Vec<u8>> {
        let path = self.path_for(tile);
        match fs::read(&path) {
            Ok(data) => {
                debug!(tile = %tile, bytes = data.len(), "Cache hit");
                Some(data)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read cache entry");
                None
            }
        }
    }

    fn put(&self, tile: &TileCoord, data: &[u8]) -> Result<(), CacheError> {
        let path = self.path_for(tile);
        if path.exists() {
            return Ok(());
        }
        write_atomic(&path, data)?;
        debug!(tile = %tile, bytes = data.len(), "Cached tile");
        Ok(())
    }

    fn contains(&self, tile: &TileCoord) -> bool {
        self.path_for(tile).is_file()
    }

    fn clear(&self) -> Result<(), CacheError> {
        match fs::remove_dir_all(&self.cache_dir) {
            Ok(()) => {
                info!(dir = %self.cache_dir.display(), "Cache cleared");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CacheError::io(&self.cache_dir, e)),
        }
    }
}
