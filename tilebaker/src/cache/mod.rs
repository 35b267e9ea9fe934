//! Tile cache.
//!
//! Provides the [`TileCache`] trait with a persistent [`DiskCache`] and a
//! [`NullCache`] for runs with caching disabled, plus the path helpers shared
//! with a build's staging area.

mod disk;
mod null;
mod path;
mod traits;

pub use disk::{write_atomic, DiskCache, DEFAULT_CACHE_DIR};
pub use null::NullCache;
pub use path::{namespace_directory, parse_tile_path, tile_path};
pub use traits::{CacheError, TileCache};
