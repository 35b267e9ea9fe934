//! Tile source reading from an existing MBTiles container.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use r2d2::Pool;
use r2d2_sqlite::rusqlite::{params, OpenFlags, OptionalExtension};
use r2d2_sqlite::SqliteConnectionManager;
use tracing::{debug, info};

use super::types::{sanitize_namespace, SourceError, TileSource};
use crate::coord::{TileCoord, TileScheme};

/// Reads tiles out of an MBTiles file.
///
/// MBTiles stores rows in TMS orientation; lookups convert the XYZ row of
/// the requested coordinate before querying.
pub struct ContainerTileSource {
    path: PathBuf,
    pool: Pool<SqliteConnectionManager>,
    name: String,
    namespace: String,
}

impl ContainerTileSource {
    /// Opens an MBTiles file read-only.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidFormat`] when the file does not exist,
    /// is not an SQLite database, or lacks a `tiles` table.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let invalid = |reason: String| SourceError::InvalidFormat {
            path: path.to_path_buf(),
            reason,
        };

        if !path.is_file() {
            return Err(invalid("file does not exist".to_string()));
        }

        let manager = SqliteConnectionManager::file(path)
            .with_flags(OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX);
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .map_err(|e| invalid(e.to_string()))?;

        let has_tiles: i64 = pool
            .get()
            .map_err(|e| invalid(e.to_string()))?
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'tiles'",
                [],
                |row| row.get(0),
            )
            .map_err(|e| invalid(e.to_string()))?;
        if has_tiles == 0 {
            return Err(invalid("no 'tiles' table".to_string()));
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        info!(path = %path.display(), "Opened source container");

        Ok(Self {
            path: path.to_path_buf(),
            pool,
            namespace: sanitize_namespace(&file_name),
            name: file_name,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn invalid(&self, reason: impl ToString) -> SourceError {
        SourceError::InvalidFormat {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    /// All key/value pairs of the `metadata` table.
    pub fn metadata(&self) -> Result<BTreeMap<String, String>, SourceError> {
        let conn = self.pool.get().map_err(|e| self.invalid(e))?;
        let mut stmt = conn
            .prepare("SELECT name, value FROM metadata")
            .map_err(|e| self.invalid(e))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| self.invalid(e))?;

        let mut metadata = BTreeMap::new();
        for row in rows {
            let (name, value) = row.map_err(|e| self.invalid(e))?;
            metadata.insert(name, value);
        }
        Ok(metadata)
    }

    /// Distinct zoom levels present in the `tiles` table, ascending.
    pub fn zoom_levels(&self) -> Result<Vec<u8>, SourceError> {
        let conn = self.pool.get().map_err(|e| self.invalid(e))?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT zoom_level FROM tiles ORDER BY zoom_level")
            .map_err(|e| self.invalid(e))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, u8>(0))
            .map_err(|e| self.invalid(e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.invalid(e))
    }
}

impl TileSource for ContainerTileSource {
    fn fetch(&self, tile: &TileCoord) -> Result<Vec<u8>, SourceError> {
        let conn = self.pool.get().map_err(|e| self.invalid(e))?;
        let data: Option<Vec<u8>> = conn
            .query_row(
                "SELECT tile_data FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
                params![tile.zoom, tile.col, tile.row_in(TileScheme::Tms)],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| self.invalid(e))?;

        match data {
            Some(bytes) => {
                debug!(tile = %tile, bytes = bytes.len(), "Extracted tile");
                Ok(bytes)
            }
            None => Err(SourceError::Extraction(*tile)),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}
