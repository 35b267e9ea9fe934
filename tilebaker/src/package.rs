//! MBTiles packaging.
//!
//! [`ContainerPackager`] turns a staging directory of `z/x/y.ext` tile files
//! plus a `metadata.json` record into a single MBTiles (SQLite) file:
//!
//! ```text
//! metadata (name TEXT, value TEXT, UNIQUE (name))
//! tiles    (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_data BLOB)
//! UNIQUE INDEX tile_index ON tiles (zoom_level, tile_column, tile_row)
//! ```
//!
//! Rows are stored in TMS orientation. Everything is inserted in one
//! transaction; on failure the partially written file is removed.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use r2d2::Pool;
use r2d2_sqlite::rusqlite::params;
use r2d2_sqlite::SqliteConnectionManager;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cache::parse_tile_path;
use crate::coord::{TileCoord, TileScheme};

/// Errors raised while packaging.
#[derive(Debug, Error)]
pub enum PackageError {
    /// Reading staged files failed
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The metadata record is unreadable
    #[error("Invalid metadata file {path}: {reason}")]
    Metadata { path: PathBuf, reason: String },

    /// SQLite rejected a statement
    #[error("SQLite error: {0}")]
    Sqlite(#[from] r2d2_sqlite::rusqlite::Error),

    /// No connection to the output database
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PackageError + '_ {
    move |source| PackageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Summary of a packaging pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageStats {
    pub tiles: u64,
    pub metadata_entries: u64,
}

/// Writes staged tiles into an MBTiles container.
#[derive(Debug, Clone, Copy)]
pub struct ContainerPackager {
    staging_scheme: TileScheme,
}

impl ContainerPackager {
    /// Creates a packager for staging files whose rows follow `staging_scheme`.
    pub fn new(staging_scheme: TileScheme) -> Self {
        Self { staging_scheme }
    }

    /// Packages `staging_dir` into `output`.
    ///
    /// # Arguments
    ///
    /// * `staging_dir` - Directory holding `<zoom>/<col>/<row>.<ext>` files
    /// * `metadata_file` - JSON object whose entries become metadata rows
    /// * `output` - Container path; an existing file is replaced
    ///
    /// # Returns
    ///
    /// Counts of written rows. On error no output file is left behind.
    pub fn package(
        &self,
        staging_dir: &Path,
        metadata_file: &Path,
        output: &Path,
    ) -> Result<PackageStats, PackageError> {
        let result = self.write_container(staging_dir, metadata_file, output);
        if result.is_err() {
            remove_container(output);
        }
        result
    }

    fn write_container(
        &self,
        staging_dir: &Path,
        metadata_file: &Path,
        output: &Path,
    ) -> Result<PackageStats, PackageError> {
        let tiles = self.collect_tiles(staging_dir)?;
        let metadata = read_metadata(metadata_file)?;

        remove_container(output);
        debug!(path = %output.display(), tiles = tiles.len(), "Creating container");

        let manager = SqliteConnectionManager::file(output);
        let pool = Pool::builder().max_size(1).build(manager)?;
        let mut conn = pool.get()?;

        conn.execute_batch(
            "CREATE TABLE metadata (name TEXT, value TEXT, UNIQUE (name));
             CREATE TABLE tiles (zoom_level INTEGER, tile_column INTEGER, tile_row INTEGER, tile_data BLOB);
             CREATE UNIQUE INDEX tile_index ON tiles (zoom_level, tile_column, tile_row);",
        )?;

        let transaction = conn.transaction()?;
        for (name, value) in &metadata {
            transaction.execute(
                "INSERT OR REPLACE INTO metadata (name, value) VALUES (?1, ?2)",
                params![name, value],
            )?;
        }
        for (tile, path) in &tiles {
            let data = fs::read(path).map_err(io_error(path))?;
            transaction.execute(
                "INSERT INTO tiles (zoom_level, tile_column, tile_row, tile_data) VALUES (?1, ?2, ?3, ?4)",
                params![tile.zoom, tile.col, tile.row_in(TileScheme::Tms), data],
            )?;
        }
        transaction.commit()?;

        info!(
            path = %output.display(),
            tiles = tiles.len(),
            metadata = metadata.len(),
            "Container written"
        );

        Ok(PackageStats {
            tiles: tiles.len() as u64,
            metadata_entries: metadata.len() as u64,
        })
    }

    /// Finds staged tile files, ordered by coordinate.
    fn collect_tiles(&self, staging_dir: &Path) -> Result<BTreeMap<TileCoord, PathBuf>, PackageError> {
        let mut tiles = BTreeMap::new();
        for zoom_dir in subdirectories(staging_dir)? {
            for col_dir in subdirectories(&zoom_dir)? {
                for entry in fs::read_dir(&col_dir).map_err(io_error(&col_dir))? {
                    let path = entry.map_err(io_error(&col_dir))?.path();
                    if !path.is_file() {
                        continue;
                    }
                    match parse_tile_path(staging_dir, &path, self.staging_scheme) {
                        Some(tile) => {
                            tiles.insert(tile, path);
                        }
                        None => warn!(path = %path.display(), "Ignoring unexpected staging file"),
                    }
                }
            }
        }
        Ok(tiles)
    }
}

fn subdirectories(dir: &Path) -> Result<Vec<PathBuf>, PackageError> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    Ok(dirs)
}

/// Reads a flat JSON object into name/value pairs.
///
/// Strings are stored verbatim; numbers and booleans use their JSON text.
fn read_metadata(path: &Path) -> Result<Vec<(String, String)>, PackageError> {
    let content = fs::read_to_string(path).map_err(io_error(path))?;
    let invalid = |reason: String| PackageError::Metadata {
        path: path.to_path_buf(),
        reason,
    };

    let value: Value = serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;
    let Value::Object(map) = value else {
        return Err(invalid("expected a JSON object".to_string()));
    };

    map.into_iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(name, v)| match v {
            Value::String(s) => Ok((name, s)),
            Value::Number(_) | Value::Bool(_) => Ok((name, v.to_string())),
            _ => Err(invalid(format!("value of '{}' must be a scalar", name))),
        })
        .collect()
}

/// Removes a container and its rollback journal, ignoring missing files.
pub(crate) fn remove_container(path: &Path) {
    for candidate in [path.to_path_buf(), journal_path(path)] {
        if let Err(e) = fs::remove_file(&candidate) {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %candidate.display(), error = %e, "Failed to remove file");
            }
        }
    }
}

/// SQLite rollback journal of a database file (`<path>-journal`).
pub fn journal_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push("-journal");
    PathBuf::from(name)
}
