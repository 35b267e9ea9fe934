//! Configuration file handling.
//!
//! Build settings can be kept in an INI file. The default location is
//! `<config dir>/tilebaker/config.ini` (for example
//! `~/.config/tilebaker/config.ini` on Linux). Parsing lives in
//! [`super::parser`].
//!
//! ```ini
//! [source]
//! url = http://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png
//! subdomains = a,b,c
//! request_delay = 0.25
//! retries = 10
//!
//! [headers]
//! User-Agent = tilebaker/0.1
//!
//! [cache]
//! enabled = true
//! directory = cached_tiles
//! scheme = tms
//!
//! [output]
//! path = kyiv.mbtiles
//! attribution = © OpenStreetMap contributors
//!
//! [coverage.kyiv]
//! bbox = 50.2,30.2,50.6,30.8
//! zoom = 10-14
//! ```

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

use super::settings::BuilderConfig;
use crate::coverage::CoverageError;

/// Name of the configuration file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.ini";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    /// Invalid value in the config file
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Coverage section describes an invalid region
    #[error("Invalid coverage in [{section}]: {source}")]
    Coverage {
        section: String,
        #[source]
        source: CoverageError,
    },

    /// Settings are inconsistent
    #[error("Invalid configuration: {field} - {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl BuilderConfig {
    /// Load configuration from the default path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults. The loaded configuration
    /// is validated.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let config = super::parser::parse_ini(&ini)?;
        config.validate()?;
        Ok(config)
    }
}

/// Get the path to the config directory.
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tilebaker")
}

/// Get the path to the config file.
pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}
