//! Tile source types and traits

use std::path::PathBuf;

use thiserror::Error;

use crate::coord::TileCoord;

/// Errors that can occur while fetching a tile from its origin.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SourceError {
    /// HTTP request failed. `status` is `None` when no response was received.
    #[error("Download of {url} failed{}: {reason}", status_suffix(.status))]
    Download {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    /// The tile is not present in the source container.
    #[error("Tile {0} not found in source container")]
    Extraction(TileCoord),

    /// The source container cannot be opened or queried.
    #[error("Cannot read tile container {path}: {reason}")]
    InvalidFormat { path: PathBuf, reason: String },

    /// The URL template is malformed or uses an unknown placeholder.
    #[error("Invalid URL template '{template}': {reason}")]
    InvalidTemplate { template: String, reason: String },

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Client(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" with HTTP {}", code),
        None => String::new(),
    }
}

impl SourceError {
    /// HTTP status carried by a download failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            SourceError::Download { status, .. } => *status,
            _ => None,
        }
    }

    /// True for download failures without any HTTP response.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, SourceError::Download { status: None, .. })
    }
}

/// Origin of tile payloads.
///
/// Implementors resolve a tile coordinate to its encoded image bytes, either
/// from a remote tile server or from an existing tile container.
pub trait TileSource: Send + Sync {
    /// Fetches the encoded bytes of a tile.
    ///
    /// # Arguments
    ///
    /// * `tile` - Tile coordinate in XYZ orientation
    ///
    /// # Returns
    ///
    /// The tile payload or an error.
    fn fetch(&self, tile: &TileCoord) -> Result<Vec<u8>, SourceError>;

    /// Returns the source's name for logging and identification.
    fn name(&self) -> &str;

    /// Directory-safe identifier used to separate cache entries of different
    /// sources.
    fn namespace(&self) -> &str;
}

impl<T: TileSource + ?Sized> TileSource for Box<T> {
    fn fetch(&self, tile: &TileCoord) -> Result<Vec<u8>, SourceError> {
        (**self).fetch(tile)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn namespace(&self) -> &str {
        (**self).namespace()
    }
}

/// Reduces an arbitrary identifier to a single safe directory name.
///
/// Characters other than ASCII alphanumerics, `-`, `_` and `.` become `_`;
/// runs of `_` collapse and leading/trailing separators are trimmed.
pub fn sanitize_namespace(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let trimmed = out.trim_matches(|c| c == '_' || c == '.');
    if trimmed.is_empty() {
        "default".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_display_with_status() {
        let err = SourceError::Download {
            url: "http://a/1/2/3.png".to_string(),
            status: Some(404),
            reason: "Not Found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Download of http://a/1/2/3.png failed with HTTP 404: Not Found"
        );
        assert_eq!(err.status(), Some(404));
        assert!(!err.is_connectivity());
    }

    #[test]
    fn test_download_error_without_status_is_connectivity() {
        let err = SourceError::Download {
            url: "http://a".to_string(),
            status: None,
            reason: "connection refused".to_string(),
        };
        assert!(err.is_connectivity());
        assert_eq!(err.status(), None);
    }

    #[test]
    fn test_sanitize_namespace() {
        assert_eq!(
            sanitize_namespace("tile.openstreetmap.org"),
            "tile.openstreetmap.org"
        );
        assert_eq!(
            sanitize_namespace("server.example.com/ArcGIS/rest/World Imagery"),
            "server.example.com_ArcGIS_rest_World_Imagery"
        );
        assert_eq!(sanitize_namespace("../../etc"), "etc");
        assert_eq!(sanitize_namespace("///"), "default");
    }
}
