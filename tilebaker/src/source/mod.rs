//! Tile origin abstraction
//!
//! This module provides the [`TileSource`] trait and its two implementations:
//! [`RemoteTileSource`] downloads tiles from an HTTP tile server using a URL
//! template, [`ContainerTileSource`] reads them out of an existing MBTiles file.
//!
//! ```ignore
//! use tilebaker::source::{RemoteTileSource, ReqwestClient, TileSource};
//!
//! let client = ReqwestClient::new()?;
//! let source = RemoteTileSource::new(client, "http://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png")?;
//! let bytes = source.fetch(&tile)?;
//! ```

mod container;
mod format;
mod http;
mod remote;
mod types;

pub use container::ContainerTileSource;
pub use format::{format_extension, infer_format, normalize_format, DEFAULT_TILE_FORMAT};
pub use http::{HttpClient, ReqwestClient, DEFAULT_HTTP_TIMEOUT_SECS};
pub use remote::{
    RemoteTileSource, UrlTemplate, DEFAULT_DOWNLOAD_RETRIES, DEFAULT_REQUEST_DELAY,
    DEFAULT_SUBDOMAINS, DEFAULT_TILE_SIZE,
};
pub use types::{sanitize_namespace, SourceError, TileSource};

#[cfg(test)]
pub use http::tests::{http_error, MockHttpClient};
