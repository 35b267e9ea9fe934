//! Default configuration values.

use std::path::PathBuf;
use std::time::Duration;

pub use crate::cache::DEFAULT_CACHE_DIR;
pub use crate::source::{
    DEFAULT_DOWNLOAD_RETRIES, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_REQUEST_DELAY,
    DEFAULT_SUBDOMAINS, DEFAULT_TILE_FORMAT, DEFAULT_TILE_SIZE,
};

/// Default tile server.
pub const DEFAULT_URL_TEMPLATE: &str = "http://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";

/// Default output container path.
pub const DEFAULT_OUTPUT_PATH: &str = "tiles.mbtiles";

/// Name of the staging root under the system temporary directory.
pub const DEFAULT_STAGING_DIR_NAME: &str = "tilebaker";

/// Default time unit for backoff sleeps.
pub const DEFAULT_TIME_UNIT: Duration = Duration::from_secs(1);

/// Default staging root, `$TMP/tilebaker`.
pub fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_STAGING_DIR_NAME)
}
