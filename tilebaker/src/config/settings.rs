//! Builder configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::defaults::*;
use super::file::ConfigError;
use crate::coord::TileScheme;
use crate::coverage::CoverageRegion;
use crate::retry::Backoff;
use crate::source::{infer_format, normalize_format, UrlTemplate};

/// Configuration for one tile build.
///
/// Groups every parameter of the acquisition, caching and packaging
/// pipeline, providing the defaults below while allowing customization:
///
/// | Setting | Default |
/// |---|---|
/// | URL template | `http://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png` |
/// | subdomains | `a`, `b`, `c` |
/// | inter-request delay | 0.25 s |
/// | retry budget | 10 |
/// | HTTP timeout | 30 s |
/// | cache | enabled, `cached_tiles`, TMS rows |
/// | staging | `$TMP/tilebaker` |
/// | output | `tiles.mbtiles` |
/// | tile format / size | `image/png`, 256 px |
/// | time unit | 1 s |
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tilebaker::config::BuilderConfig;
/// use tilebaker::coord::GeoBBox;
/// use tilebaker::coverage::CoverageRegion;
///
/// let region = CoverageRegion::new(GeoBBox::new(50.0, 30.0, 50.1, 30.1), [10, 11]).unwrap();
/// let config = BuilderConfig::new()
///     .with_coverage(region)
///     .with_output_path("kyiv.mbtiles")
///     .with_request_delay(Duration::from_millis(100));
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.download_retries(), 10);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderConfig {
    url_template: String,
    subdomains: Vec<String>,
    headers: Vec<(String, String)>,
    request_delay: Duration,
    download_retries: Option<u32>,
    http_timeout: Duration,
    coverage: Vec<CoverageRegion>,
    cache_enabled: bool,
    cache_dir: PathBuf,
    cache_scheme: TileScheme,
    staging_dir: PathBuf,
    output_path: PathBuf,
    attribution: Option<String>,
    use_attribution: bool,
    tile_format: String,
    tile_size: u32,
    time_unit: Duration,
    wait_connection: bool,
    ignore_errors: bool,
    source_container: Option<PathBuf>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            subdomains: DEFAULT_SUBDOMAINS.iter().map(|s| s.to_string()).collect(),
            headers: Vec::new(),
            request_delay: DEFAULT_REQUEST_DELAY,
            download_retries: None,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            coverage: Vec::new(),
            cache_enabled: true,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            cache_scheme: TileScheme::Tms,
            staging_dir: default_staging_dir(),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            attribution: None,
            use_attribution: true,
            tile_format: DEFAULT_TILE_FORMAT.to_string(),
            tile_size: DEFAULT_TILE_SIZE,
            time_unit: DEFAULT_TIME_UNIT,
            wait_connection: true,
            ignore_errors: false,
            source_container: None,
        }
    }
}

impl BuilderConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks the configuration for consistency.
    ///
    /// Coverage regions are validated when they are constructed; this checks
    /// everything else.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &'static str, reason: String| ConfigError::Invalid { field, reason };

        if self.source_container.is_none() {
            let template = UrlTemplate::parse(&self.url_template)
                .map_err(|e| invalid("url_template", e.to_string()))?;
            if template.uses_subdomains() && self.subdomains.is_empty() {
                return Err(invalid(
                    "subdomains",
                    "the URL template uses {s} but no subdomains are set".to_string(),
                ));
            }
        }
        if self.tile_size == 0 {
            return Err(invalid("tile_size", "must be positive".to_string()));
        }
        if self.time_unit.is_zero() {
            return Err(invalid("time_unit", "must be positive".to_string()));
        }
        if self.http_timeout.is_zero() {
            return Err(invalid("http_timeout", "must be positive".to_string()));
        }
        if !normalize_format(&self.tile_format).starts_with("image/") {
            return Err(invalid(
                "tile_format",
                format!("'{}' is not an image MIME type", self.tile_format),
            ));
        }
        if self.output_path.file_name().is_none() {
            return Err(invalid(
                "output_path",
                format!("'{}' does not name a file", self.output_path.display()),
            ));
        }
        for (name, _) in &self.headers {
            if name.trim().is_empty() {
                return Err(invalid("headers", "header name must not be empty".to_string()));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Setters
    // =========================================================================

    pub fn with_url_template(mut self, template: impl Into<String>) -> Self {
        self.url_template = template.into();
        self
    }

    pub fn with_subdomains(mut self, subdomains: Vec<String>) -> Self {
        self.subdomains = subdomains;
        self
    }

    /// Adds a static header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Pause before every download attempt. Default: 0.25 s.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Retries after the first failed download.
    ///
    /// Default: 10 for jobs driven directly, 0 under a
    /// [`JobController`](crate::controller::JobController), whose
    /// stop-aware gate then owns retrying. Source-level retries sleep without
    /// observing stop or pause.
    pub fn with_download_retries(mut self, retries: u32) -> Self {
        self.download_retries = Some(retries);
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Appends a coverage region.
    pub fn with_coverage(mut self, region: CoverageRegion) -> Self {
        self.coverage.push(region);
        self
    }

    /// Replaces all coverage regions.
    pub fn with_coverages(mut self, regions: Vec<CoverageRegion>) -> Self {
        self.coverage = regions;
        self
    }

    pub fn with_cache_enabled(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Row orientation of cache and staging file names. Default: TMS.
    pub fn with_cache_scheme(mut self, scheme: TileScheme) -> Self {
        self.cache_scheme = scheme;
        self
    }

    /// Root under which the per-output staging directory is created.
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn with_attribution(mut self, attribution: impl Into<String>) -> Self {
        self.attribution = Some(attribution.into());
        self
    }

    /// Whether the attribution is written to the container metadata.
    pub fn with_use_attribution(mut self, use_attribution: bool) -> Self {
        self.use_attribution = use_attribution;
        self
    }

    pub fn with_tile_format(mut self, format: impl Into<String>) -> Self {
        self.tile_format = format.into();
        self
    }

    pub fn with_tile_size(mut self, size: u32) -> Self {
        self.tile_size = size;
        self
    }

    /// Length of one backoff time unit. Default: 1 s.
    pub fn with_time_unit(mut self, unit: Duration) -> Self {
        self.time_unit = unit;
        self
    }

    /// Whether gathering waits out connectivity loss. Default: true.
    pub fn with_wait_connection(mut self, wait: bool) -> Self {
        self.wait_connection = wait;
        self
    }

    /// Skip tiles that fail with a per-tile error instead of aborting.
    pub fn with_ignore_errors(mut self, ignore: bool) -> Self {
        self.ignore_errors = ignore;
        self
    }

    /// Read tiles from an existing MBTiles file instead of a tile server.
    pub fn with_source_container(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_container = Some(path.into());
        self
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn url_template(&self) -> &str {
        &self.url_template
    }

    pub fn subdomains(&self) -> &[String] {
        &self.subdomains
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn request_delay(&self) -> Duration {
        self.request_delay
    }

    /// Source retry budget for jobs driven directly.
    pub fn download_retries(&self) -> u32 {
        self.download_retries.unwrap_or(DEFAULT_DOWNLOAD_RETRIES)
    }

    /// Source retry budget for jobs driven by a job controller.
    pub fn controlled_download_retries(&self) -> u32 {
        self.download_retries.unwrap_or(0)
    }

    pub fn http_timeout(&self) -> Duration {
        self.http_timeout
    }

    pub fn coverage(&self) -> &[CoverageRegion] {
        &self.coverage
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn cache_scheme(&self) -> TileScheme {
        self.cache_scheme
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn attribution(&self) -> Option<&str> {
        self.attribution.as_deref()
    }

    pub fn use_attribution(&self) -> bool {
        self.use_attribution
    }

    /// Configured tile MIME type, before inference from the URL.
    pub fn tile_format(&self) -> &str {
        &self.tile_format
    }

    /// Tile MIME type actually used.
    ///
    /// For remote sources an image extension in the URL template overrides
    /// the configured format.
    pub fn effective_tile_format(&self) -> String {
        if self.source_container.is_none() {
            if let Some(inferred) = infer_format(&self.url_template) {
                return inferred;
            }
        }
        normalize_format(&self.tile_format)
    }

    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    pub fn time_unit(&self) -> Duration {
        self.time_unit
    }

    /// Backoff schedule scaled to the configured time unit.
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.time_unit)
    }

    pub fn wait_connection(&self) -> bool {
        self.wait_connection
    }

    pub fn ignore_errors(&self) -> bool {
        self.ignore_errors
    }

    pub fn source_container(&self) -> Option<&Path> {
        self.source_container.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::GeoBBox;

    #[test]
    fn test_default_config() {
        let config = BuilderConfig::default();
        assert_eq!(config.url_template(), DEFAULT_URL_TEMPLATE);
        assert_eq!(config.subdomains(), ["a", "b", "c"]);
        assert_eq!(config.request_delay(), Duration::from_millis(250));
        assert_eq!(config.download_retries(), 10);
        assert_eq!(config.controlled_download_retries(), 0);
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
        assert!(config.cache_enabled());
        assert_eq!(config.cache_dir(), Path::new("cached_tiles"));
        assert_eq!(config.cache_scheme(), TileScheme::Tms);
        assert_eq!(config.output_path(), Path::new("tiles.mbtiles"));
        assert_eq!(config.tile_size(), 256);
        assert_eq!(config.time_unit(), Duration::from_secs(1));
        assert!(config.wait_connection());
        assert!(!config.ignore_errors());
        assert!(config.source_container().is_none());
        assert!(config.staging_dir().ends_with("tilebaker"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_new_equals_default() {
        assert_eq!(BuilderConfig::new(), BuilderConfig::default());
    }

    #[test]
    fn test_setters_leave_other_fields_unchanged() {
        let config = BuilderConfig::new()
            .with_download_retries(2)
            .with_header("User-Agent", "tilebaker-test");
        assert_eq!(config.download_retries(), 2);
        assert_eq!(config.controlled_download_retries(), 2);
        assert_eq!(
            config.headers(),
            [("User-Agent".to_string(), "tilebaker-test".to_string())]
        );
        assert_eq!(config.tile_size(), DEFAULT_TILE_SIZE);
    }

    #[test]
    fn test_coverage_setters() {
        let a = CoverageRegion::new(GeoBBox::new(0.0, 0.0, 1.0, 1.0), [1]).unwrap();
        let b = CoverageRegion::new(GeoBBox::new(2.0, 2.0, 3.0, 3.0), [2]).unwrap();

        let config = BuilderConfig::new().with_coverage(a.clone()).with_coverage(b.clone());
        assert_eq!(config.coverage().len(), 2);

        let config = config.with_coverages(vec![b.clone()]);
        assert_eq!(config.coverage(), [b]);
    }

    #[test]
    fn test_validate_rejects_unknown_placeholder() {
        let config = BuilderConfig::new().with_url_template("http://x/{zoom}/{x}/{y}.png");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "url_template", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_missing_subdomains() {
        let config = BuilderConfig::new().with_subdomains(vec![]);
        assert!(config.validate().is_err());

        let config = config.with_url_template("http://tiles.example.com/{z}/{x}/{y}.png");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_non_image_format_and_zero_unit() {
        assert!(BuilderConfig::new().with_tile_format("text/html").validate().is_err());
        assert!(BuilderConfig::new().with_time_unit(Duration::ZERO).validate().is_err());
        assert!(BuilderConfig::new().with_tile_size(0).validate().is_err());
    }

    #[test]
    fn test_effective_format_prefers_url_extension() {
        let config = BuilderConfig::new()
            .with_url_template("https://tiles.example.com/{z}/{x}/{y}.jpg")
            .with_tile_format("image/png");
        assert_eq!(config.effective_tile_format(), "image/jpeg");

        let config = config.with_url_template("https://tiles.example.com/{z}/{y}/{x}");
        assert_eq!(config.effective_tile_format(), "image/png");
    }

    #[test]
    fn test_container_source_skips_template_checks() {
        let config = BuilderConfig::new()
            .with_url_template("not a {valid} template")
            .with_source_container("/data/source.mbtiles")
            .with_tile_format("image/webp");
        assert!(config.validate().is_ok());
        assert_eq!(config.effective_tile_format(), "image/webp");
    }
}
