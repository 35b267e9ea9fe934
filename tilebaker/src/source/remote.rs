//! Remote tile server source.
//!
//! Tiles are requested from a URL template such as
//! `http://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png`. Supported
//! placeholders:
//!
//! | Placeholder | Value |
//! |---|---|
//! | `{z}` `{x}` `{y}` | zoom, column, row (XYZ) |
//! | `{s}` | subdomain, `subdomains[(x + y) % n]` |
//! | `{size}` | tile edge length in pixels |
//! | `{key}` / `{quadkey}` | Bing-style quadkey |

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::http::HttpClient;
use super::types::{sanitize_namespace, SourceError, TileSource};
use crate::coord::{tile_to_quadkey, TileCoord};
use crate::retry::{retry, Backoff, Verdict};

/// Default subdomains for `{s}`.
pub const DEFAULT_SUBDOMAINS: &[&str] = &["a", "b", "c"];

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Default number of retries after the first failed download.
pub const DEFAULT_DOWNLOAD_RETRIES: u32 = 10;

/// Default pause before each download attempt.
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Subdomain,
    Zoom,
    Col,
    Row,
    Size,
    Quadkey,
}

/// A parsed and validated tile URL template.
#[derive(Debug, Clone, PartialEq)]
pub struct UrlTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl UrlTemplate {
    /// Parses a template, rejecting unknown placeholders and unbalanced braces.
    pub fn parse(template: &str) -> Result<Self, SourceError> {
        let invalid = |reason: String| SourceError::InvalidTemplate {
            template: template.to_string(),
            reason,
        };

        let mut segments = Vec::new();
        let mut rest = template;
        while let Some(open) = rest.find(['{', '}']) {
            if rest.as_bytes()[open] == b'}' {
                return Err(invalid(format!("unmatched '}}' at offset {}", template.len() - rest.len() + open)));
            }
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 1..];
            let close = after
                .find('}')
                .ok_or_else(|| invalid("unterminated placeholder".to_string()))?;
            let name = &after[..close];
            let segment = match name {
                "s" => Segment::Subdomain,
                "z" => Segment::Zoom,
                "x" => Segment::Col,
                "y" => Segment::Row,
                "size" => Segment::Size,
                "key" | "quadkey" => Segment::Quadkey,
                other => return Err(invalid(format!("unknown placeholder {{{}}}", other))),
            };
            segments.push(segment);
            rest = &after[close + 1..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            raw: template.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the template contains `{s}`.
    pub fn uses_subdomains(&self) -> bool {
        self.segments.contains(&Segment::Subdomain)
    }

    /// Expands the template for one tile.
    pub fn render(&self, tile: &TileCoord, subdomains: &[String], tile_size: u32) -> String {
        let mut url = String::with_capacity(self.raw.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => url.push_str(text),
                Segment::Subdomain => {
                    if !subdomains.is_empty() {
                        let index = (u64::from(tile.col) + u64::from(tile.row))
                            % subdomains.len() as u64;
                        url.push_str(&subdomains[index as usize]);
                    }
                }
                Segment::Zoom => url.push_str(&tile.zoom.to_string()),
                Segment::Col => url.push_str(&tile.col.to_string()),
                Segment::Row => url.push_str(&tile.row.to_string()),
                Segment::Size => url.push_str(&tile_size.to_string()),
                Segment::Quadkey => url.push_str(&tile_to_quadkey(tile)),
            }
        }
        url
    }

    /// Host and fixed path prefix of the template, for cache separation.
    ///
    /// Path segments containing placeholders are dropped.
    pub fn namespace(&self) -> String {
        let without_scheme = self
            .raw
            .split_once("://")
            .map(|(_, rest)| rest)
            .unwrap_or(&self.raw);
        let path = without_scheme.split(['?', '#']).next().unwrap_or_default();

        let fixed: Vec<String> = path
            .split('/')
            .filter(|part| !part.is_empty())
            .filter_map(|part| {
                if !part.contains('{') {
                    return Some(part.to_string());
                }
                // keep the host even when it carries {s}
                if part.contains('.') && part.starts_with("{s}") {
                    return Some(part.trim_start_matches("{s}").to_string());
                }
                None
            })
            .collect();
        sanitize_namespace(&fixed.join("/"))
    }
}

/// Tile source backed by an HTTP tile server.
pub struct RemoteTileSource<C: HttpClient> {
    http_client: C,
    template: UrlTemplate,
    subdomains: Vec<String>,
    tile_size: u32,
    request_delay: Duration,
    retries: u32,
    backoff: Backoff,
    name: String,
    namespace: String,
}

impl<C: HttpClient> RemoteTileSource<C> {
    /// Creates a source for the given template with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidTemplate`] when the template uses an
    /// unknown placeholder.
    pub fn new(http_client: C, template: &str) -> Result<Self, SourceError> {
        let template = UrlTemplate::parse(template)?;
        let namespace = template.namespace();
        Ok(Self {
            http_client,
            name: namespace.clone(),
            namespace,
            template,
            subdomains: DEFAULT_SUBDOMAINS.iter().map(|s| s.to_string()).collect(),
            tile_size: DEFAULT_TILE_SIZE,
            request_delay: DEFAULT_REQUEST_DELAY,
            retries: DEFAULT_DOWNLOAD_RETRIES,
            backoff: Backoff::default(),
        })
    }

    /// Sets the subdomains used for `{s}`.
    ///
    /// # Errors
    ///
    /// Fails when the list is empty but the template needs a subdomain.
    pub fn with_subdomains(mut self, subdomains: Vec<String>) -> Result<Self, SourceError> {
        if subdomains.is_empty() && self.template.uses_subdomains() {
            return Err(SourceError::InvalidTemplate {
                template: self.template.as_str().to_string(),
                reason: "template uses {s} but no subdomains are configured".to_string(),
            });
        }
        self.subdomains = subdomains;
        Ok(self)
    }

    pub fn with_tile_size(mut self, tile_size: u32) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Pause before every download attempt.
    pub fn with_request_delay(mut self, delay: Duration) -> Self {
        self.request_delay = delay;
        self
    }

    /// Number of retries after the first failed attempt.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Constructs the download URL for a given tile.
    pub fn build_url(&self, tile: &TileCoord) -> String {
        self.template.render(tile, &self.subdomains, self.tile_size)
    }

    pub fn template(&self) -> &UrlTemplate {
        &self.template
    }
}

impl<C: HttpClient> TileSource for RemoteTileSource<C> {
    fn fetch(&self, tile: &TileCoord) -> Result<Vec<u8>, SourceError> {
        let url = self.build_url(tile);
        let mut attempt = 0u32;

        retry(
            &self.backoff,
            Some(self.retries),
            || {
                attempt += 1;
                if !self.request_delay.is_zero() {
                    thread::sleep(self.request_delay);
                }
                let started = Instant::now();
                let result = self.http_client.get(&url);
                match &result {
                    Ok(bytes) => debug!(
                        tile = %tile,
                        bytes = bytes.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Downloaded tile"
                    ),
                    Err(e) => warn!(
                        tile = %tile,
                        attempt,
                        max_attempts = self.retries + 1,
                        error = %e,
                        "Tile download failed"
                    ),
                }
                result
            },
            |e| match e {
                SourceError::Download { .. } => Verdict::Retry,
                _ => Verdict::Fail,
            },
            |delay| {
                thread::sleep(delay);
                Ok(())
            },
        )
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::http::tests::{http_error, MockHttpClient};

    fn tile(zoom: u8, col: u32, row: u32) -> TileCoord {
        TileCoord { zoom, col, row }
    }

    fn fast_source(mock: MockHttpClient, template: &str) -> RemoteTileSource<MockHttpClient> {
        RemoteTileSource::new(mock, template)
            .unwrap()
            .with_request_delay(Duration::ZERO)
            .with_backoff(Backoff::new(Duration::ZERO))
    }

    #[test]
    fn test_build_url_with_subdomain_round_robin() {
        let source = fast_source(
            MockHttpClient::always(Ok(vec![])),
            "http://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
        );

        assert_eq!(
            source.build_url(&tile(3, 1, 1)),
            "http://c.tile.openstreetmap.org/3/1/1.png"
        );
        assert_eq!(
            source.build_url(&tile(3, 2, 2)),
            "http://b.tile.openstreetmap.org/3/2/2.png"
        );
    }

    #[test]
    fn test_build_url_quadkey_and_size() {
        let source = fast_source(
            MockHttpClient::always(Ok(vec![])),
            "https://ecn.t0.tiles.virtualearth.net/tiles/a{quadkey}.jpeg?g=1&s={size}",
        );
        assert_eq!(
            source.build_url(&tile(3, 3, 5)),
            "https://ecn.t0.tiles.virtualearth.net/tiles/a213.jpeg?g=1&s=256"
        );

        let alias = UrlTemplate::parse("http://x/{key}").unwrap();
        assert_eq!(alias.render(&tile(3, 3, 5), &[], 256), "http://x/213");
    }

    #[test]
    fn test_unknown_placeholder_rejected() {
        let result = RemoteTileSource::new(
            MockHttpClient::always(Ok(vec![])),
            "http://example.com/{zoom}/{x}/{y}.png",
        );
        assert!(matches!(
            result,
            Err(SourceError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn test_unbalanced_braces_rejected() {
        assert!(UrlTemplate::parse("http://example.com/{z/{x}").is_err());
        assert!(UrlTemplate::parse("http://example.com/z}/{x}").is_err());
        assert!(UrlTemplate::parse("http://example.com/{z").is_err());
    }

    #[test]
    fn test_empty_subdomains_rejected_when_needed() {
        let source = RemoteTileSource::new(
            MockHttpClient::always(Ok(vec![])),
            "http://{s}.example.com/{z}/{x}/{y}.png",
        )
        .unwrap();
        assert!(source.with_subdomains(vec![]).is_err());
    }

    #[test]
    fn test_namespace_from_template() {
        let template =
            UrlTemplate::parse("http://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png").unwrap();
        assert_eq!(template.namespace(), "tile.openstreetmap.org");

        let template = UrlTemplate::parse(
            "https://server.example.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}",
        )
        .unwrap();
        assert_eq!(
            template.namespace(),
            "server.example.com_ArcGIS_rest_services_World_Imagery_MapServer_tile"
        );
    }

    #[test]
    fn test_fetch_success() {
        let source = fast_source(
            MockHttpClient::always(Ok(vec![0x89, 0x50, 0x4E, 0x47])),
            "http://example.com/{z}/{x}/{y}.png",
        );
        let bytes = source.fetch(&tile(1, 0, 1)).unwrap();
        assert_eq!(bytes, vec![0x89, 0x50, 0x4E, 0x47]);
    }

    #[test]
    fn test_fetch_retries_then_succeeds() {
        let mock = MockHttpClient::scripted(
            vec![Err(http_error(None)), Err(http_error(Some(503)))],
            Ok(vec![7]),
        );
        let source = fast_source(mock, "http://example.com/{z}/{x}/{y}.png").with_retries(2);

        assert_eq!(source.fetch(&tile(0, 0, 0)).unwrap(), vec![7]);
        assert_eq!(source.http_client.request_count(), 3);
    }

    #[test]
    fn test_fetch_exhausts_retries_with_last_status() {
        let mock = MockHttpClient::scripted(vec![Err(http_error(None))], Err(http_error(Some(404))));
        let source = fast_source(mock, "http://example.com/{z}/{x}/{y}.png").with_retries(3);

        let err = source.fetch(&tile(0, 0, 0)).unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(source.http_client.request_count(), 4);
    }

    #[test]
    fn test_fetch_connectivity_only_has_no_status() {
        let source = fast_source(
            MockHttpClient::always(Err(http_error(None))),
            "http://example.com/{z}/{x}/{y}.png",
        )
        .with_retries(0);

        let err = source.fetch(&tile(0, 0, 0)).unwrap_err();
        assert!(err.is_connectivity());
        assert_eq!(source.http_client.request_count(), 1);
    }
}
