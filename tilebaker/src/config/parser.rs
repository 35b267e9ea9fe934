//! INI parsing logic for converting `Ini` → `BuilderConfig`.
//!
//! This is the single place where INI key names are mapped to settings.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;

use super::file::ConfigError;
use super::settings::BuilderConfig;
use crate::coord::{GeoBBox, TileScheme};
use crate::coverage::CoverageRegion;

/// Prefix of coverage section names (`[coverage.<name>]`).
const COVERAGE_SECTION_PREFIX: &str = "coverage";

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse an `Ini` object into a `BuilderConfig`.
///
/// Starts from `BuilderConfig::default()` and overlays any values found in
/// the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<BuilderConfig, ConfigError> {
    let mut config = BuilderConfig::default();

    // [source] section
    if let Some(section) = ini.section(Some("source")) {
        if let Some(v) = section.get("url") {
            config = config.with_url_template(v.trim());
        }
        if let Some(v) = section.get("subdomains") {
            config = config.with_subdomains(parse_list(v));
        }
        if let Some(v) = section.get("format") {
            config = config.with_tile_format(v.trim());
        }
        if let Some(v) = section.get("tile_size") {
            config = config.with_tile_size(parse_number("source", "tile_size", v)?);
        }
        if let Some(v) = section.get("request_delay") {
            config = config.with_request_delay(parse_seconds("source", "request_delay", v)?);
        }
        if let Some(v) = section.get("retries") {
            config = config.with_download_retries(parse_number("source", "retries", v)?);
        }
        if let Some(v) = section.get("timeout") {
            config = config.with_http_timeout(parse_seconds("source", "timeout", v)?);
        }
        if let Some(v) = section.get("container") {
            let v = v.trim();
            if !v.is_empty() {
                config = config.with_source_container(PathBuf::from(v));
            }
        }
    }

    // [headers] section
    if let Some(section) = ini.section(Some("headers")) {
        for (name, value) in section.iter() {
            config = config.with_header(name.trim(), value.trim());
        }
    }

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("enabled") {
            config = config.with_cache_enabled(parse_bool("cache", "enabled", v)?);
        }
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config = config.with_cache_dir(PathBuf::from(v));
            }
        }
        if let Some(v) = section.get("scheme") {
            let scheme = TileScheme::from_str(v)
                .map_err(|_| invalid("cache", "scheme", v, "must be 'tms' or 'xyz'"))?;
            config = config.with_cache_scheme(scheme);
        }
    }

    // [output] section
    if let Some(section) = ini.section(Some("output")) {
        if let Some(v) = section.get("path") {
            config = config.with_output_path(PathBuf::from(v.trim()));
        }
        if let Some(v) = section.get("staging_dir") {
            config = config.with_staging_dir(PathBuf::from(v.trim()));
        }
        if let Some(v) = section.get("attribution") {
            let v = v.trim();
            if !v.is_empty() {
                config = config.with_attribution(v);
            }
        }
        if let Some(v) = section.get("use_attribution") {
            config = config.with_use_attribution(parse_bool("output", "use_attribution", v)?);
        }
        if let Some(v) = section.get("ignore_errors") {
            config = config.with_ignore_errors(parse_bool("output", "ignore_errors", v)?);
        }
        if let Some(v) = section.get("wait_connection") {
            config = config.with_wait_connection(parse_bool("output", "wait_connection", v)?);
        }
        if let Some(v) = section.get("time_unit") {
            config = config.with_time_unit(parse_seconds("output", "time_unit", v)?);
        }
    }

    // [coverage.*] sections, in file order
    for (name, section) in ini.iter() {
        let Some(name) = name else { continue };
        let is_coverage = name == COVERAGE_SECTION_PREFIX
            || name.starts_with(&format!("{}.", COVERAGE_SECTION_PREFIX));
        if !is_coverage {
            continue;
        }

        let bbox_value = section
            .get("bbox")
            .ok_or_else(|| invalid(name, "bbox", "", "missing; expected south,west,north,east"))?;
        let zoom_value = section
            .get("zoom")
            .ok_or_else(|| invalid(name, "zoom", "", "missing; expected e.g. '10-14' or '3,5,7'"))?;

        let bbox = parse_bbox(name, bbox_value)?;
        let zooms = parse_zoom_levels(name, zoom_value)?;
        let region = CoverageRegion::new(bbox, zooms).map_err(|source| ConfigError::Coverage {
            section: name.to_string(),
            source,
        })?;
        config = config.with_coverage(region);
    }

    Ok(config)
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(section, key, value, "must be true or false")),
    }
}

fn parse_number<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, "must be a non-negative integer"))
}

fn parse_seconds(section: &str, key: &str, value: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, "must be a number of seconds"))?;
    Duration::try_from_secs_f64(secs)
        .map_err(|_| invalid(section, key, value, "must be a non-negative number of seconds"))
}

/// Parses `south,west,north,east`.
fn parse_bbox(section: &str, value: &str) -> Result<GeoBBox, ConfigError> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| invalid(section, "bbox", value, "expected four numbers"))?;

    match parts.as_slice() {
        [south, west, north, east] => Ok(GeoBBox::new(*south, *west, *north, *east)),
        _ => Err(invalid(section, "bbox", value, "expected south,west,north,east")),
    }
}

/// Parses zoom lists such as `10-14`, `3,5,7` or `3,6-8`.
fn parse_zoom_levels(section: &str, value: &str) -> Result<BTreeSet<u8>, ConfigError> {
    let bad = || invalid(section, "zoom", value, "expected e.g. '10-14' or '3,5,7'");

    let mut zooms = BTreeSet::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((lo, hi)) => {
                let lo: u8 = lo.trim().parse().map_err(|_| bad())?;
                let hi: u8 = hi.trim().parse().map_err(|_| bad())?;
                if lo > hi {
                    return Err(bad());
                }
                zooms.extend(lo..=hi);
            }
            None => {
                zooms.insert(part.parse().map_err(|_| bad())?);
            }
        }
    }
    Ok(zooms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn parse(content: &str) -> Result<BuilderConfig, ConfigError> {
        let ini = Ini::load_from_str(content).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_empty_ini_gives_defaults() {
        assert_eq!(parse("").unwrap(), BuilderConfig::default());
    }

    #[test]
    fn test_source_section() {
        let config = parse(
            "[source]\n\
             url = https://tiles.example.com/{z}/{x}/{y}.jpg\n\
             subdomains = t0, t1\n\
             tile_size = 512\n\
             request_delay = 0.5\n\
             retries = 4\n\
             timeout = 12\n",
        )
        .unwrap();

        assert_eq!(config.url_template(), "https://tiles.example.com/{z}/{x}/{y}.jpg");
        assert_eq!(config.subdomains(), ["t0", "t1"]);
        assert_eq!(config.tile_size(), 512);
        assert_eq!(config.request_delay(), Duration::from_millis(500));
        assert_eq!(config.download_retries(), 4);
        assert_eq!(config.http_timeout(), Duration::from_secs(12));
    }

    #[test]
    fn test_headers_cache_and_output_sections() {
        let config = parse(
            "[headers]\nUser-Agent = tilebaker/0.1\n\n\
             [cache]\nenabled = no\ndirectory = /var/cache/tiles\nscheme = xyz\n\n\
             [output]\npath = out.mbtiles\nattribution = OSM\nuse_attribution = false\n\
             ignore_errors = yes\nwait_connection = off\ntime_unit = 0.01\n",
        )
        .unwrap();

        assert_eq!(
            config.headers(),
            [("User-Agent".to_string(), "tilebaker/0.1".to_string())]
        );
        assert!(!config.cache_enabled());
        assert_eq!(config.cache_dir(), Path::new("/var/cache/tiles"));
        assert_eq!(config.cache_scheme(), TileScheme::Xyz);
        assert_eq!(config.output_path(), Path::new("out.mbtiles"));
        assert_eq!(config.attribution(), Some("OSM"));
        assert!(!config.use_attribution());
        assert!(config.ignore_errors());
        assert!(!config.wait_connection());
        assert_eq!(config.time_unit(), Duration::from_millis(10));
    }

    #[test]
    fn test_coverage_sections_in_order() {
        let config = parse(
            "[coverage.first]\nbbox = 50.0,30.0,50.1,30.1\nzoom = 10-12\n\n\
             [coverage.second]\nbbox = 48.0, 2.0, 49.0, 3.0\nzoom = 3,5\n",
        )
        .unwrap();

        let coverage = config.coverage();
        assert_eq!(coverage.len(), 2);
        assert_eq!(
            coverage[0].zoom_levels().iter().copied().collect::<Vec<_>>(),
            vec![10, 11, 12]
        );
        assert_eq!(coverage[1].bbox().south, 48.0);
        assert_eq!(
            coverage[1].zoom_levels().iter().copied().collect::<Vec<_>>(),
            vec![3, 5]
        );
    }

    #[test]
    fn test_invalid_values_are_reported() {
        assert!(matches!(
            parse("[source]\nretries = many\n"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse("[cache]\nscheme = mercator\n"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse("[source]\nrequest_delay = -1\n"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse("[coverage.x]\nbbox = 1,2,3\nzoom = 1\n"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            parse("[coverage.x]\nbbox = 1,2,3,4\n"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_invalid_coverage_region() {
        assert!(matches!(
            parse("[coverage.x]\nbbox = 50.1,30.0,50.0,30.1\nzoom = 10\n"),
            Err(ConfigError::Coverage { .. })
        ));
    }

    #[test]
    fn test_parse_zoom_levels() {
        assert_eq!(
            parse_zoom_levels("c", "3,6-8").unwrap().into_iter().collect::<Vec<_>>(),
            vec![3, 6, 7, 8]
        );
        assert!(parse_zoom_levels("c", "8-6").is_err());
        assert!(parse_zoom_levels("c", "a").is_err());
    }
}
