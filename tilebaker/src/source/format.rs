//! Tile image format helpers.
//!
//! Formats are carried as MIME types (`image/png`). The packaged container
//! and the cache file names use the short extension derived from it.

/// Default tile MIME type.
pub const DEFAULT_TILE_FORMAT: &str = "image/png";

/// Infers the tile MIME type from the extension in a URL template.
///
/// Only the last path segment is considered and query strings are ignored.
/// Returns `None` when the extension is absent or not an image type.
pub fn infer_format(url_template: &str) -> Option<String> {
    let path = url_template
        .split(['?', '#'])
        .next()
        .unwrap_or(url_template);
    let segment = path.rsplit('/').next()?;
    if !segment.contains('.') {
        return None;
    }

    let mime = mime_guess::from_path(segment).first()?;
    if mime.type_() != mime_guess::mime::IMAGE {
        return None;
    }
    Some(normalize_format(mime.essence_str()))
}

/// Canonical spelling of an image MIME type (`image/jpg` → `image/jpeg`).
pub fn normalize_format(format: &str) -> String {
    let format = format.trim().to_lowercase();
    match format.as_str() {
        "image/jpg" | "image/jpe" | "image/pjpeg" => "image/jpeg".to_string(),
        _ => format,
    }
}

/// File extension used for tiles of a MIME type (`image/png` → `png`).
///
/// `jpg` and `jpe` are written as `jpeg`. A bare extension is accepted too.
pub fn format_extension(format: &str) -> String {
    let subtype = format
        .rsplit('/')
        .next()
        .unwrap_or(format)
        .split(['+', ';'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    match subtype.as_str() {
        "jpg" | "jpe" | "pjpeg" => "jpeg".to_string(),
        _ => subtype,
    }
}
