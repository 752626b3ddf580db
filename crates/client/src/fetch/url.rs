//! URL resolution for request interception and cache keys.

use url::Url;

/// Error type for URL resolution failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Resolve a request URL against the site origin.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Resolve relative paths (`/index.html`) against `origin`
/// 3. Reject anything that is not http(s)
/// 4. Remove fragment (#...); the query string is kept as-is
///
/// The host is lower-cased by the URL parser, so equal resources map to
/// the same cache entry.
pub fn resolve(origin: &Url, input: &str) -> Result<Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let mut parsed = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            origin.join(trimmed).map_err(|e| UrlError::InvalidUrl(e.to_string()))?
        }
        Err(e) => return Err(UrlError::InvalidUrl(e.to_string())),
    };

    if !is_http(&parsed) {
        return Err(UrlError::UnsupportedScheme(parsed.scheme().to_string()));
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Whether the URL uses a scheme the worker intercepts.
fn is_http(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}
