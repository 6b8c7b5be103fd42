//! URL manipulation utilities.
//!
//! Resolution of relative references, fragment normalisation and the
//! same-origin image proxy rewrite contract.

use url::Url;

/// Check if a URL is an absolute http(s) URL
#[must_use]
pub fn is_valid_url(url: &str) -> bool {
    if url.is_empty() {
        return false;
    }

    if url.starts_with("data:") || url.starts_with("javascript:") || url.starts_with("mailto:") {
        return false;
    }

    match Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// Resolve `reference` against `base` and strip the fragment.
///
/// Protocol-relative references (`//cdn.example.com/a.jpg`) inherit the
/// base scheme. Returns `None` for non-http results (data:, blob:, javascript:).
#[must_use]
pub fn resolve_normalized(base: &str, reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    let mut resolved = match Url::parse(reference) {
        Ok(absolute) => absolute,
        Err(_) => Url::parse(base).ok()?.join(reference).ok()?,
    };

    if !matches!(resolved.scheme(), "http" | "https") {
        return None;
    }

    resolved.set_fragment(None);
    Some(resolved.to_string())
}

/// Lower-cased host of a URL, if it parses.
#[must_use]
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
}

/// Rewrite an image URL to go through the same-origin proxy.
///
/// Contract: `<proxy-base>?url=<percent-encoded original>`.
#[must_use]
pub fn to_proxy_url(proxy_base: &str, original: &str) -> String {
    format!("{proxy_base}?url={}", urlencoding::encode(original))
}

/// Undo [`to_proxy_url`]. URLs that are not proxied are returned unchanged.
#[must_use]
pub fn from_proxy_url(proxy_base: &str, url: &str) -> String {
    let Some(rest) = url.strip_prefix(proxy_base) else {
        return url.to_string();
    };
    let Some(query) = rest.strip_prefix('?') else {
        return url.to_string();
    };

    for pair in query.split('&') {
        if let Some(encoded) = pair.strip_prefix("url=") {
            return match urlencoding::decode(encoded) {
                Ok(decoded) => decoded.into_owned(),
                Err(_) => url.to_string(),
            };
        }
    }

    url.to_string()
}
