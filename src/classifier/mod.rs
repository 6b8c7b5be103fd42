//! URL classification
//!
//! Pure, synchronous predicates over URL strings. Used as a fast-reject gate
//! before any browser is launched and as a per-image filter during
//! extraction. Nothing in here touches the network.

use url::Url;

/// Extensions that mark a URL as a raw image resource.
const DIRECT_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// Extensions of downloadable, non-HTML resources that are never rendered.
const BLOCKED_DOWNLOAD_EXTENSIONS: &[&str] = &[
    // archives
    "zip", "rar", "7z", "tar", "gz", "tgz", "bz2", "xz",
    // office documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods",
    // executables and installers
    "exe", "msi", "dmg", "pkg", "apk", "ipa", "deb", "rpm", "iso", "bin",
    // media
    "mp3", "mp4", "m4a", "avi", "mov", "mkv", "flv", "wmv", "wav", "flac", "webm",
];

/// Animated or vector formats rejected as article images.
const BLOCKED_IMAGE_FORMATS: &[&str] = &["gif", "svg", "svgz", "ico", "apng"];

/// Hosts (or host suffixes) serving icons, avatars, emoji and tracking pixels.
const BLOCKED_IMAGE_DOMAINS: &[&str] = &[
    "gravatar.com",
    "qlogo.cn",
    "tvax1.sinaimg.cn",
    "tvax2.sinaimg.cn",
    "tvax3.sinaimg.cn",
    "tvax4.sinaimg.cn",
    "h5.sinaimg.cn",
    "face.t.sinajs.cn",
    "img.t.sinajs.cn",
    "simg.s.weibo.com",
    "doubleclick.net",
    "google-analytics.com",
    "googletagmanager.com",
    "hm.baidu.com",
    "cnzz.com",
];

/// Desktop hosts of the micro-blogging platform rewritten to the mobile site.
const PLATFORM_DESKTOP_HOSTS: &[&str] = &["weibo.com", "www.weibo.com"];

/// Mobile host that yields simpler markup and an embedded JSON blob.
const PLATFORM_MOBILE_HOST: &str = "m.weibo.cn";

/// Search-result listing hosts that are rejected outright.
const PLATFORM_SEARCH_HOSTS: &[&str] = &["s.weibo.com"];

/// Outcome of [`requires_special_handling`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialHandling {
    /// Fetch the URL as given.
    None,
    /// Fetch this URL instead.
    Rewrite(String),
    /// Do not fetch; the message explains why.
    Reject(String),
}

/// Lower-cased path plus query values, the places an extension can hide.
fn extension_haystacks(url: &str) -> Vec<String> {
    match Url::parse(url) {
        Ok(parsed) => {
            let mut out = vec![parsed.path().to_ascii_lowercase()];
            out.extend(
                parsed
                    .query_pairs()
                    .map(|(_, value)| value.to_ascii_lowercase()),
            );
            out
        }
        Err(_) => {
            let without_fragment = url.split('#').next().unwrap_or(url);
            without_fragment
                .split(['?', '&', '='])
                .map(str::to_ascii_lowercase)
                .collect()
        }
    }
}

fn ends_with_extension(haystack: &str, extensions: &[&str]) -> bool {
    let last_segment = haystack.rsplit('/').next().unwrap_or(haystack);
    match last_segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => extensions.contains(&ext),
        _ => false,
    }
}

fn matches_extension(url: &str, extensions: &[&str]) -> bool {
    extension_haystacks(url)
        .iter()
        .any(|h| ends_with_extension(h, extensions))
}

fn host_matches(host: &str, suffixes: &[&str]) -> bool {
    suffixes
        .iter()
        .any(|suffix| host == *suffix || host.ends_with(&format!(".{suffix}")))
}

/// True if path or query names a raw image resource.
#[must_use]
pub fn is_direct_image(url: &str) -> bool {
    matches_extension(url, DIRECT_IMAGE_EXTENSIONS)
}

/// True if path or query names a downloadable non-HTML resource.
#[must_use]
pub fn is_blocked_download(url: &str) -> bool {
    matches_extension(url, BLOCKED_DOWNLOAD_EXTENSIONS)
}

/// True if the image format is animated or vector.
///
/// Also honours format hints in query strings such as `?format=gif` or
/// `wx_fmt=gif` used by image CDNs.
#[must_use]
pub fn is_format_blocked(url: &str) -> bool {
    if matches_extension(url, BLOCKED_IMAGE_FORMATS) {
        return true;
    }

    match Url::parse(url) {
        Ok(parsed) => parsed.query_pairs().any(|(key, value)| {
            let key = key.to_ascii_lowercase();
            (key.ends_with("fmt") || key == "format")
                && BLOCKED_IMAGE_FORMATS.contains(&value.to_ascii_lowercase().as_str())
        }),
        Err(_) => false,
    }
}

/// True if a sniffed format name (`"gif"`, `"svg"`, ...) is animated or vector.
#[must_use]
pub fn is_blocked_format_name(format: &str) -> bool {
    BLOCKED_IMAGE_FORMATS.contains(&format.to_ascii_lowercase().as_str())
}

/// True if the image is served by a known low-value icon/avatar/tracker host.
#[must_use]
pub fn is_domain_blocked(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => parsed
            .host_str()
            .map(|h| host_matches(&h.to_ascii_lowercase(), BLOCKED_IMAGE_DOMAINS))
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// True if the URL belongs to the micro-blogging platform (desktop or mobile).
#[must_use]
pub fn is_platform_page(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => parsed
            .host_str()
            .map(|h| host_matches(&h.to_ascii_lowercase(), &["weibo.com", "weibo.cn"]))
            .unwrap_or(false),
        Err(_) => false,
    }
}

/// Identify platform-specific rewrites and rejections.
#[must_use]
pub fn requires_special_handling(url: &str) -> SpecialHandling {
    let Ok(mut parsed) = Url::parse(url) else {
        return SpecialHandling::None;
    };
    let Some(host) = parsed.host_str().map(str::to_ascii_lowercase) else {
        return SpecialHandling::None;
    };

    if PLATFORM_SEARCH_HOSTS.contains(&host.as_str()) {
        return SpecialHandling::Reject(
            "不支持微博搜索结果页面，请提供具体的微博正文链接".to_string(),
        );
    }

    if PLATFORM_DESKTOP_HOSTS.contains(&host.as_str()) {
        if parsed.set_host(Some(PLATFORM_MOBILE_HOST)).is_err() {
            return SpecialHandling::None;
        }
        parsed.set_fragment(None);
        return SpecialHandling::Rewrite(parsed.to_string());
    }

    SpecialHandling::None
}
