//! Shared configuration constants for veracity checking
//!
//! This module contains default values and limits used throughout the
//! acquisition, extraction and verification stages so the same numbers are
//! never spelled twice.

/// Maximum characters of plain text handed to the reasoning service.
///
/// Longer articles are cut at this many characters and
/// [`TRUNCATION_MARKER`] is appended.
pub const MAX_PLAIN_TEXT_CHARS: usize = 20_000;

/// Appended to plain text that was cut at [`MAX_PLAIN_TEXT_CHARS`].
pub const TRUNCATION_MARKER: &str = "\n\n...(内容过长，已截断)";

/// Markup larger than this (bytes) is refused by the extractor.
pub const MAX_HTML_BYTES: usize = 10 * 1024 * 1024;

/// Maximum images kept per extraction result.
pub const MAX_RESULT_IMAGES: usize = 4;

/// Maximum images with unknown dimensions probed over the network per page.
pub const MAX_PROBED_IMAGES: usize = 15;

/// Maximum bytes read by the image prober before giving up.
pub const MAX_PROBE_BYTES: usize = 512 * 1024;

/// Images narrower or shorter than this (in px) are treated as icons/thumbnails.
pub const MIN_IMAGE_DIMENSION: u32 = 201;

/// Images wider or taller than this (in px) are treated as sprites or banners.
pub const MAX_IMAGE_DIMENSION: u32 = 10_000;

/// Fixed placeholder size served by the micro-blogging platform for filler
/// images (emoji cards, default covers).
pub const PLATFORM_FILLER_DIMENSIONS: (u32, u32) = (272, 272);

/// Markup shorter than this (bytes) for a non-image URL is suspicious.
pub const MIN_PLAUSIBLE_MARKUP_BYTES: usize = 512;

/// Anomaly records kept before the oldest is evicted.
pub const MAX_ANOMALY_RECORDS: usize = 50;

/// Total reasoning calls per verification.
pub const DEFAULT_MAX_ROUNDS: u32 = 4;

/// Upper bound for polling an interstitial verification page (seconds).
pub const INTERSTITIAL_WAIT_SECS: u64 = 15;

/// Per-image load timeout during the settle phase (milliseconds).
pub const IMAGE_LOAD_TIMEOUT_MS: u64 = 3_000;

/// Extra delay on known slow/dynamic sites (milliseconds).
pub const SLOW_SITE_DELAY_MS: u64 = 3_000;

/// Consecutive scrolls without height growth that end the platform scroll loop.
pub const SCROLL_STALL_LIMIT: u32 = 3;

/// Hard cap on platform scroll iterations.
pub const MAX_SCROLL_ITERATIONS: u32 = 20;

/// Default same-origin image proxy path.
pub const DEFAULT_PROXY_BASE: &str = "/api/image-proxy";

/// Chrome user agents rotated per acquisition.
///
/// Kept within a few releases of current stable; Chrome ships roughly
/// every 4 weeks. Reference: https://chromiumdash.appspot.com/schedule
pub const CHROME_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.6834.160 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.6778.205 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.6778.204 Safari/537.36",
];

/// Default user agent for non-browser HTTP traffic (image probing).
pub const CHROME_USER_AGENT: &str = CHROME_USER_AGENTS[0];
