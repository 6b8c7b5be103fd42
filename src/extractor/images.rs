//! Image metadata collection and admissibility filtering.

use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::classifier::{is_domain_blocked, is_format_blocked};
use crate::utils::{
    MAX_IMAGE_DIMENSION, MIN_IMAGE_DIMENSION, PLATFORM_FILLER_DIMENSIONS, resolve_normalized,
};

static IMAGE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"img, source[type^="image/"]"#).expect("BUG: hardcoded image selector")
});

pub(crate) static IMG_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img").expect("BUG: hardcoded img selector"));

/// Lazy-load attributes, in preference order, checked before `src`.
const LAZY_SRC_ATTRS: &[&str] = &[
    "data-src",
    "data-original",
    "data-lazy-src",
    "data-actualsrc",
    "data-url",
];

/// Everything known about one image reference.
///
/// `None` dimensions are unknown and never reject on size grounds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    pub normalized_url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub load_failed: bool,
    pub has_transparency: bool,
}

impl ImageCandidate {
    pub fn new(normalized_url: impl Into<String>) -> Self {
        Self {
            normalized_url: normalized_url.into(),
            width: None,
            height: None,
            load_failed: false,
            has_transparency: false,
        }
    }

    #[must_use]
    pub fn with_size(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn has_unknown_size(&self) -> bool {
        self.width.is_none() || self.height.is_none()
    }

    /// Fill unknown dimensions from `other` without overriding known ones.
    fn merge(&mut self, other: &ImageCandidate) {
        if self.width.is_none() {
            self.width = other.width;
        }
        if self.height.is_none() {
            self.height = other.height;
        }
        self.load_failed &= other.load_failed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    InlineData,
    BlockedFormat,
    BlockedDomain,
    PlatformFiller,
    TooLarge,
    TooSmall,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageVerdict {
    Keep,
    Reject(RejectReason),
}

/// Apply the admissibility rules to one candidate.
#[must_use]
pub fn evaluate(candidate: &ImageCandidate, is_platform: bool) -> ImageVerdict {
    let url = candidate.normalized_url.as_str();

    if url.starts_with("data:") {
        return ImageVerdict::Reject(RejectReason::InlineData);
    }
    if is_format_blocked(url) {
        return ImageVerdict::Reject(RejectReason::BlockedFormat);
    }
    if is_domain_blocked(url) {
        return ImageVerdict::Reject(RejectReason::BlockedDomain);
    }

    if is_platform
        && let (Some(w), Some(h)) = (candidate.width, candidate.height)
        && (w, h) == PLATFORM_FILLER_DIMENSIONS
    {
        return ImageVerdict::Reject(RejectReason::PlatformFiller);
    }

    let known = [candidate.width, candidate.height];
    if known.iter().flatten().any(|&d| d > MAX_IMAGE_DIMENSION) {
        return ImageVerdict::Reject(RejectReason::TooLarge);
    }
    if known.iter().flatten().any(|&d| d < MIN_IMAGE_DIMENSION) {
        return ImageVerdict::Reject(RejectReason::TooSmall);
    }

    ImageVerdict::Keep
}

/// Parse a dimension attribute. `0`, empty and non-numeric values are unknown.
fn parse_dimension(value: Option<&str>) -> Option<u32> {
    let value = value?.trim();
    let digits = value.strip_suffix("px").unwrap_or(value).trim();
    let parsed = digits
        .parse::<u32>()
        .ok()
        .or_else(|| digits.parse::<f64>().ok().map(|f| f.round() as u32))?;
    (parsed > 0).then_some(parsed)
}

fn first_srcset_url(srcset: &str) -> Option<&str> {
    srcset
        .split(',')
        .next()
        .and_then(|entry| entry.split_whitespace().next())
        .filter(|s| !s.is_empty())
}

/// Raw source reference of an `<img>`/`<source>`, lazy attributes first.
fn raw_source<'a>(element: &ElementRef<'a>) -> Option<&'a str> {
    let el = element.value();
    LAZY_SRC_ATTRS
        .iter()
        .filter_map(|attr| el.attr(attr))
        .map(str::trim)
        .find(|v| !v.is_empty() && !v.starts_with("data:"))
        .or_else(|| el.attr("src").map(str::trim).filter(|v| !v.is_empty()))
        .or_else(|| el.attr("srcset").and_then(first_srcset_url))
}

/// Candidate for one element, or `None` if it has no usable source.
///
/// Inline `data:` sources are kept verbatim so the filter can reject them.
pub fn candidate_from_element(element: &ElementRef, base_url: &str) -> Option<ImageCandidate> {
    let raw = raw_source(element)?;
    let normalized_url = if raw.starts_with("data:") {
        raw.to_string()
    } else {
        resolve_normalized(base_url, raw)?
    };

    let el = element.value();
    // Explicit attributes beat sizes observed while rendering
    let width = parse_dimension(el.attr("width"))
        .or_else(|| parse_dimension(el.attr("data-natural-width")));
    let height = parse_dimension(el.attr("height"))
        .or_else(|| parse_dimension(el.attr("data-natural-height")));

    Some(ImageCandidate {
        normalized_url,
        width,
        height,
        load_failed: el.attr("data-load-failed") == Some("true"),
        has_transparency: false,
    })
}

/// Scan the whole document for image references.
///
/// Keyed by normalized URL; repeated references pool what they know.
pub fn collect_metadata(html: &str, base_url: &str) -> HashMap<String, ImageCandidate> {
    let document = Html::parse_document(html);
    let mut out: HashMap<String, ImageCandidate> = HashMap::new();

    for element in document.select(&IMAGE_SELECTOR) {
        let Some(candidate) = candidate_from_element(&element, base_url) else {
            continue;
        };
        match out.get_mut(&candidate.normalized_url) {
            Some(existing) => existing.merge(&candidate),
            None => {
                out.insert(candidate.normalized_url.clone(), candidate);
            }
        }
    }

    out
}

/// One `<img>` in the extracted body, in document order.
#[derive(Debug, Clone)]
pub struct BodyImage {
    /// `None` when the element has no usable source; such elements are removed.
    pub candidate: Option<ImageCandidate>,
}

/// Candidates for every `<img>` of a body fragment, enriched from the
/// page-wide metadata.
pub fn body_images(
    body_html: &str,
    base_url: &str,
    metadata: &HashMap<String, ImageCandidate>,
) -> Vec<BodyImage> {
    let fragment = Html::parse_fragment(body_html);
    let images = fragment
        .root_element()
        .select(&IMG_SELECTOR)
        .map(|element| {
            let candidate = candidate_from_element(&element, base_url).map(|mut c| {
                if let Some(known) = metadata.get(&c.normalized_url) {
                    c.merge(known);
                }
                c
            });
            BodyImage { candidate }
        })
        .collect();
    images
}

/// The body's `<img>` elements, same order as [`body_images`].
pub fn img_elements(fragment: &Html) -> Vec<ElementRef<'_>> {
    fragment.root_element().select(&IMG_SELECTOR).collect()
}
