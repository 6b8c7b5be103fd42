//! Content and image extraction
//!
//! Turns captured markup into an [`ExtractionResult`]: a platform JSON path
//! when the page embeds one, otherwise readability article extraction with
//! heuristic and junk-strip fallbacks. Images from the extracted body are
//! filtered, optionally probed over the network, rewritten through the
//! same-origin proxy and capped.

pub mod article;
pub mod fallback;
pub mod images;
pub mod platform;
pub mod probe;
pub mod readability;
pub mod serialize;

use futures::future::join_all;
use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;

use crate::anomaly::find_block_keyword;
use crate::classifier::is_blocked_format_name;
use crate::config::ConfigHandle;
use crate::utils::{
    MAX_HTML_BYTES, MAX_PROBED_IMAGES, MAX_RESULT_IMAGES, resolve_normalized, to_proxy_url,
    truncate_plain_text,
};

pub use images::{
    BodyImage, ImageCandidate, ImageVerdict, RejectReason, body_images, collect_metadata,
    evaluate,
};
pub use platform::{PlatformImage, PlatformPost, extract_platform_post};
pub use probe::{HttpImageProber, ImageProber, ProbedImage};
pub use article::ReadabilityExtractor;
pub use readability::HeuristicExtractor;

static STYLE_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("BUG: hardcoded style regex")
});

/// Title of the synthetic result for a direct image URL.
pub const DIRECT_IMAGE_TITLE: &str = "图片核查";

/// Output of an [`ArticleExtractor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub title: String,
    pub content_html: String,
    pub plain_text: String,
}

/// Main-content extraction over a full document.
pub trait ArticleExtractor: Send + Sync {
    /// `None` when no article could be found.
    fn extract(&self, html: &str, base_url: &str) -> Option<Article>;
}

/// What the verification loop and the caller receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub title: String,
    pub body_html: String,
    /// At most 20,000 characters; longer text carries a truncation marker.
    pub plain_text: String,
    /// Proxied image URLs, first-seen order, at most four.
    pub images: Vec<String>,
    pub source_url: String,
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Could not parse an article from {0}")]
    Unparseable(String),

    #[error("Page too large to extract: {bytes} bytes")]
    TooLarge { bytes: usize },
}

/// Result for a URL that is itself an image.
pub fn synthesize_image_result(url: &str, proxy_base: &str) -> ExtractionResult {
    let proxied = to_proxy_url(proxy_base, url);
    ExtractionResult {
        title: DIRECT_IMAGE_TITLE.to_string(),
        body_html: format!(
            "<img src=\"{}\">",
            html_escape::encode_double_quoted_attribute(&proxied)
        ),
        plain_text: String::new(),
        images: vec![proxied],
        source_url: url.to_string(),
    }
}

pub struct Extractor {
    article: Arc<dyn ArticleExtractor>,
    prober: Arc<dyn ImageProber>,
    config: Arc<ConfigHandle>,
}

impl Extractor {
    pub fn new(
        article: Arc<dyn ArticleExtractor>,
        prober: Arc<dyn ImageProber>,
        config: Arc<ConfigHandle>,
    ) -> Self {
        Self {
            article,
            prober,
            config,
        }
    }

    /// Readability extraction and HTTP probing with the configured timeout.
    pub fn with_defaults(config: Arc<ConfigHandle>) -> Self {
        let timeout = Duration::from_secs(config.get().acquisition.probe_timeout_secs);
        Self::new(
            Arc::new(ReadabilityExtractor::default()),
            Arc::new(HttpImageProber::new(timeout)),
            config,
        )
    }

    pub async fn extract(
        &self,
        html: &str,
        source_url: &str,
        is_platform: bool,
    ) -> Result<ExtractionResult, ExtractionError> {
        if html.len() > MAX_HTML_BYTES {
            return Err(ExtractionError::TooLarge { bytes: html.len() });
        }
        let proxy_base = self.config.get().acquisition.proxy_base.clone();

        if is_platform && let Some(post) = extract_platform_post(html) {
            tracing::debug!(url = source_url, "Using embedded platform data");
            return Ok(self.from_platform_post(post, source_url, &proxy_base).await);
        }

        let cleaned = STYLE_BLOCK.replace_all(html, "");
        let article = match self
            .article
            .extract(&cleaned, source_url)
            .or_else(|| fallback::strip_to_body(&cleaned))
        {
            Some(article) => article,
            None if find_block_keyword(html).is_some() => {
                tracing::warn!(url = source_url, "Empty page with block keywords");
                fallback::unavailable_article()
            }
            None => return Err(ExtractionError::Unparseable(source_url.to_string())),
        };

        let metadata = collect_metadata(html, source_url);
        let body = body_images(&article.content_html, source_url, &metadata);

        let mut candidates: Vec<ImageCandidate> =
            body.iter().filter_map(|b| b.candidate.clone()).collect();
        let verdicts = self.screen(&mut candidates, is_platform).await;
        let verdict_of: HashMap<&str, ImageVerdict> = candidates
            .iter()
            .zip(&verdicts)
            .map(|(c, v)| (c.normalized_url.as_str(), *v))
            .collect();

        let (body_html, kept) =
            rewrite_body(&article.content_html, &body, &verdict_of, &proxy_base);

        Ok(ExtractionResult {
            title: article.title,
            body_html,
            plain_text: truncate_plain_text(&article.plain_text),
            images: kept,
            source_url: source_url.to_string(),
        })
    }

    /// Post pictures become the image list; inline `<img>`s in the post
    /// text (emoji, stickers) go through the same filter and proxy rewrite
    /// as a generic body.
    async fn from_platform_post(
        &self,
        post: PlatformPost,
        source_url: &str,
        proxy_base: &str,
    ) -> ExtractionResult {
        let mut candidates: Vec<ImageCandidate> = post
            .images
            .iter()
            .filter_map(|img| {
                let url = resolve_normalized(source_url, &img.url)?;
                Some(ImageCandidate::new(url).with_size(img.width, img.height))
            })
            .collect();
        let picture_count = candidates.len();

        let inline = body_images(&post.body_html, source_url, &HashMap::new());
        candidates.extend(inline.iter().filter_map(|b| b.candidate.clone()));
        let verdicts = self.screen(&mut candidates, true).await;

        let (pictures, inline_candidates) = candidates.split_at(picture_count);
        let (picture_verdicts, inline_verdicts) = verdicts.split_at(picture_count);

        let verdict_of: HashMap<&str, ImageVerdict> = inline_candidates
            .iter()
            .zip(inline_verdicts)
            .map(|(c, v)| (c.normalized_url.as_str(), *v))
            .collect();
        let (body_html, _) = rewrite_body(&post.body_html, &inline, &verdict_of, proxy_base);

        let kept = pictures
            .iter()
            .zip(picture_verdicts)
            .filter(|(_, v)| **v == ImageVerdict::Keep)
            .map(|(c, _)| c.normalized_url.as_str());

        ExtractionResult {
            title: post.title,
            body_html,
            plain_text: truncate_plain_text(&post.plain_text),
            images: cap_and_proxy(kept, proxy_base),
            source_url: source_url.to_string(),
        }
    }

    /// Filter, probe what is still unknown, filter again.
    async fn screen(
        &self,
        candidates: &mut [ImageCandidate],
        is_platform: bool,
    ) -> Vec<ImageVerdict> {
        let mut verdicts: Vec<ImageVerdict> =
            candidates.iter().map(|c| evaluate(c, is_platform)).collect();

        let mut seen = HashSet::new();
        let to_probe: Vec<String> = candidates
            .iter()
            .zip(&verdicts)
            .filter(|(c, v)| **v == ImageVerdict::Keep && c.has_unknown_size())
            .map(|(c, _)| c.normalized_url.clone())
            .filter(|url| seen.insert(url.clone()))
            .take(MAX_PROBED_IMAGES)
            .collect();
        if to_probe.is_empty() {
            return verdicts;
        }

        tracing::debug!(count = to_probe.len(), "Probing images with unknown size");
        let probed = join_all(to_probe.iter().map(|url| self.prober.probe(url))).await;
        let results: HashMap<&str, ProbedImage> = to_probe
            .iter()
            .zip(probed)
            .filter_map(|(url, p)| p.map(|p| (url.as_str(), p)))
            .collect();

        for (candidate, verdict) in candidates.iter_mut().zip(verdicts.iter_mut()) {
            let Some(probe) = results.get(candidate.normalized_url.as_str()) else {
                continue;
            };
            if probe.format.as_deref().is_some_and(is_blocked_format_name) {
                *verdict = ImageVerdict::Reject(RejectReason::BlockedFormat);
                continue;
            }
            // A successful probe is authoritative, including a 0 side
            candidate.width = candidate.width.or(Some(probe.width));
            candidate.height = candidate.height.or(Some(probe.height));
            candidate.has_transparency = probe.has_alpha;
            *verdict = evaluate(candidate, is_platform);
        }

        verdicts
    }
}

/// Apply verdicts to the body: drop rejected and sourceless `<img>`s,
/// proxy the rest. Returns the new body and the capped image list.
fn rewrite_body(
    content_html: &str,
    body: &[BodyImage],
    verdict_of: &HashMap<&str, ImageVerdict>,
    proxy_base: &str,
) -> (String, Vec<String>) {
    let fragment = Html::parse_fragment(content_html);
    let mut plan = serialize::RewritePlan::default();
    let mut kept = Vec::new();

    for (element, body_image) in images::img_elements(&fragment).into_iter().zip(body) {
        let keep = body_image.candidate.as_ref().filter(|c| {
            verdict_of.get(c.normalized_url.as_str()) == Some(&ImageVerdict::Keep)
        });
        match keep {
            Some(candidate) => {
                plan.image_src
                    .insert(element.id(), to_proxy_url(proxy_base, &candidate.normalized_url));
                kept.push(candidate.normalized_url.as_str());
            }
            None => {
                plan.remove.insert(element.id());
            }
        }
    }

    let html = serialize::serialize_inner(&fragment.root_element(), &plan);
    (html, cap_and_proxy(kept.into_iter(), proxy_base))
}

/// Dedupe in first-seen order, proxy, cap at [`MAX_RESULT_IMAGES`].
fn cap_and_proxy<'a>(urls: impl Iterator<Item = &'a str>, proxy_base: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.filter(|url| seen.insert(*url))
        .take(MAX_RESULT_IMAGES)
        .map(|url| to_proxy_url(proxy_base, url))
        .collect()
}
