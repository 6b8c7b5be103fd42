//! Bot-block heuristics over captured markup.

use regex::Regex;
use std::sync::LazyLock;

use crate::classifier::is_direct_image;
use crate::utils::MIN_PLAUSIBLE_MARKUP_BYTES;

/// Phrases that only appear on verification, challenge or block pages.
/// Matched against the raw markup, since challenge pages often render them
/// from script.
pub const BLOCK_KEYWORDS: &[&str] = &[
    "验证码",
    "安全验证",
    "访问验证",
    "请完成验证",
    "人机验证",
    "访问过于频繁",
];

/// ASCII challenge phrases. These also occur in ordinary pages (widget
/// script URLs, class names, article prose), so they only count in the
/// visible text of a short page or in its `<title>`.
pub const CHALLENGE_PHRASES: &[&str] = &[
    "captcha",
    "access denied",
    "just a moment",
    "sina visitor system",
    "unusual traffic",
    "403 forbidden",
    "are you a robot",
];

/// Visible text longer than this is an article, not a challenge page.
const CHALLENGE_TEXT_MAX_CHARS: usize = 2_000;

static INVISIBLE_BLOCKS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)<script\b[^>]*>.*?</script>|<style\b[^>]*>.*?</style>|<noscript\b[^>]*>.*?</noscript>|<template\b[^>]*>.*?</template>",
    )
    .expect("BUG: hardcoded invisible-block regex")
});

static TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("BUG: hardcoded tag regex"));

static TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<title\b[^>]*>(.*?)</title>").expect("BUG: hardcoded title regex")
});

/// Lowercased text a reader would see, without scripts, styles or markup.
fn visible_text(html: &str) -> String {
    let without_blocks = INVISIBLE_BLOCKS.replace_all(html, " ");
    let text = TAG.replace_all(&without_blocks, " ");
    html_escape::decode_html_entities(&text)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Keyword found in `html`, if any.
///
/// [`BLOCK_KEYWORDS`] match anywhere in the markup. [`CHALLENGE_PHRASES`]
/// match case-insensitively in the `<title>`, or in the visible text when
/// that text is short.
#[must_use]
pub fn find_block_keyword(html: &str) -> Option<&'static str> {
    if let Some(keyword) = BLOCK_KEYWORDS.iter().copied().find(|k| html.contains(k)) {
        return Some(keyword);
    }

    let title = TITLE
        .captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_default();
    let text = visible_text(html);
    let text_is_short = text.chars().count() <= CHALLENGE_TEXT_MAX_CHARS;

    CHALLENGE_PHRASES
        .iter()
        .copied()
        .find(|phrase| title.contains(phrase) || (text_is_short && text.contains(phrase)))
}

/// Decide whether captured markup looks like a bot block.
///
/// Returns the reason to record, or `None` for a plausible page.
#[must_use]
pub fn detect(html: &str, url: &str) -> Option<String> {
    if let Some(keyword) = find_block_keyword(html) {
        return Some(format!("页面包含验证/拦截关键词: {keyword}"));
    }

    if !is_direct_image(url) && html.len() < MIN_PLAUSIBLE_MARKUP_BYTES {
        return Some(format!("页面内容过短 ({} 字节)", html.len()));
    }

    None
}
