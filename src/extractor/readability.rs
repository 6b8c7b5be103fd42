//! Readability-style main-content extraction.
//!
//! Paragraph-like elements score their parent and grandparent by text
//! length and punctuation; container tags and class/id names nudge the
//! score; link-heavy containers are discounted. The best container is
//! merged with qualifying siblings and cleaned of junk before
//! serialization.

use ego_tree::NodeId;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use super::serialize::{RewritePlan, serialize_outer, text_content};
use super::{Article, ArticleExtractor};
use crate::utils::normalize_whitespace;

/// Paragraph-like elements shorter than this (chars) contribute nothing.
const MIN_PARAGRAPH_CHARS: usize = 25;

/// Extractions with less plain text than this are treated as failures.
pub(crate) const MIN_ARTICLE_CHARS: usize = 80;

static SCORABLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("p, pre, td").expect("BUG: hardcoded scorable selector"));

static OG_TITLE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[property="og:title"], meta[name="og:title"]"#)
        .expect("BUG: hardcoded og:title selector")
});

static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("BUG: hardcoded title selector"));

static H1_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1").expect("BUG: hardcoded h1 selector"));

static LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("BUG: hardcoded link selector"));

/// Removed from the chosen content regardless of score.
static JUNK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "script, style, noscript, iframe, form, nav, aside, footer, button, input, select, \
         textarea, object, embed, svg, canvas",
    )
    .expect("BUG: hardcoded junk selector")
});

static CONTAINER_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div, section, ul, ol, table, header").expect("BUG: hardcoded container selector")
});

static UNLIKELY_CANDIDATES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)banner|breadcrumbs|combx|comment|community|disqus|extra|foot|header|legends|menu|related|remark|replies|rss|shoutbox|sidebar|skyscraper|social|sponsor|supplemental|ad-break|agegate|pagination|pager|popup|share|recommend",
    )
    .expect("BUG: hardcoded unlikely-candidates regex")
});

static MAYBE_CANDIDATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)and|article|body|column|content|main|shadow")
        .expect("BUG: hardcoded maybe-candidate regex")
});

static POSITIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)article|body|content|entry|hentry|h-entry|main|page|post|text|blog|story|detail",
    )
    .expect("BUG: hardcoded positive regex")
});

static NEGATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)-ad-|hidden|banner|combx|comment|com-|contact|foot|footer|footnote|gdpr|masthead|media|meta|outbrain|promo|related|scroll|share|shoutbox|sidebar|skyscraper|sponsor|shopping|tags|tool|widget",
    )
    .expect("BUG: hardcoded negative regex")
});

/// The default [`ArticleExtractor`].
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicExtractor;

impl ArticleExtractor for HeuristicExtractor {
    fn extract(&self, html: &str, _base_url: &str) -> Option<Article> {
        let document = Html::parse_document(html);
        let title = document_title(&document);

        let scores = score_candidates(&document);
        let (best, best_score) = scores
            .values()
            .map(|&(el, score)| (el, score * (1.0 - link_density(&el))))
            .max_by(|a, b| a.1.total_cmp(&b.1))?;

        let parts = merge_siblings(best, best_score, &scores);

        let mut remove = HashSet::new();
        for part in &parts {
            collect_junk(part, &mut remove);
        }
        let plan = RewritePlan::removing(remove);

        let content_html: String = parts.iter().map(|p| serialize_outer(p, &plan)).collect();
        let plain_text = normalize_whitespace(
            &parts
                .iter()
                .map(|p| text_content(p, &plan.remove))
                .collect::<Vec<_>>()
                .join("\n"),
        );

        if plain_text.chars().count() < MIN_ARTICLE_CHARS {
            tracing::debug!(
                chars = plain_text.chars().count(),
                "Heuristic extraction too short, rejecting"
            );
            return None;
        }

        Some(Article {
            title,
            content_html,
            plain_text,
        })
    }
}

/// og:title, then `<title>`, then the first `<h1>`.
pub(crate) fn document_title(document: &Html) -> String {
    let og = document
        .select(&OG_TITLE_SELECTOR)
        .filter_map(|m| m.value().attr("content"))
        .map(str::trim)
        .find(|t| !t.is_empty());
    if let Some(title) = og {
        return title.to_string();
    }

    [&*TITLE_SELECTOR, &*H1_SELECTOR]
        .into_iter()
        .find_map(|sel| {
            document
                .select(sel)
                .map(|el| normalize_whitespace(&el.text().collect::<String>()))
                .find(|t| !t.is_empty())
        })
        .unwrap_or_default()
}

fn class_and_id(el: &ElementRef) -> String {
    let v = el.value();
    format!(
        "{} {}",
        v.attr("class").unwrap_or_default(),
        v.attr("id").unwrap_or_default()
    )
}

fn is_unlikely(el: &ElementRef) -> bool {
    let tag = el.value().name();
    if tag == "body" || tag == "article" || tag == "main" {
        return false;
    }
    let names = class_and_id(el);
    UNLIKELY_CANDIDATES.is_match(&names) && !MAYBE_CANDIDATE.is_match(&names)
}

fn class_weight(el: &ElementRef) -> f64 {
    let v = el.value();
    let mut weight = 0.0;
    for value in [v.attr("class"), v.attr("id")].into_iter().flatten() {
        if NEGATIVE.is_match(value) {
            weight -= 25.0;
        }
        if POSITIVE.is_match(value) {
            weight += 25.0;
        }
    }
    weight
}

fn tag_weight(tag: &str) -> f64 {
    match tag {
        "div" | "article" | "section" | "main" => 5.0,
        "pre" | "td" | "blockquote" => 3.0,
        "address" | "ol" | "ul" | "dl" | "dd" | "dt" | "li" | "form" => -3.0,
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "th" => -5.0,
        _ => 0.0,
    }
}

fn text_len(el: &ElementRef) -> usize {
    el.text().flat_map(str::chars).filter(|c| !c.is_whitespace()).count()
}

/// Share of an element's text that sits inside links.
pub(crate) fn link_density(el: &ElementRef) -> f64 {
    let total = text_len(el);
    if total == 0 {
        return 0.0;
    }
    let linked: usize = el.select(&LINK_SELECTOR).map(|a| text_len(&a)).sum();
    linked as f64 / total as f64
}

fn content_score(text: &str) -> f64 {
    let commas = text.chars().filter(|c| matches!(c, ',' | '，' | '、')).count();
    let length_bonus = (text.chars().count() / 100).min(3);
    1.0 + commas as f64 + length_bonus as f64
}

type Scores<'a> = HashMap<NodeId, (ElementRef<'a>, f64)>;

fn score_candidates(document: &Html) -> Scores<'_> {
    let mut scores: Scores<'_> = HashMap::new();

    for paragraph in document.select(&SCORABLE_SELECTOR) {
        let ancestors: Vec<ElementRef> = paragraph
            .ancestors()
            .filter_map(ElementRef::wrap)
            .take_while(|a| a.value().name() != "html")
            .collect();
        if ancestors.iter().any(is_unlikely) || is_unlikely(&paragraph) {
            continue;
        }

        let text = paragraph.text().collect::<String>();
        if text.trim().chars().count() < MIN_PARAGRAPH_CHARS {
            continue;
        }
        let score = content_score(text.trim());

        for (level, ancestor) in ancestors.iter().take(2).enumerate() {
            let entry = scores.entry(ancestor.id()).or_insert_with(|| {
                let initial = tag_weight(ancestor.value().name()) + class_weight(ancestor);
                (*ancestor, initial)
            });
            entry.1 += if level == 0 { score } else { score / 2.0 };
        }
    }

    scores
}

/// The best candidate plus siblings that look like part of the same article.
fn merge_siblings<'a>(best: ElementRef<'a>, best_score: f64, scores: &Scores<'a>) -> Vec<ElementRef<'a>> {
    let Some(parent) = best.parent().and_then(ElementRef::wrap) else {
        return vec![best];
    };
    if parent.value().name() == "html" {
        return vec![best];
    }

    let threshold = (best_score * 0.2).max(10.0);
    parent
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|sibling| {
            if sibling.id() == best.id() {
                return true;
            }
            let same_class = sibling.value().attr("class").is_some()
                && sibling.value().attr("class") == best.value().attr("class");
            let bonus = if same_class { best_score * 0.2 } else { 0.0 };
            if let Some(&(_, score)) = scores.get(&sibling.id())
                && score + bonus >= threshold
            {
                return true;
            }
            if sibling.value().name() == "p" {
                let len = text_len(sibling);
                let density = link_density(sibling);
                return (len > 80 && density < 0.25) || (len > 30 && density == 0.0);
            }
            false
        })
        .collect()
}

/// Junk tags and unlikely, link-heavy containers under `root`.
fn collect_junk(root: &ElementRef, remove: &mut HashSet<NodeId>) {
    remove.extend(root.select(&JUNK_SELECTOR).map(|el| el.id()));

    for container in root.select(&CONTAINER_SELECTOR) {
        if remove.contains(&container.id()) {
            continue;
        }
        let names = class_and_id(&container);
        let unlikely = UNLIKELY_CANDIDATES.is_match(&names) && !MAYBE_CANDIDATE.is_match(&names);
        let has_images = container.select(&super::images::IMG_SELECTOR).next().is_some();
        if (unlikely && !has_images) || (link_density(&container) > 0.5 && text_len(&container) < 200)
        {
            remove.insert(container.id());
        }
    }
}
