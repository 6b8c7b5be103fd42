//! Structured-data path for the micro-blogging platform's mobile pages.
//!
//! Mobile status pages embed the post as `$render_data = [{...}][0]`.
//! When that blob parses, it is a cleaner source than the rendered DOM.

use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::LazyLock;

use super::serialize::fragment_text;
use crate::utils::{normalize_whitespace, truncate_chars};

static RENDER_DATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\$render_data\s*=\s*(\[.*?\])\[0\]").expect("BUG: hardcoded render_data regex")
});

/// Characters of body text used as a title when the post has none.
const TITLE_FALLBACK_CHARS: usize = 30;

#[derive(Debug, Deserialize)]
struct RenderData {
    status: Option<Status>,
}

#[derive(Debug, Deserialize)]
struct Status {
    #[serde(default)]
    text: String,
    #[serde(default, rename = "longText")]
    long_text: Option<LongText>,
    #[serde(default)]
    status_title: Option<String>,
    #[serde(default)]
    user: Option<User>,
    #[serde(default)]
    region_name: Option<String>,
    #[serde(default)]
    pics: Vec<Pic>,
}

#[derive(Debug, Deserialize)]
struct LongText {
    #[serde(default, rename = "longTextContent")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct User {
    #[serde(default)]
    screen_name: Option<String>,
    #[serde(default)]
    verified_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Pic {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    large: Option<PicVariant>,
}

#[derive(Debug, Deserialize)]
struct PicVariant {
    url: String,
    #[serde(default)]
    geo: Option<Geo>,
}

#[derive(Debug, Deserialize)]
struct Geo {
    #[serde(default, deserialize_with = "lenient_dimension")]
    width: Option<u32>,
    #[serde(default, deserialize_with = "lenient_dimension")]
    height: Option<u32>,
}

/// Geometry arrives as numbers or numeric strings; anything else, and 0, is unknown.
fn lenient_dimension<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    let parsed = match value {
        Value::Number(n) => n.as_f64().map(|f| f.round() as u32),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.round() as u32),
        _ => None,
    };
    Ok(parsed.filter(|&d| d > 0))
}

/// One image of a platform post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformImage {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A post pulled from the embedded blob.
#[derive(Debug, Clone)]
pub struct PlatformPost {
    pub title: String,
    pub body_html: String,
    pub plain_text: String,
    pub images: Vec<PlatformImage>,
}

/// Parse the embedded blob, or `None` if absent, malformed or empty.
pub fn extract_platform_post(html: &str) -> Option<PlatformPost> {
    let raw = RENDER_DATA.captures(html)?.get(1)?.as_str();
    let data: Vec<RenderData> = match serde_json::from_str(raw) {
        Ok(data) => data,
        Err(e) => {
            tracing::debug!("render_data present but unparseable: {e}");
            return None;
        }
    };
    let status = data.into_iter().next()?.status?;

    let text_html = status
        .long_text
        .and_then(|l| l.content)
        .filter(|c| !c.trim().is_empty())
        .unwrap_or(status.text);
    let text = fragment_text(&text_html);
    if text.is_empty() {
        return None;
    }

    let meta = meta_line(status.user.as_ref(), status.region_name.as_deref());
    let (plain_text, body_html) = match &meta {
        Some(meta) => (
            format!("{meta}\n{text}"),
            format!(
                "<p>{}</p>{text_html}",
                html_escape::encode_text(meta)
            ),
        ),
        None => (text.clone(), text_html),
    };

    let title = status
        .status_title
        .map(|t| normalize_whitespace(&t))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| truncate_chars(&text.replace('\n', " "), TITLE_FALLBACK_CHARS, "..."));

    let images = status
        .pics
        .into_iter()
        .filter_map(|pic| match pic.large {
            Some(large) => {
                let (width, height) = large
                    .geo
                    .map(|g| (g.width, g.height))
                    .unwrap_or((None, None));
                Some(PlatformImage {
                    url: large.url,
                    width,
                    height,
                })
            }
            None => pic.url.map(|url| PlatformImage {
                url,
                width: None,
                height: None,
            }),
        })
        .collect();

    Some(PlatformPost {
        title,
        body_html,
        plain_text,
        images,
    })
}

/// "作者：X | 认证：Y | 发布于 Z", skipping missing parts.
fn meta_line(user: Option<&User>, region: Option<&str>) -> Option<String> {
    let mut parts = Vec::new();
    if let Some(name) = user.and_then(|u| u.screen_name.as_deref()).filter(|s| !s.is_empty()) {
        parts.push(format!("作者：{name}"));
    }
    if let Some(reason) = user
        .and_then(|u| u.verified_reason.as_deref())
        .filter(|s| !s.is_empty())
    {
        parts.push(format!("认证：{reason}"));
    }
    if let Some(region) = region.map(str::trim).filter(|s| !s.is_empty()) {
        parts.push(region.to_string());
    }
    (!parts.is_empty()).then(|| parts.join(" | "))
}
