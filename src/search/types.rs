//! Data structures and constants for web search

use serde::{Deserialize, Serialize};

use crate::utils::truncate_chars;

// =============================================================================
// Constants
// =============================================================================

/// `DuckDuckGo` search URL base
pub const SEARCH_URL: &str = "https://duckduckgo.com";

/// `DuckDuckGo` renders each result as an article with data-testid="result"
pub const SEARCH_RESULT_SELECTOR: &str = "article[data-testid='result']";

/// Title link; also carries the result URL
pub const TITLE_SELECTOR: &str = "h2 a";

/// Result snippet
pub const SNIPPET_SELECTOR: &str = "div[data-result='snippet']";

/// Maximum time to wait for results to render (seconds)
pub const SEARCH_RESULTS_WAIT_TIMEOUT: u64 = 5;

/// Maximum number of retry attempts for the browser-backed provider
pub const MAX_RETRIES: u32 = 2;

/// Maximum query length accepted by any provider (characters)
pub const MAX_QUERY_LENGTH: usize = 500;

/// Summary characters kept per row of the compact block
const SUMMARY_CHARS: usize = 200;

// =============================================================================
// Data Structures
// =============================================================================

/// One web search hit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// A completed search as recorded in the verification log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub query: String,
    pub round: u32,
    pub hits: Vec<SearchHit>,
}

fn cell(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('|', "/")
}

/// Re-serialize hits as a compact table for the reasoning service.
///
/// One header row, then `index|title|date|url|summary` per hit. Pipes and
/// line breaks inside fields are flattened.
#[must_use]
pub fn format_results_compact(query: &str, hits: &[SearchHit]) -> String {
    let mut out = format!("搜索关键词: {}\n", cell(query));
    if hits.is_empty() {
        out.push_str("未找到相关结果");
        return out;
    }

    out.push_str("序号|标题|日期|链接|摘要");
    for (index, hit) in hits.iter().enumerate() {
        out.push('\n');
        out.push_str(&format!(
            "{}|{}|{}|{}|{}",
            index + 1,
            cell(&hit.title),
            hit.date.as_deref().map(cell).unwrap_or_else(|| "-".to_string()),
            hit.url.trim(),
            truncate_chars(&cell(&hit.summary), SUMMARY_CHARS, "…"),
        ));
    }
    out
}
