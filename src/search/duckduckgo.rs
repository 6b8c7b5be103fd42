//! DuckDuckGo search through the shared browser session
//!
//! Runs on the same single-slot [`SessionPool`] as page acquisition, so a
//! search waits for any navigation in flight. Each attempt opens a fresh
//! page; results are parsed from the rendered markup.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

use super::WebSearchService;
use super::errors::{SearchError, validate_query};
use super::retry::retry_with_backoff;
use super::types::{
    MAX_QUERY_LENGTH, MAX_RETRIES, SEARCH_RESULT_SELECTOR, SEARCH_RESULTS_WAIT_TIMEOUT,
    SEARCH_URL, SNIPPET_SELECTOR, SearchHit, TITLE_SELECTOR,
};
use crate::acquisition::page_timeout::with_page_timeout;
use crate::acquisition::{PageDriver, PageOptions};
use crate::browser_pool::SessionPool;
use crate::browser_setup::random_user_agent;

const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(20);
const POLL_INTERVAL: Duration = Duration::from_millis(200);

static RESULT_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(SEARCH_RESULT_SELECTOR).expect("BUG: hardcoded result selector")
});
static TITLE_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(TITLE_SELECTOR).expect("BUG: hardcoded title selector"));
static SNIPPET_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(SNIPPET_SELECTOR).expect("BUG: hardcoded snippet selector")
});

pub struct DuckDuckGoSearch {
    pool: Arc<SessionPool>,
    max_results: usize,
}

impl DuckDuckGoSearch {
    pub fn new(pool: Arc<SessionPool>, max_results: usize) -> Self {
        Self { pool, max_results }
    }
}

/// `https://duckduckgo.com/?q=<query>&ia=web`
pub fn search_url(query: &str) -> Result<String> {
    let mut url = Url::parse(SEARCH_URL).context("Failed to parse DuckDuckGo base URL")?;
    url.query_pairs_mut()
        .append_pair("q", query)
        .append_pair("ia", "web");
    Ok(url.to_string())
}

fn element_text(el: &ElementRef) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse result cards out of a rendered results page.
pub fn parse_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let document = Html::parse_document(html);
    document
        .select(&RESULT_SEL)
        .filter_map(|card| {
            let link = card.select(&TITLE_SEL).next()?;
            let url = link.value().attr("href")?.trim().to_string();
            if url.is_empty() {
                return None;
            }
            let summary = card
                .select(&SNIPPET_SEL)
                .next()
                .map(|s| element_text(&s))
                .unwrap_or_default();
            Some(SearchHit {
                title: element_text(&link),
                url,
                summary,
                date: None,
            })
        })
        .take(max_results)
        .collect()
}

/// Navigate, wait for result cards to render, parse them.
async fn scrape(page: &dyn PageDriver, url: &str, max_results: usize) -> Result<Vec<SearchHit>> {
    with_page_timeout(page.navigate(url), NAVIGATION_TIMEOUT, "search navigate").await?;

    let probe = format!(
        "document.querySelector({}) !== null",
        serde_json::to_string(SEARCH_RESULT_SELECTOR)?
    );
    let max_wait = Duration::from_secs(SEARCH_RESULTS_WAIT_TIMEOUT);
    let start = Instant::now();
    loop {
        if page.evaluate(&probe).await?.as_bool() == Some(true) {
            debug!("Search results appeared after {:.2}s", start.elapsed().as_secs_f64());
            break;
        }
        if start.elapsed() >= max_wait {
            let location = page
                .evaluate("location.href")
                .await
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_default();
            if location.contains("/sorry/") || location.contains("captcha") {
                return Err(SearchError::Captcha.into());
            }
            return Err(anyhow!(
                "Timeout waiting for DuckDuckGo results to render after {}s",
                max_wait.as_secs()
            ));
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }

    let html = page.content().await.context("Failed to read results page")?;
    let hits = parse_results(&html, max_results);
    if hits.is_empty() {
        return Err(anyhow!(
            "No search results found on DuckDuckGo (selector '{SEARCH_RESULT_SELECTOR}')"
        ));
    }
    Ok(hits)
}

#[async_trait]
impl WebSearchService for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let query = validate_query(query, MAX_QUERY_LENGTH)?;
        let url = search_url(&query)?;
        info!(query = %query, "Starting DuckDuckGo search");

        let mut guard = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire browser session")?;
        let max_results = self.max_results;

        let outcome = {
            let guard = &guard;
            let url = url.as_str();
            retry_with_backoff(
                || async move {
                    let options = PageOptions {
                        user_agent: random_user_agent().to_string(),
                        block_images: true,
                        extra_headers: Vec::new(),
                    };
                    let page = guard.session()?.open_page(&options).await?;
                    let result = scrape(&*page, url, max_results).await;
                    if let Err(e) = page.close().await {
                        debug!("Search page close failed: {e}");
                    }
                    result
                },
                MAX_RETRIES,
            )
            .await
        };

        if outcome.is_err() {
            guard.discard();
        }
        let hits = outcome?;
        info!(query = %query, count = hits.len(), "Search completed");
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_encoded_url() {
        assert_eq!(
            search_url("上海 地铁").expect("url"),
            "https://duckduckgo.com/?q=%E4%B8%8A%E6%B5%B7+%E5%9C%B0%E9%93%81&ia=web"
        );
    }

    #[test]
    fn parses_result_cards() {
        let html = r#"<html><body>
            <article data-testid="result">
              <h2><a href="https://a.example/1"><span>First  result</span></a></h2>
              <div data-result="snippet">Snippet <b>one</b></div>
            </article>
            <article data-testid="result"><h2><a>no link</a></h2></article>
            <article data-testid="result">
              <h2><a href="https://b.example/2">Second</a></h2>
            </article>
        </body></html>"#;
        let hits = parse_results(html, 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "First result");
        assert_eq!(hits[0].summary, "Snippet one");
        assert_eq!(hits[1].url, "https://b.example/2");
        assert_eq!(hits[1].summary, "");
        assert_eq!(parse_results(html, 1).len(), 1);
    }
}
