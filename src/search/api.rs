//! JSON search API client.
//!
//! POSTs `{query, summary, count}` with a bearer key. Two response shapes
//! are understood: `data.webPages.value[]` and a flat `results[]`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::errors::{SearchError, validate_query};
use super::types::{MAX_QUERY_LENGTH, SearchHit};
use super::WebSearchService;
use crate::config::ConfigHandle;

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    data: Option<ApiData>,
    #[serde(default)]
    results: Option<Vec<ApiHit>>,
}

#[derive(Debug, Deserialize)]
struct ApiData {
    #[serde(default, rename = "webPages")]
    web_pages: Option<WebPages>,
}

#[derive(Debug, Deserialize)]
struct WebPages {
    #[serde(default)]
    value: Vec<ApiHit>,
}

#[derive(Debug, Deserialize)]
struct ApiHit {
    #[serde(default, alias = "name")]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, alias = "datePublished", alias = "published_date")]
    date: Option<String>,
}

impl From<ApiHit> for SearchHit {
    fn from(hit: ApiHit) -> Self {
        let summary = [hit.summary, hit.snippet, hit.content]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
            .unwrap_or_default();
        SearchHit {
            title: hit.title,
            url: hit.url,
            summary,
            date: hit.date.filter(|d| !d.trim().is_empty()),
        }
    }
}

/// Decode either supported response shape.
fn parse_response(body: &str) -> Result<Vec<SearchHit>, SearchError> {
    let envelope: ApiEnvelope =
        serde_json::from_str(body).map_err(|e| SearchError::Decode(e.to_string()))?;

    let hits = match (envelope.data.and_then(|d| d.web_pages), envelope.results) {
        (Some(pages), _) => pages.value,
        (None, Some(results)) => results,
        (None, None) => {
            return Err(SearchError::Decode(
                "neither data.webPages nor results present".to_string(),
            ));
        }
    };

    Ok(hits
        .into_iter()
        .map(SearchHit::from)
        .filter(|h| !h.url.is_empty())
        .collect())
}

/// Search over an HTTP JSON API. Settings are read per call.
pub struct ApiSearchClient {
    client: reqwest::Client,
    config: Arc<ConfigHandle>,
}

impl ApiSearchClient {
    pub fn new(config: Arc<ConfigHandle>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub async fn query(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        let query = validate_query(query, MAX_QUERY_LENGTH)?;
        let settings = self.config.get().search.clone();
        let api_key = settings
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| SearchError::NotConfigured("missing search API key".to_string()))?;

        debug!(query = %query, endpoint = %settings.endpoint, "Search API request");
        let response = self
            .client
            .post(&settings.endpoint)
            .bearer_auth(api_key)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .json(&json!({
                "query": query,
                "summary": true,
                "count": settings.count,
            }))
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SearchError::Status {
                status: status.as_u16(),
                body: crate::utils::truncate_chars(&body, 300, "…"),
            });
        }

        let mut hits = parse_response(&body)?;
        hits.truncate(settings.count);
        Ok(hits)
    }
}

#[async_trait]
impl WebSearchService for ApiSearchClient {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchHit>> {
        Ok(self.query(query).await?)
    }
}
