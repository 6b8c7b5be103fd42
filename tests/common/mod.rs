//! Test utilities and stub services for the veracity test suite

#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

use kodegen_tools_veracity::config::{AppConfig, ConfigHandle};
use kodegen_tools_veracity::extractor::{Article, ArticleExtractor, ImageProber, ProbedImage};
use kodegen_tools_veracity::reasoning::{ChatMessage, ReasoningService};
use kodegen_tools_veracity::search::{SearchHit, WebSearchService};
use kodegen_tools_veracity::{
    AcquisitionEngine, AnomalyTracker, BrowserSession, PageDriver, PageOptions, SessionLauncher,
    SessionPool,
};

/// Creates a temporary directory for test output
pub fn create_test_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test HTML document with specified content
pub fn create_test_html(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="zh">
<head>
    <meta charset="UTF-8">
    <title>{}</title>
</head>
<body>
    {}
</body>
</html>"#,
        html_escape::encode_text(title),
        body
    )
}

/// Config handle with the anomaly log under `dir`.
pub fn test_config(dir: &std::path::Path) -> Arc<ConfigHandle> {
    Arc::new(ConfigHandle::fixed(
        AppConfig::builder()
            .anomaly_dir(dir.join("anomalies"))
            .session_idle_secs(30)
            .build(),
    ))
}

// =============================================================================
// Browser stubs
// =============================================================================

/// Scripted page: navigation succeeds, scripts return `null`.
pub struct StubPage {
    html: String,
    title: Option<String>,
    content_type: Option<String>,
}

#[async_trait]
impl PageDriver for StubPage {
    async fn navigate(&self, _url: &str) -> Result<()> {
        Ok(())
    }

    fn main_content_type(&self) -> Option<String> {
        self.content_type.clone()
    }

    async fn title(&self) -> Result<Option<String>> {
        Ok(self.title.clone())
    }

    async fn evaluate(&self, _script: &str) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn content(&self) -> Result<String> {
        Ok(self.html.clone())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

pub struct StubSession {
    html: String,
    title: Option<String>,
    content_type: Option<String>,
    alive: Arc<Mutex<bool>>,
    closes: Arc<AtomicUsize>,
    pages: Arc<AtomicUsize>,
}

#[async_trait]
impl BrowserSession for StubSession {
    async fn is_alive(&self) -> bool {
        *self.alive.lock()
    }

    async fn open_page(&self, _options: &PageOptions) -> Result<Box<dyn PageDriver>> {
        self.pages.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubPage {
            html: self.html.clone(),
            title: self.title.clone(),
            content_type: self.content_type.clone(),
        }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Launcher whose sessions serve one fixed page.
pub struct StubLauncher {
    pub html: String,
    pub title: Option<String>,
    pub content_type: Option<String>,
    pub launches: Arc<AtomicUsize>,
    pub closes: Arc<AtomicUsize>,
    pub pages: Arc<AtomicUsize>,
    pub alive: Arc<Mutex<bool>>,
    pub launch_delay: Duration,
}

impl StubLauncher {
    pub fn serving(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            title: Some("测试页面".to_string()),
            content_type: Some("text/html".to_string()),
            launches: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            pages: Arc::new(AtomicUsize::new(0)),
            alive: Arc::new(Mutex::new(true)),
            launch_delay: Duration::ZERO,
        }
    }

    pub fn with_content_type(mut self, mime: &str) -> Self {
        self.content_type = Some(mime.to_string());
        self
    }
}

#[async_trait]
impl SessionLauncher for StubLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        if !self.launch_delay.is_zero() {
            tokio::time::sleep(self.launch_delay).await;
        }
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubSession {
            html: self.html.clone(),
            title: self.title.clone(),
            content_type: self.content_type.clone(),
            alive: Arc::clone(&self.alive),
            closes: Arc::clone(&self.closes),
            pages: Arc::clone(&self.pages),
        }))
    }
}

/// Engine over a stub launcher, anomaly log in `dir`.
pub async fn stub_engine(
    launcher: StubLauncher,
    dir: &std::path::Path,
) -> Result<(AcquisitionEngine, Arc<SessionPool>, Arc<AnomalyTracker>)> {
    let config = test_config(dir);
    let pool = SessionPool::new(Arc::new(launcher), Duration::from_secs(30));
    let anomalies = Arc::new(AnomalyTracker::open(dir.join("anomalies")).await?);
    let engine = AcquisitionEngine::new(Arc::clone(&pool), Arc::clone(&anomalies), config);
    Ok((engine, pool, anomalies))
}

// =============================================================================
// Service stubs
// =============================================================================

/// Reasoning stub replaying scripted replies; the last one repeats.
pub struct ScriptedReasoning {
    replies: Vec<String>,
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<Vec<ChatMessage>>>,
    pub ready: Result<(), String>,
}

impl ScriptedReasoning {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: replies.into_iter().map(Into::into).collect(),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            ready: Ok(()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningService for ScriptedReasoning {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().push(messages.to_vec());
        self.replies
            .get(index)
            .or_else(|| self.replies.last())
            .cloned()
            .ok_or_else(|| anyhow!("no scripted reply"))
    }

    fn check_ready(&self) -> Result<(), String> {
        self.ready.clone()
    }
}

/// Search stub returning fixed hits, or failing every call.
pub struct StubSearch {
    hits: Option<Vec<SearchHit>>,
    pub queries: Mutex<Vec<String>>,
}

impl StubSearch {
    pub fn returning(hits: Vec<SearchHit>) -> Self {
        Self {
            hits: Some(hits),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            hits: None,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.queries.lock().len()
    }
}

#[async_trait]
impl WebSearchService for StubSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.queries.lock().push(query.to_string());
        self.hits
            .clone()
            .ok_or_else(|| anyhow!("search backend unavailable"))
    }
}

pub fn hit(title: &str, url: &str) -> SearchHit {
    SearchHit {
        title: title.to_string(),
        url: url.to_string(),
        summary: format!("{title} 的摘要"),
        date: Some("2025-01-01".to_string()),
    }
}

/// Prober answering from a fixed table; unknown URLs fail.
#[derive(Default)]
pub struct TableProber {
    pub table: HashMap<String, ProbedImage>,
    pub calls: AtomicUsize,
}

impl TableProber {
    pub fn with(mut self, url: &str, width: u32, height: u32, format: &str) -> Self {
        self.table.insert(
            url.to_string(),
            ProbedImage {
                width,
                height,
                format: Some(format.to_string()),
                has_alpha: false,
            },
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageProber for TableProber {
    async fn probe(&self, url: &str) -> Option<ProbedImage> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.table.get(url).cloned()
    }
}

/// Article extractor that never finds anything.
pub struct NoArticle;

impl ArticleExtractor for NoArticle {
    fn extract(&self, _html: &str, _base_url: &str) -> Option<Article> {
        None
    }
}

pub const FINAL_REAL: &str = r#"{"needs_search": false, "probability": 90, "verdict": "Real",
    "explanation": "多家媒体报道一致", "analysis_points": [{"description": "来源可靠", "status": "supported"}],
    "flagged_segments": [], "flagged_images": []}"#;

pub fn search_request(query: &str) -> String {
    format!(r#"{{"needs_search": true, "search_query": "{query}"}}"#)
}
