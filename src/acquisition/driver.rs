//! Browser automation boundary.
//!
//! The acquisition engine only talks to these traits. The chromiumoxide
//! implementation lives in [`super::chromium`]; tests plug in scripted
//! stubs.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Per-page setup applied before navigation.
#[derive(Debug, Clone)]
pub struct PageOptions {
    pub user_agent: String,
    /// Also block image requests (media, fonts and websockets are always blocked).
    pub block_images: bool,
    /// Extra HTTP headers sent with the main document request only.
    pub extra_headers: Vec<(String, String)>,
}

/// Starts browser sessions.
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>>;
}

/// One running browser process with its own profile.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Cheap liveness probe used before reusing a cached session.
    async fn is_alive(&self) -> bool;

    /// Open a fresh page with resource blocking and identity applied.
    async fn open_page(&self, options: &PageOptions) -> Result<Box<dyn PageDriver>>;

    /// Shut the browser down and remove its profile.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A single page (tab).
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Start navigation and wait for it to settle. Callers bound this with
    /// their own timeout.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// MIME type of the main document response, once observed.
    fn main_content_type(&self) -> Option<String>;

    async fn title(&self) -> Result<Option<String>>;

    /// Evaluate a script, awaiting a returned promise. `undefined` maps to `Null`.
    async fn evaluate(&self, script: &str) -> Result<Value>;

    /// Serialized DOM of the current document.
    async fn content(&self) -> Result<String>;

    async fn close(self: Box<Self>) -> Result<()>;
}
