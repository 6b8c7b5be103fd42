//! chromiumoxide implementation of the browser boundary.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::Browser;
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, FailRequestParams, HeaderEntry,
};
use chromiumoxide::cdp::browser_protocol::network::{
    ErrorReason, EventResponseReceived, ResourceType, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::driver::{BrowserSession, PageDriver, PageOptions, SessionLauncher};
use crate::browser_profile::{BrowserProfile, create_unique_profile};
use crate::browser_setup::{install_fingerprint_suppression, launch_browser, random_user_agent};

/// Launches a local Chrome/Chromium per session.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
}

impl ChromiumLauncher {
    #[must_use]
    pub fn new(headless: bool) -> Self {
        // Headed mode needs a display server; release builds never use it.
        let headless = if cfg!(debug_assertions) { headless } else { true };
        Self { headless }
    }
}

#[async_trait]
impl SessionLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let profile = create_unique_profile().context("Failed to create browser profile")?;
        let (browser, handler) =
            launch_browser(self.headless, profile.path().to_path_buf(), random_user_agent())
                .await?;

        Ok(Box::new(ChromiumSession {
            browser,
            handler,
            _profile: profile,
        }))
    }
}

pub struct ChromiumSession {
    browser: Browser,
    handler: JoinHandle<()>,
    // Dropped last so the profile outlives the browser process
    _profile: BrowserProfile,
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn is_alive(&self) -> bool {
        match self.browser.version().await {
            Ok(version) => {
                trace!("Browser health check OK: {}", version.product);
                true
            }
            Err(e) => {
                debug!("Browser health check failed: {e}");
                false
            }
        }
    }

    async fn open_page(&self, options: &PageOptions) -> Result<Box<dyn PageDriver>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("Failed to create new page")?;

        if let Err(e) = install_fingerprint_suppression(&page).await {
            log::warn!("Fingerprint suppression failed: {e}");
        }

        page.execute(SetUserAgentOverrideParams::new(options.user_agent.clone()))
            .await
            .context("Failed to set user agent")?;

        let main_frame = page
            .mainframe()
            .await
            .context("Failed to resolve main frame")?;

        let content_type = Arc::new(parking_lot::Mutex::new(None::<String>));
        let mut tasks = Vec::with_capacity(2);

        let mut responses = page
            .event_listener::<EventResponseReceived>()
            .await
            .context("Failed to subscribe to responses")?;
        let observed = Arc::clone(&content_type);
        tasks.push(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                if event.r#type == ResourceType::Document {
                    let mut slot = observed.lock();
                    if slot.is_none() {
                        *slot = Some(event.response.mime_type.clone());
                    }
                }
            }
        }));

        let mut paused = page
            .event_listener::<EventRequestPaused>()
            .await
            .context("Failed to subscribe to paused requests")?;
        let interceptor = page.clone();
        let block_images = options.block_images;
        let extra_headers = options.extra_headers.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = paused.next().await {
                let request_id = event.request_id.clone();
                let is_main_document = event.resource_type == ResourceType::Document
                    && main_frame.as_ref() == Some(&event.frame_id);
                let result = if is_blocked_resource(&event.resource_type, block_images) {
                    interceptor
                        .execute(FailRequestParams::new(
                            request_id,
                            ErrorReason::BlockedByClient,
                        ))
                        .await
                        .map(|_| ())
                } else {
                    let mut params = ContinueRequestParams::new(request_id);
                    if is_main_document && !extra_headers.is_empty() {
                        params.headers = Some(merged_headers(
                            event.request.headers.inner(),
                            &extra_headers,
                        ));
                    }
                    interceptor.execute(params).await.map(|_| ())
                };
                if let Err(e) = result {
                    trace!("Request interception reply failed: {e}");
                }
            }
        }));

        page.execute(fetch::EnableParams::default())
            .await
            .context("Failed to enable request interception")?;

        Ok(Box::new(ChromiumPage {
            page,
            content_type,
            tasks,
        }))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let mut this = *self;
        if let Err(e) = this.browser.close().await {
            debug!("Browser close failed: {e}");
        }
        if let Err(e) = this.browser.wait().await {
            debug!("Browser wait failed: {e}");
        }
        this.handler.abort();
        Ok(())
    }
}

/// Original request headers with `extra` added; an extra header replaces
/// an original of the same name.
fn merged_headers(original: &Value, extra: &[(String, String)]) -> Vec<HeaderEntry> {
    let mut entries: Vec<HeaderEntry> = original
        .as_object()
        .into_iter()
        .flatten()
        .filter(|(name, _)| !extra.iter().any(|(e, _)| e.eq_ignore_ascii_case(name)))
        .filter_map(|(name, value)| {
            value
                .as_str()
                .map(|v| HeaderEntry::new(name.clone(), v.to_string()))
        })
        .collect();
    entries.extend(
        extra
            .iter()
            .map(|(name, value)| HeaderEntry::new(name.clone(), value.clone())),
    );
    entries
}

fn is_blocked_resource(resource_type: &ResourceType, block_images: bool) -> bool {
    match resource_type {
        ResourceType::Media | ResourceType::Font | ResourceType::WebSocket => true,
        ResourceType::Image => block_images,
        _ => false,
    }
}

pub struct ChromiumPage {
    page: Page,
    content_type: Arc<parking_lot::Mutex<Option<String>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[async_trait]
impl PageDriver for ChromiumPage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Navigation to {url} failed"))?;
        Ok(())
    }

    fn main_content_type(&self) -> Option<String> {
        self.content_type.lock().clone()
    }

    async fn title(&self) -> Result<Option<String>> {
        self.page.get_title().await.context("Failed to read title")
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(anyhow::Error::msg)?;

        let result = self
            .page
            .evaluate_expression(params)
            .await
            .context("Script evaluation failed")?;

        Ok(result.into_value::<Value>().unwrap_or(Value::Null))
    }

    async fn content(&self) -> Result<String> {
        self.page.content().await.context("Failed to read page content")
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let page = self.page.clone();
        drop(self);
        page.close().await.context("Failed to close page")
    }
}
