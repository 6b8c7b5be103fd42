//! The acquisition engine: classify, navigate, settle, capture, check.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::driver::{PageDriver, PageOptions};
use super::page_timeout::with_page_timeout;
use super::settle::settle;
use super::types::{
    AcquisitionError, AcquisitionOutcome, AcquisitionRequest, AcquisitionResult, RawPage,
};
use crate::anomaly::{AnomalyTracker, detect};
use crate::browser_pool::SessionPool;
use crate::browser_setup::random_user_agent;
use crate::classifier::{
    SpecialHandling, is_blocked_download, is_direct_image, is_platform_page,
    requires_special_handling,
};
use crate::config::ConfigHandle;
use crate::utils::is_valid_url;

const CAPTURE_TIMEOUT: Duration = Duration::from_secs(15);
const OPEN_PAGE_TIMEOUT: Duration = Duration::from_secs(20);

/// Header carrying the per-attempt token.
pub const ATTEMPT_HEADER: &str = "X-Request-Attempt";

/// Where a validated request should go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchTarget {
    DirectImage(String),
    Page(String),
}

/// Classifier pre-checks. Pure; never touches the network.
pub fn classify_request(url: &str) -> AcquisitionResult<FetchTarget> {
    if !is_valid_url(url) {
        return Err(AcquisitionError::Validation(
            "无效的链接，请输入以 http:// 或 https:// 开头的网址".to_string(),
        ));
    }
    if is_direct_image(url) {
        return Ok(FetchTarget::DirectImage(url.to_string()));
    }
    if is_blocked_download(url) {
        return Err(AcquisitionError::Validation(
            "该链接指向可下载文件（压缩包、文档、安装包或音视频），无法作为网页分析".to_string(),
        ));
    }
    match requires_special_handling(url) {
        SpecialHandling::Reject(message) => Err(AcquisitionError::Validation(message)),
        SpecialHandling::Rewrite(rewritten) => {
            debug!("Rewrote {url} to {rewritten}");
            Ok(FetchTarget::Page(rewritten))
        }
        SpecialHandling::None => Ok(FetchTarget::Page(url.to_string())),
    }
}

fn is_html_content_type(mime: &str) -> bool {
    let mime = mime.trim().to_ascii_lowercase();
    mime.is_empty()
        || mime.starts_with("text/html")
        || mime.starts_with("application/xhtml+xml")
}

pub struct AcquisitionEngine {
    pool: Arc<SessionPool>,
    anomalies: Arc<AnomalyTracker>,
    config: Arc<ConfigHandle>,
}

impl AcquisitionEngine {
    pub fn new(
        pool: Arc<SessionPool>,
        anomalies: Arc<AnomalyTracker>,
        config: Arc<ConfigHandle>,
    ) -> Self {
        Self {
            pool,
            anomalies,
            config,
        }
    }

    pub fn anomalies(&self) -> &Arc<AnomalyTracker> {
        &self.anomalies
    }

    /// Acquire one URL: a single attempt, never retried.
    pub async fn acquire(
        &self,
        request: &AcquisitionRequest,
    ) -> AcquisitionResult<AcquisitionOutcome> {
        let attempt = request.attempt_id;
        let url = match classify_request(&request.url)? {
            FetchTarget::DirectImage(url) => {
                info!(%attempt, url = %url, "Direct image URL, skipping browser");
                return Ok(AcquisitionOutcome::DirectImage { url });
            }
            FetchTarget::Page(url) => url,
        };
        let is_platform = is_platform_page(&url);
        let settings = self.config.get().acquisition.clone();

        info!(%attempt, url = %url, "Acquiring page");
        let mut guard = self.pool.acquire().await?;

        let options = PageOptions {
            user_agent: random_user_agent().to_string(),
            block_images: settings.block_images,
            extra_headers: vec![(ATTEMPT_HEADER.to_string(), attempt.to_string())],
        };
        let opened = with_page_timeout(
            guard.session()?.open_page(&options),
            OPEN_PAGE_TIMEOUT,
            "open page",
        )
        .await;
        let page = match opened {
            Ok(page) => page,
            Err(e) => {
                guard.discard();
                return Err(e.into());
            }
        };

        let result = self
            .drive(
                &*page,
                &url,
                is_platform,
                Duration::from_secs(settings.navigation_timeout_secs),
                Duration::from_millis(settings.fallback_wait_ms),
            )
            .await;

        if let Err(e) = page.close().await {
            debug!(%attempt, "Page close failed: {e}");
        }
        // A session that could not even produce markup is not reused
        if matches!(
            result,
            Err(AcquisitionError::Browser(_) | AcquisitionError::NoContent(_))
        ) {
            guard.discard();
        }
        drop(guard);

        let (html, title) = result?;

        if let Some(reason) = detect(&html, &url) {
            warn!(%attempt, url = %url, reason = %reason, "Anomaly detected");
            if let Err(e) = self
                .anomalies
                .record(&url, &reason, title.clone(), Some(&html))
                .await
            {
                warn!(%attempt, "Failed to persist anomaly: {e:#}");
            }
            return Err(AcquisitionError::AntiBot { url, reason });
        }

        info!(%attempt, url = %url, bytes = html.len(), "Page acquired");
        Ok(AcquisitionOutcome::Page(RawPage {
            url,
            html,
            title,
            is_platform,
        }))
    }

    async fn drive(
        &self,
        page: &dyn PageDriver,
        url: &str,
        is_platform: bool,
        navigation_timeout: Duration,
        fallback_wait: Duration,
    ) -> AcquisitionResult<(String, Option<String>)> {
        match tokio::time::timeout(navigation_timeout, page.navigate(url)).await {
            Ok(Ok(())) => debug!("Navigation settled for {url}"),
            Ok(Err(e)) => warn!("Navigation error tolerated for {url}: {e:#}"),
            Err(_) => {
                warn!(
                    "Navigation soft timeout after {:?} for {url}, waiting {:?}",
                    navigation_timeout, fallback_wait
                );
                tokio::time::sleep(fallback_wait).await;
            }
        }

        if let Some(mime) = page.main_content_type()
            && !is_html_content_type(&mime)
        {
            return Err(AcquisitionError::UnsupportedContentType(mime));
        }

        settle(page, url, is_platform).await;

        let html = with_page_timeout(page.content(), CAPTURE_TIMEOUT, "capture content")
            .await
            .map_err(|e| {
                warn!("Content capture failed for {url}: {e:#}");
                AcquisitionError::NoContent(url.to_string())
            })?;
        if html.trim().is_empty() {
            return Err(AcquisitionError::NoContent(url.to_string()));
        }

        let title = match page.title().await {
            Ok(title) => title.filter(|t| !t.trim().is_empty()),
            Err(e) => {
                debug!("Title read failed: {e}");
                None
            }
        };

        Ok((html, title))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_image_short_circuits() {
        assert_eq!(
            classify_request("https://example.com/photo.jpg").expect("ok"),
            FetchTarget::DirectImage("https://example.com/photo.jpg".to_string())
        );
    }

    #[test]
    fn downloads_and_listings_are_validation_errors() {
        assert!(matches!(
            classify_request("https://example.com/setup.exe"),
            Err(AcquisitionError::Validation(_))
        ));
        assert!(matches!(
            classify_request("https://s.weibo.com/weibo?q=x"),
            Err(AcquisitionError::Validation(_))
        ));
        assert!(matches!(
            classify_request("ftp://example.com/"),
            Err(AcquisitionError::Validation(_))
        ));
    }

    #[test]
    fn desktop_platform_is_rewritten() {
        assert_eq!(
            classify_request("https://weibo.com/123/Abc").expect("ok"),
            FetchTarget::Page("https://m.weibo.cn/123/Abc".to_string())
        );
    }

    #[test]
    fn content_type_gate() {
        assert!(is_html_content_type("text/html; charset=utf-8"));
        assert!(is_html_content_type("application/xhtml+xml"));
        assert!(!is_html_content_type("application/pdf"));
        assert!(!is_html_content_type("image/png"));
    }
}
