//! End-to-end fact checking: acquire, extract, verify.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::acquisition::{
    AcquisitionEngine, AcquisitionError, AcquisitionOutcome, AcquisitionRequest, ChromiumLauncher,
};
use crate::anomaly::AnomalyTracker;
use crate::browser_pool::SessionPool;
use crate::config::ConfigHandle;
use crate::extractor::{ExtractionError, ExtractionResult, Extractor, synthesize_image_result};
use crate::reasoning::ConfiguredReasoning;
use crate::search::ConfiguredSearch;
use crate::verification::{
    StatusSink, VerificationError, VerificationLoop, VerificationResult,
};

/// Coarse failure class, stable across message wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Acquisition,
    AntiBot,
    Extraction,
    Reasoning,
    Aborted,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Verification(#[from] VerificationError),

    #[error("Fact check aborted")]
    Aborted,
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Acquisition(AcquisitionError::Validation(_)) => FailureKind::Validation,
            Self::Acquisition(AcquisitionError::AntiBot { .. }) => FailureKind::AntiBot,
            Self::Acquisition(_) => FailureKind::Acquisition,
            Self::Extraction(_) => FailureKind::Extraction,
            Self::Verification(VerificationError::Aborted) | Self::Aborted => FailureKind::Aborted,
            Self::Verification(_) => FailureKind::Reasoning,
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.kind() == FailureKind::Aborted
    }

    /// Message shown to end users.
    pub fn user_message(&self) -> String {
        match self {
            Self::Acquisition(AcquisitionError::Validation(message)) => message.clone(),
            Self::Acquisition(AcquisitionError::UnsupportedContentType(_)) => {
                "该链接不是网页，内容类型不受支持，无法分析".to_string()
            }
            Self::Acquisition(AcquisitionError::AntiBot { .. }) => {
                "目标网站触发了人机验证或反爬虫拦截，暂时无法获取内容".to_string()
            }
            Self::Acquisition(_) => "无法获取该网页内容，请稍后重试".to_string(),
            Self::Extraction(_) => "无法解析该网页的正文内容".to_string(),
            Self::Verification(VerificationError::Config(_)) => {
                "分析服务未正确配置，请联系管理员".to_string()
            }
            Self::Verification(VerificationError::Parse(_)) => {
                "分析结果格式异常，请重试".to_string()
            }
            Self::Verification(VerificationError::Reasoning(_)) => {
                "分析服务暂时不可用，请稍后重试".to_string()
            }
            Self::Verification(VerificationError::Aborted) | Self::Aborted => {
                "已取消核查".to_string()
            }
        }
    }
}

/// What a URL check returns: the extracted content and the verdict on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub extraction: ExtractionResult,
    pub verification: VerificationResult,
}

pub struct FactChecker {
    config: Arc<ConfigHandle>,
    engine: AcquisitionEngine,
    extractor: Extractor,
    verifier: VerificationLoop,
    pool: Option<Arc<SessionPool>>,
}

impl FactChecker {
    pub fn new(
        config: Arc<ConfigHandle>,
        engine: AcquisitionEngine,
        extractor: Extractor,
        verifier: VerificationLoop,
    ) -> Self {
        Self {
            config,
            engine,
            extractor,
            verifier,
            pool: None,
        }
    }

    /// Production wiring: Chromium sessions, HTTP reasoning and search
    /// clients selected by configuration, anomaly log on disk.
    pub async fn from_config(config: Arc<ConfigHandle>) -> anyhow::Result<Self> {
        let settings = config.get().acquisition.clone();
        let pool = SessionPool::new(
            Arc::new(ChromiumLauncher::new(settings.headless)),
            Duration::from_secs(settings.session_idle_secs),
        );
        let anomalies = Arc::new(
            AnomalyTracker::open(settings.anomaly_dir.clone())
                .await
                .context("Failed to open anomaly log")?,
        );

        let engine = AcquisitionEngine::new(Arc::clone(&pool), anomalies, Arc::clone(&config));
        let extractor = Extractor::with_defaults(Arc::clone(&config));
        let verifier = VerificationLoop::new(
            Arc::clone(&config),
            Arc::new(ConfiguredReasoning::new(Arc::clone(&config))),
            Arc::new(ConfiguredSearch::new(Arc::clone(&config), Arc::clone(&pool))),
        );

        let mut checker = Self::new(config, engine, extractor, verifier);
        checker.pool = Some(pool);
        Ok(checker)
    }

    pub fn anomalies(&self) -> &Arc<AnomalyTracker> {
        self.engine.anomalies()
    }

    /// Acquire and extract without verifying.
    pub async fn extract_url(&self, url: &str) -> Result<ExtractionResult, PipelineError> {
        let request = AcquisitionRequest::new(url);
        match self.engine.acquire(&request).await? {
            AcquisitionOutcome::DirectImage { url } => Ok(synthesize_image_result(
                &url,
                &self.config.get().acquisition.proxy_base,
            )),
            AcquisitionOutcome::Page(page) => Ok(self
                .extractor
                .extract(&page.html, &page.url, page.is_platform)
                .await?),
        }
    }

    /// Full check of a URL.
    pub async fn check_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
        sink: &dyn StatusSink,
    ) -> Result<CheckReport, PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Aborted);
        }
        let extraction = self.extract_url(url).await?;
        if cancel.is_cancelled() {
            return Err(PipelineError::Aborted);
        }
        info!(
            url = %extraction.source_url,
            chars = extraction.plain_text.chars().count(),
            images = extraction.images.len(),
            "Extracted content"
        );

        let verification = self
            .verifier
            .run(
                &extraction.plain_text,
                &extraction.images,
                Some(&extraction.source_url),
                cancel,
                sink,
            )
            .await?;
        Ok(CheckReport {
            extraction,
            verification,
        })
    }

    /// Check pasted text and image URLs; nothing is acquired.
    pub async fn check_text(
        &self,
        text: &str,
        images: &[String],
        cancel: &CancellationToken,
        sink: &dyn StatusSink,
    ) -> Result<VerificationResult, PipelineError> {
        Ok(self.verifier.run(text, images, None, cancel, sink).await?)
    }

    /// Close the shared browser session, if one was started.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        match &self.pool {
            Some(pool) => pool.shutdown().await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_error_class() {
        assert_eq!(
            PipelineError::from(AcquisitionError::Validation("x".into())).kind(),
            FailureKind::Validation
        );
        assert_eq!(
            PipelineError::from(AcquisitionError::AntiBot {
                url: "u".into(),
                reason: "r".into()
            })
            .kind(),
            FailureKind::AntiBot
        );
        assert_eq!(
            PipelineError::from(AcquisitionError::NoContent("u".into())).kind(),
            FailureKind::Acquisition
        );
        assert_eq!(
            PipelineError::from(VerificationError::Aborted).kind(),
            FailureKind::Aborted
        );
        assert_eq!(
            PipelineError::from(VerificationError::Reasoning("x".into())).kind(),
            FailureKind::Reasoning
        );
    }

    #[test]
    fn validation_message_is_passed_through() {
        let err = PipelineError::from(AcquisitionError::Validation("不支持".into()));
        assert_eq!(err.user_message(), "不支持");
    }
}
