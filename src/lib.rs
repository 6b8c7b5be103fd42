pub mod acquisition;
pub mod anomaly;
pub mod browser_pool;
pub mod browser_profile;
pub mod browser_setup;
pub mod classifier;
pub mod config;
pub mod extractor;
pub mod pipeline;
pub mod reasoning;
pub mod search;
pub mod utils;
pub mod verification;

pub use acquisition::{
    AcquisitionEngine, AcquisitionError, AcquisitionOutcome, AcquisitionRequest, BrowserSession,
    ChromiumLauncher, PageDriver, PageOptions, RawPage, SessionLauncher,
};
pub use anomaly::{AnomalyRecord, AnomalyTracker};
pub use browser_pool::{SessionGuard, SessionPool};
pub use browser_setup::{download_managed_browser, find_browser_executable, launch_browser};
pub use config::{AppConfig, ConfigHandle, ConfigLoader};
pub use extractor::{
    Article, ArticleExtractor, ExtractionError, ExtractionResult, Extractor, HeuristicExtractor,
    HttpImageProber, ImageProber, ProbedImage, ReadabilityExtractor,
};
pub use pipeline::{CheckReport, FactChecker, FailureKind, PipelineError};
pub use reasoning::{ChatMessage, ReasoningReply, ReasoningService, Verdict, VerdictDraft};
pub use search::{SearchHit, SearchRecord, WebSearchService};
pub use verification::{
    FnSink, NoopSink, StatusEvent, StatusSink, VerificationError, VerificationLoop,
    VerificationResult,
};

/// Verify one URL end to end with the given configuration.
pub async fn check(
    config: std::sync::Arc<ConfigHandle>,
    url: &str,
) -> Result<CheckReport, PipelineError> {
    let checker = FactChecker::from_config(config)
        .await
        .map_err(AcquisitionError::from)?;
    let report = checker
        .check_url(url, &tokio_util::sync::CancellationToken::new(), &NoopSink)
        .await;
    if let Err(e) = checker.shutdown().await {
        tracing::debug!("Browser shutdown failed: {e:#}");
    }
    report
}
