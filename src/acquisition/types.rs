//! Request, outcome and error types for page acquisition

use thiserror::Error;
use uuid::Uuid;

/// Input to one acquisition attempt.
///
/// `attempt_id` is unique per attempt so repeated requests for the same URL
/// are never collapsed by a caching layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionRequest {
    pub url: String,
    pub attempt_id: Uuid,
}

impl AcquisitionRequest {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim().to_string(),
            attempt_id: Uuid::new_v4(),
        }
    }
}

/// Markup captured from a rendered page.
#[derive(Debug, Clone)]
pub struct RawPage {
    /// URL actually fetched (after platform rewrites).
    pub url: String,
    pub html: String,
    pub title: Option<String>,
    /// Page belongs to the micro-blogging platform.
    pub is_platform: bool,
}

#[derive(Debug, Clone)]
pub enum AcquisitionOutcome {
    Page(RawPage),
    /// The URL is a raw image; no browser was involved.
    DirectImage { url: String },
}

/// Classified acquisition failures. None of them are retried.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Disallowed URL shape; the message is user-facing.
    #[error("{0}")]
    Validation(String),

    /// Main document was not HTML
    #[error("Unsupported content type: {0}")]
    UnsupportedContentType(String),

    /// Captured markup looks like a bot block; an anomaly was recorded
    #[error("Likely bot-blocked at {url}: {reason}")]
    AntiBot { url: String, reason: String },

    /// Nothing usable came back
    #[error("Could not retrieve content from {0}")]
    NoContent(String),

    /// Browser launch or control failed
    #[error("Browser error: {0}")]
    Browser(String),
}

impl From<anyhow::Error> for AcquisitionError {
    fn from(err: anyhow::Error) -> Self {
        // {:#} keeps the context chain
        Self::Browser(format!("{err:#}"))
    }
}

pub type AcquisitionResult<T> = Result<T, AcquisitionError>;
