//! Error types for web search providers

use thiserror::Error;

/// Failures of a single search call.
///
/// The verification loop never aborts on these; their message is fed back
/// to the reasoning service as a negative result.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search query cannot be empty")]
    EmptyQuery,

    #[error("Search query is too long ({len} characters, max {max})")]
    QueryTooLong { len: usize, max: usize },

    #[error("Search provider is not configured: {0}")]
    NotConfigured(String),

    #[error("Search is disabled")]
    Disabled,

    #[error("Search request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Search API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected search response: {0}")]
    Decode(String),

    #[error("Search page presented a CAPTCHA")]
    Captcha,

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for SearchError {
    fn from(error: anyhow::Error) -> Self {
        SearchError::Other(format!("{error:#}"))
    }
}

/// Trim and bound a query before any provider sees it.
pub fn validate_query(query: &str, max_len: usize) -> Result<String, SearchError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(SearchError::EmptyQuery);
    }
    let len = trimmed.chars().count();
    if len > max_len {
        return Err(SearchError::QueryTooLong { len, max: max_len });
    }
    Ok(trimmed.to_string())
}
