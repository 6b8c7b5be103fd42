//! Web search boundary
//!
//! The verification loop asks a [`WebSearchService`] for hits and feeds a
//! compact rendering of them back to the reasoning service. Providers: a
//! JSON search API, DuckDuckGo through the shared browser session, or
//! disabled.

pub mod api;
pub mod duckduckgo;
pub mod errors;
pub mod retry;
pub mod types;

pub use api::ApiSearchClient;
pub use duckduckgo::DuckDuckGoSearch;
pub use errors::{SearchError, validate_query};
pub use retry::retry_with_backoff;
pub use types::{
    MAX_QUERY_LENGTH, MAX_RETRIES, SearchHit, SearchRecord, format_results_compact,
};

use async_trait::async_trait;
use std::sync::Arc;

use crate::browser_pool::SessionPool;
use crate::config::{ConfigHandle, SearchProvider};

#[async_trait]
pub trait WebSearchService: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchHit>>;
}

/// Provider used when search is turned off; every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledSearch;

#[async_trait]
impl WebSearchService for DisabledSearch {
    async fn search(&self, _query: &str) -> anyhow::Result<Vec<SearchHit>> {
        Err(SearchError::Disabled.into())
    }
}

/// Dispatches each call to the provider named by the current configuration,
/// so a reload switches providers for the next search.
pub struct ConfiguredSearch {
    config: Arc<ConfigHandle>,
    api: ApiSearchClient,
    duckduckgo: DuckDuckGoSearch,
}

impl ConfiguredSearch {
    pub fn new(config: Arc<ConfigHandle>, pool: Arc<SessionPool>) -> Self {
        let count = config.get().search.count;
        Self {
            api: ApiSearchClient::new(Arc::clone(&config)),
            duckduckgo: DuckDuckGoSearch::new(pool, count),
            config,
        }
    }
}

#[async_trait]
impl WebSearchService for ConfiguredSearch {
    async fn search(&self, query: &str) -> anyhow::Result<Vec<SearchHit>> {
        let provider = self.config.get().search.provider;
        match provider {
            SearchProvider::Api => self.api.search(query).await,
            SearchProvider::Duckduckgo => self.duckduckgo.search(query).await,
            SearchProvider::Disabled => DisabledSearch.search(query).await,
        }
    }
}
