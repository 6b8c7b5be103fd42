//! Fluent builder for `AppConfig`
//!
//! Used by embedders and tests that construct configuration in code instead
//! of loading it from a file or the environment.

use std::path::PathBuf;

use super::types::{AppConfig, SearchProvider, WireStyle};

#[derive(Debug, Clone, Default)]
pub struct AppConfigBuilder {
    config: AppConfig,
}

impl AppConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn wire_style(mut self, style: WireStyle) -> Self {
        self.config.reasoning.wire_style = style;
        self
    }

    #[must_use]
    pub fn reasoning_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.reasoning.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn reasoning_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.reasoning.base_url = url.into();
        self
    }

    #[must_use]
    pub fn reasoning_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.reasoning.endpoint = Some(url.into());
        self
    }

    #[must_use]
    pub fn auth_header(mut self, header: impl Into<String>) -> Self {
        self.config.reasoning.auth_header = header.into();
        self
    }

    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.reasoning.model = model.into();
        self
    }

    #[must_use]
    pub fn max_rounds(mut self, rounds: u32) -> Self {
        self.config.reasoning.max_rounds = rounds.max(1);
        self
    }

    #[must_use]
    pub fn search_provider(mut self, provider: SearchProvider) -> Self {
        self.config.search.provider = provider;
        self
    }

    #[must_use]
    pub fn search_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.search.endpoint = url.into();
        self
    }

    #[must_use]
    pub fn search_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.search.api_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn headless(mut self, headless: bool) -> Self {
        self.config.acquisition.headless = headless;
        self
    }

    #[must_use]
    pub fn block_images(mut self, block: bool) -> Self {
        self.config.acquisition.block_images = block;
        self
    }

    #[must_use]
    pub fn anomaly_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.acquisition.anomaly_dir = dir.into();
        self
    }

    #[must_use]
    pub fn proxy_base(mut self, base: impl Into<String>) -> Self {
        self.config.acquisition.proxy_base = base.into();
        self
    }

    #[must_use]
    pub fn session_idle_secs(mut self, secs: u64) -> Self {
        self.config.acquisition.session_idle_secs = secs;
        self
    }

    #[must_use]
    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl AppConfig {
    #[must_use]
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::new()
    }
}
