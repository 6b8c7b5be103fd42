//! Configuration sources and the reloadable handle
//!
//! `ConfigHandle` is the single injected configuration object. Components
//! hold an `Arc<ConfigHandle>` and call `get()` per request, so a `reload()`
//! takes effect on the next call without restarting anything.

use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::types::{AppConfig, SearchProvider, WireStyle};

/// Where configuration comes from.
#[derive(Debug, Clone)]
pub enum ConfigLoader {
    /// Defaults plus `VERACITY_*` environment overrides.
    Env,
    /// JSON file, then `VERACITY_*` environment overrides.
    File(PathBuf),
    /// Fixed value, used by tests and embedders. `reload()` is a no-op.
    Static(AppConfig),
}

impl ConfigLoader {
    /// Produce a fresh `AppConfig` from this source.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid JSON, or
    /// if an environment override has an unparseable value.
    pub fn load(&self) -> Result<AppConfig> {
        match self {
            Self::Env => {
                let mut config = AppConfig::default();
                apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
                Ok(config)
            }
            Self::File(path) => {
                let mut config = read_config_file(path)?;
                apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
                Ok(config)
            }
            Self::Static(config) => Ok(config.clone()),
        }
    }
}

fn read_config_file(path: &Path) -> Result<AppConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Invalid JSON in config file {}", path.display()))
}

/// Apply `VERACITY_*` overrides using `lookup` to read variables.
///
/// Split out from `load` so tests can inject variables without touching the
/// process environment.
pub(crate) fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("VERACITY_REASONING_API_KEY") {
        config.reasoning.api_key = Some(v);
    }
    if let Some(v) = lookup("VERACITY_REASONING_BASE_URL") {
        config.reasoning.base_url = v;
    }
    if let Some(v) = lookup("VERACITY_REASONING_ENDPOINT") {
        config.reasoning.endpoint = Some(v);
    }
    if let Some(v) = lookup("VERACITY_REASONING_AUTH_HEADER") {
        config.reasoning.auth_header = v;
    }
    if let Some(v) = lookup("VERACITY_MODEL") {
        config.reasoning.model = v;
    }
    if let Some(v) = lookup("VERACITY_WIRE_STYLE") {
        config.reasoning.wire_style = match v.to_ascii_lowercase().as_str() {
            "sdk" => WireStyle::Sdk,
            "raw_http" | "raw" | "http" => WireStyle::RawHttp,
            other => anyhow::bail!("Unknown VERACITY_WIRE_STYLE '{other}'"),
        };
    }
    if let Some(v) = lookup("VERACITY_MAX_ROUNDS") {
        let rounds: u32 = v
            .parse()
            .with_context(|| format!("Invalid VERACITY_MAX_ROUNDS '{v}'"))?;
        config.reasoning.max_rounds = rounds.max(1);
    }
    if let Some(v) = lookup("VERACITY_SEARCH_PROVIDER") {
        config.search.provider = match v.to_ascii_lowercase().as_str() {
            "api" => SearchProvider::Api,
            "duckduckgo" | "ddg" => SearchProvider::Duckduckgo,
            "disabled" | "none" => SearchProvider::Disabled,
            other => anyhow::bail!("Unknown VERACITY_SEARCH_PROVIDER '{other}'"),
        };
    }
    if let Some(v) = lookup("VERACITY_SEARCH_ENDPOINT") {
        config.search.endpoint = v;
    }
    if let Some(v) = lookup("VERACITY_SEARCH_API_KEY") {
        config.search.api_key = Some(v);
    }
    if let Some(v) = lookup("VERACITY_ANOMALY_DIR") {
        config.acquisition.anomaly_dir = PathBuf::from(v);
    }
    if let Some(v) = lookup("VERACITY_PROXY_BASE") {
        config.acquisition.proxy_base = v;
    }
    if let Some(v) = lookup("VERACITY_HEADLESS") {
        config.acquisition.headless = !matches!(v.as_str(), "0" | "false" | "no");
    }
    Ok(())
}

/// Reloadable configuration snapshot holder.
#[derive(Debug)]
pub struct ConfigHandle {
    loader: ConfigLoader,
    current: RwLock<Arc<AppConfig>>,
}

impl ConfigHandle {
    /// Load once from `loader` and keep the loader for later reloads.
    ///
    /// # Errors
    ///
    /// Propagates the loader's error.
    pub fn new(loader: ConfigLoader) -> Result<Self> {
        let config = loader.load()?;
        Ok(Self {
            loader,
            current: RwLock::new(Arc::new(config)),
        })
    }

    /// Wrap a fixed configuration.
    #[must_use]
    pub fn fixed(config: AppConfig) -> Self {
        Self {
            current: RwLock::new(Arc::new(config.clone())),
            loader: ConfigLoader::Static(config),
        }
    }

    /// Current snapshot. Cheap; callers should not hold it across requests.
    #[must_use]
    pub fn get(&self) -> Arc<AppConfig> {
        Arc::clone(&self.current.read())
    }

    /// Re-read the source and swap the snapshot atomically.
    ///
    /// On error the previous snapshot stays in place.
    ///
    /// # Errors
    ///
    /// Propagates the loader's error.
    pub fn reload(&self) -> Result<()> {
        let fresh = self.loader.load()?;
        debug!(
            model = %fresh.reasoning.model,
            wire_style = ?fresh.reasoning.wire_style,
            provider = ?fresh.search.provider,
            "Configuration reloaded"
        );
        *self.current.write() = Arc::new(fresh);
        info!("Configuration reload applied");
        Ok(())
    }

    /// Replace the snapshot directly, bypassing the loader.
    pub fn replace(&self, config: AppConfig) {
        *self.current.write() = Arc::new(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            ("VERACITY_MODEL", "qwen-max"),
            ("VERACITY_WIRE_STYLE", "raw_http"),
            ("VERACITY_SEARCH_PROVIDER", "disabled"),
            ("VERACITY_MAX_ROUNDS", "0"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(|v| (*v).to_string()))
            .expect("overrides should apply");

        assert_eq!(config.reasoning.model, "qwen-max");
        assert_eq!(config.reasoning.wire_style, WireStyle::RawHttp);
        assert_eq!(config.search.provider, SearchProvider::Disabled);
        assert_eq!(config.reasoning.max_rounds, 1);
    }

    #[test]
    fn unknown_wire_style_is_an_error() {
        let mut config = AppConfig::default();
        let result = apply_env_overrides(&mut config, |k| {
            (k == "VERACITY_WIRE_STYLE").then(|| "carrier-pigeon".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn file_reload_swaps_snapshot() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("veracity.json");
        std::fs::write(&path, r#"{"reasoning":{"model":"first"}}"#).expect("write");

        let handle = ConfigHandle::new(ConfigLoader::File(path.clone())).expect("load");
        let before = handle.get();

        std::fs::write(&path, r#"{"reasoning":{"model":"second"}}"#).expect("write");
        handle.reload().expect("reload");

        // Env may override the model on a developer machine; compare only
        // when it is not set.
        if std::env::var("VERACITY_MODEL").is_err() {
            assert_eq!(before.reasoning.model, "first");
            assert_eq!(handle.get().reasoning.model, "second");
        }
        assert_eq!(handle.get().reasoning.max_rounds, before.reasoning.max_rounds);
    }

    #[test]
    fn failed_reload_keeps_previous() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("veracity.json");
        std::fs::write(&path, "{}").expect("write");

        let handle = ConfigHandle::new(ConfigLoader::File(path.clone())).expect("load");
        std::fs::write(&path, "not json").expect("write");

        assert!(handle.reload().is_err());
        assert_eq!(handle.get().search.count, 8);
    }
}
