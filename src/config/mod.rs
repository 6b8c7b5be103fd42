//! Configuration module for veracity checking
//!
//! This module provides `AppConfig` with its builder and the reloadable
//! `ConfigHandle` injected into the verification loop and service clients.

// Sub-modules
pub mod builder;
pub mod loader;
pub mod types;

// Re-exports for public API
pub use builder::AppConfigBuilder;
pub use loader::{ConfigHandle, ConfigLoader};
pub use types::{
    AcquisitionSettings, AppConfig, ReasoningSettings, SearchProvider, SearchSettings, WireStyle,
};
