//! Chrome profile directory management
//!
//! Every launched session gets a fresh UUID-named profile under the temp
//! directory so concurrent processes never contend for a `SingletonLock`.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix shared by every profile directory this crate creates.
pub const PROFILE_PREFIX: &str = "kodegen_veracity_chrome";

/// RAII wrapper for a Chrome profile directory
///
/// The directory is removed on drop, so a session holding its profile
/// cleans up on every exit path.
#[derive(Debug)]
pub struct BrowserProfile {
    path: PathBuf,
}

impl BrowserProfile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BrowserProfile {
    fn drop(&mut self) {
        if self.path.exists() {
            debug!("BrowserProfile cleanup: removing {}", self.path.display());
            if let Err(e) = std::fs::remove_dir_all(&self.path) {
                warn!(
                    "Failed to cleanup profile directory {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

/// Create a unique profile directory named `{PROFILE_PREFIX}_{uuid}`.
pub fn create_unique_profile() -> Result<BrowserProfile> {
    let path = std::env::temp_dir().join(format!("{PROFILE_PREFIX}_{}", Uuid::new_v4()));

    // create_dir fails on an existing path, so a UUID collision is an error
    std::fs::create_dir(&path)
        .with_context(|| format!("Failed to create profile directory: {}", path.display()))?;

    debug!("Created Chrome profile directory: {}", path.display());
    Ok(BrowserProfile { path })
}

/// Remove profile directories left behind by crashed processes.
///
/// Only directories older than `max_age` are touched so a concurrently
/// running process keeps its live profile.
pub fn cleanup_stale_profiles(max_age: Duration) -> Result<usize> {
    let temp_dir = std::env::temp_dir();
    let now = SystemTime::now();
    let mut cleaned = 0;

    let entries = std::fs::read_dir(&temp_dir)
        .with_context(|| format!("Failed to read temp directory: {}", temp_dir.display()))?;

    for entry in entries.flatten() {
        let path = entry.path();

        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.starts_with(PROFILE_PREFIX) || !path.is_dir() {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());

        if let Some(age) = age
            && age > max_age
        {
            match std::fs::remove_dir_all(&path) {
                Ok(()) => cleaned += 1,
                Err(e) => warn!("Failed to remove stale profile {}: {}", path.display(), e),
            }
        }
    }

    if cleaned > 0 {
        info!("Cleaned {} stale Chrome profile directories", cleaned);
    }

    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_is_removed_on_drop() {
        let profile = create_unique_profile().expect("profile");
        let path = profile.path().to_path_buf();
        assert!(path.exists());
        assert!(
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(PROFILE_PREFIX))
        );
        drop(profile);
        assert!(!path.exists());
    }

    #[test]
    fn fresh_profiles_survive_stale_cleanup() {
        let profile = create_unique_profile().expect("profile");
        cleanup_stale_profiles(Duration::from_secs(3600)).expect("cleanup");
        assert!(profile.path().exists());
    }
}
