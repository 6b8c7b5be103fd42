//! Persisted, bounded log of suspected bot blocks.
//!
//! Layout under the tracker directory:
//!
//! ```text
//! anomalies.json        metadata, oldest first
//! dumps/{id}.html       raw-page snapshot for records with `has_dump`
//! ```
//!
//! All mutations hold one async mutex, so dedup-by-URL and the record cap
//! hold under concurrent acquisitions. Metadata is written to a temp file
//! and renamed into place; the in-memory list and snapshot files change
//! only after that write succeeds.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::utils::MAX_ANOMALY_RECORDS;

const METADATA_FILE: &str = "anomalies.json";
const DUMP_DIR: &str = "dumps";

/// One suspected bot-block event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyRecord {
    pub id: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
    pub title: Option<String>,
    pub has_dump: bool,
}

#[derive(Debug)]
pub struct AnomalyTracker {
    dir: PathBuf,
    capacity: usize,
    records: Mutex<Vec<AnomalyRecord>>,
}

impl AnomalyTracker {
    /// Open (or create) a tracker rooted at `dir`.
    ///
    /// Unreadable metadata is logged and replaced with an empty log rather
    /// than blocking acquisition.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_capacity(dir, MAX_ANOMALY_RECORDS).await
    }

    pub async fn with_capacity(dir: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(dir.join(DUMP_DIR))
            .await
            .with_context(|| format!("Failed to create anomaly directory {}", dir.display()))?;

        let records = match tokio::fs::read_to_string(dir.join(METADATA_FILE)).await {
            Ok(raw) => serde_json::from_str::<Vec<AnomalyRecord>>(&raw).unwrap_or_else(|e| {
                warn!("Discarding unreadable anomaly metadata: {e}");
                Vec::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(e).context("Failed to read anomaly metadata");
            }
        };

        debug!("Anomaly tracker opened with {} records", records.len());

        Ok(Self {
            dir,
            capacity: capacity.max(1),
            records: Mutex::new(records),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot file for `id` (whether or not it exists).
    #[must_use]
    pub fn dump_path(&self, id: &str) -> PathBuf {
        self.dir.join(DUMP_DIR).join(format!("{id}.html"))
    }

    /// Record an anomaly for `url`, replacing any earlier record for the
    /// same URL and evicting the oldest records past capacity.
    pub async fn record(
        &self,
        url: &str,
        reason: &str,
        title: Option<String>,
        snapshot: Option<&str>,
    ) -> Result<AnomalyRecord> {
        let mut records = self.records.lock().await;

        let (mut next, stale): (Vec<_>, Vec<_>) =
            records.iter().cloned().partition(|r| r.url != url);

        let id = Uuid::new_v4().simple().to_string();
        let has_dump = match snapshot {
            Some(html) => match tokio::fs::write(self.dump_path(&id), html).await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Failed to write anomaly snapshot for {url}: {e}");
                    false
                }
            },
            None => false,
        };

        let record = AnomalyRecord {
            id,
            url: url.to_string(),
            timestamp: Utc::now(),
            reason: reason.to_string(),
            title,
            has_dump,
        };
        next.push(record.clone());

        let overflow = next.len().saturating_sub(self.capacity);
        let evicted: Vec<_> = next.drain(..overflow).collect();

        if let Err(e) = self.persist(&next).await {
            self.remove_dump(&record).await;
            return Err(e);
        }
        *records = next;

        for old in stale.iter().chain(&evicted) {
            debug!("Dropping anomaly {} for {}", old.id, old.url);
            self.remove_dump(old).await;
        }
        info!(url = %url, reason = %reason, "Anomaly recorded");
        Ok(record)
    }

    /// Snapshot of all records, oldest first.
    pub async fn list(&self) -> Vec<AnomalyRecord> {
        self.records.lock().await.clone()
    }

    /// Raw-page snapshot for `id`, if one was saved.
    pub async fn read_dump(&self, id: &str) -> Result<Option<String>> {
        let has_dump = self
            .records
            .lock()
            .await
            .iter()
            .any(|r| r.id == id && r.has_dump);
        if !has_dump {
            return Ok(None);
        }
        let html = tokio::fs::read_to_string(self.dump_path(id))
            .await
            .with_context(|| format!("Failed to read anomaly snapshot {id}"))?;
        Ok(Some(html))
    }

    /// Delete one record and its snapshot. Returns false if `id` is unknown.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut records = self.records.lock().await;
        let Some(pos) = records.iter().position(|r| r.id == id) else {
            return Ok(false);
        };
        let mut next = records.clone();
        let removed = next.remove(pos);
        self.persist(&next).await?;
        *records = next;
        self.remove_dump(&removed).await;
        Ok(true)
    }

    /// Delete every record and snapshot. Returns how many records were removed.
    pub async fn clear(&self) -> Result<usize> {
        let mut records = self.records.lock().await;
        self.persist(&[]).await?;
        let removed = std::mem::take(&mut *records);
        for record in &removed {
            self.remove_dump(record).await;
        }
        Ok(removed.len())
    }

    async fn remove_dump(&self, record: &AnomalyRecord) {
        if !record.has_dump {
            return;
        }
        let path = self.dump_path(&record.id);
        if let Err(e) = tokio::fs::remove_file(&path).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!("Failed to remove anomaly snapshot {}: {e}", path.display());
        }
    }

    async fn persist(&self, records: &[AnomalyRecord]) -> Result<()> {
        let json = serde_json::to_vec_pretty(records).context("Failed to encode anomalies")?;
        let target = self.dir.join(METADATA_FILE);
        let tmp = self.dir.join(format!("{METADATA_FILE}.tmp"));

        tokio::fs::write(&tmp, json)
            .await
            .context("Failed to write anomaly metadata")?;
        tokio::fs::rename(&tmp, &target)
            .await
            .context("Failed to replace anomaly metadata")?;
        Ok(())
    }
}
