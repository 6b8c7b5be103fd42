//! Single-slot browser session pool
//!
//! Exactly one navigation runs at a time per pool. Callers queue on a
//! one-permit semaphore; the holder gets a [`SessionGuard`] that returns the
//! session on drop. A returned session is closed after `idle_timeout` of
//! inactivity, so memory does not grow across requests.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

use crate::acquisition::driver::{BrowserSession, SessionLauncher};

/// A session with pool metadata
struct PooledSession {
    id: u64,
    session: Box<dyn BrowserSession>,
    last_used: Instant,
}

impl std::fmt::Debug for PooledSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledSession")
            .field("id", &self.id)
            .field("last_used", &self.last_used)
            .finish_non_exhaustive()
    }
}

/// Pool of size one with RAII checkout and idle teardown.
pub struct SessionPool {
    launcher: Arc<dyn SessionLauncher>,
    idle_timeout: Duration,
    permit: Arc<Semaphore>,
    slot: Arc<Mutex<Option<PooledSession>>>,
    /// Bumped on every release; an idle teardown only fires if no release
    /// happened since it was scheduled.
    release_seq: Arc<AtomicU64>,
    next_id: AtomicU64,
    launches: AtomicU64,
}

impl std::fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionPool")
            .field("idle_timeout", &self.idle_timeout)
            .field("launches", &self.launches.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SessionPool {
    pub fn new(launcher: Arc<dyn SessionLauncher>, idle_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            launcher,
            idle_timeout,
            permit: Arc::new(Semaphore::new(1)),
            slot: Arc::new(Mutex::new(None)),
            release_seq: Arc::new(AtomicU64::new(0)),
            next_id: AtomicU64::new(0),
            launches: AtomicU64::new(0),
        })
    }

    /// Number of sessions launched over the pool's lifetime.
    pub fn launch_count(&self) -> u64 {
        self.launches.load(Ordering::Relaxed)
    }

    /// True if a session is cached and not checked out.
    pub fn has_idle_session(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Wait for the single slot and check out a healthy session.
    ///
    /// A cached session is health-checked first and relaunched if dead.
    pub async fn acquire(self: &Arc<Self>) -> Result<SessionGuard> {
        let permit = Arc::clone(&self.permit)
            .acquire_owned()
            .await
            .context("Session pool closed")?;

        let cached = self.slot.lock().take();

        let pooled = match cached {
            Some(pooled) => {
                if pooled.session.is_alive().await {
                    debug!("Reusing browser session {}", pooled.id);
                    pooled
                } else {
                    warn!("Browser session {} failed health check, relaunching", pooled.id);
                    if let Err(e) = pooled.session.close().await {
                        debug!("Closing dead session failed: {e}");
                    }
                    self.launch().await?
                }
            }
            None => self.launch().await?,
        };

        Ok(SessionGuard {
            session: Some(pooled),
            pool: Arc::clone(self),
            permit: Some(permit),
            discard: false,
        })
    }

    async fn launch(&self) -> Result<PooledSession> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = self
            .launcher
            .launch()
            .await
            .context("Failed to launch browser session")?;
        self.launches.fetch_add(1, Ordering::Relaxed);
        info!("Launched browser session {}", id);

        Ok(PooledSession {
            id,
            session,
            last_used: Instant::now(),
        })
    }

    /// Put a session back and schedule its idle teardown.
    fn release(&self, mut pooled: PooledSession, permit: OwnedSemaphorePermit) {
        pooled.last_used = Instant::now();
        let id = pooled.id;
        *self.slot.lock() = Some(pooled);
        let seq = self.release_seq.fetch_add(1, Ordering::SeqCst) + 1;
        drop(permit);
        debug!("Released browser session {} back to pool", id);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let slot = Arc::clone(&self.slot);
        let release_seq = Arc::clone(&self.release_seq);
        let semaphore = Arc::clone(&self.permit);
        let idle_timeout = self.idle_timeout;

        runtime.spawn(async move {
            tokio::time::sleep(idle_timeout).await;

            if release_seq.load(Ordering::SeqCst) != seq {
                return;
            }
            // Session checked out again: the next release reschedules.
            let Ok(_permit) = semaphore.try_acquire_owned() else {
                return;
            };
            let idle = slot.lock().take();
            if let Some(pooled) = idle {
                info!(
                    "Closing browser session {} after {:?} idle",
                    pooled.id,
                    pooled.last_used.elapsed()
                );
                if let Err(e) = pooled.session.close().await {
                    warn!("Failed to close idle browser session: {e}");
                }
            }
        });
    }

    /// Close a session that must not be reused.
    fn discard(&self, pooled: PooledSession, permit: OwnedSemaphorePermit) {
        warn!("Discarding browser session {}", pooled.id);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = pooled.session.close().await {
                        debug!("Closing discarded session failed: {e}");
                    }
                    drop(permit);
                });
            }
            Err(_) => drop(permit),
        }
    }

    /// Close the cached session, if any, waiting for an in-flight checkout.
    pub async fn shutdown(&self) -> Result<()> {
        let _permit = self
            .permit
            .acquire()
            .await
            .context("Session pool closed")?;
        let cached = self.slot.lock().take();
        if let Some(pooled) = cached {
            info!("Shutting down browser session {}", pooled.id);
            pooled.session.close().await?;
        }
        Ok(())
    }
}

/// RAII checkout of the pool's single session
///
/// Dropping the guard returns the session (or closes it if marked for
/// discard) and lets the next queued caller proceed.
pub struct SessionGuard {
    session: Option<PooledSession>,
    pool: Arc<SessionPool>,
    permit: Option<OwnedSemaphorePermit>,
    discard: bool,
}

impl SessionGuard {
    /// The checked-out session.
    pub fn session(&self) -> Result<&dyn BrowserSession> {
        self.session
            .as_ref()
            .map(|p| &*p.session)
            .context("Session guard already released")
    }

    pub fn id(&self) -> Option<u64> {
        self.session.as_ref().map(|p| p.id)
    }

    /// Close the session on release instead of caching it.
    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let (Some(pooled), Some(permit)) = (self.session.take(), self.permit.take()) else {
            return;
        };
        if self.discard {
            self.pool.discard(pooled, permit);
        } else {
            self.pool.release(pooled, permit);
        }
    }
}
