// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync reconciler: pushes pending records to the remote store.
//!
//! # Sync pass
//!
//! ```text
//! sync_all()
//!   ├─ busy?          → Skipped(AlreadyRunning)
//!   ├─ offline?       → Skipped(Offline)
//!   ├─ no remote?     → Skipped(NotConfigured)
//!   └─ for each pending record:
//!        remote.write ──ok──► save(synced = true) ──ok──► synced
//!             │                      └──err──► redeliver (next pass)
//!             └──err──► failed (batch continues)
//! ```
//!
//! Delivery is at-least-once: a record is marked synced only after the
//! remote store confirmed it, and the mark is persisted after. A crash or
//! local failure between the two means the record is sent again.
//!
//! Triggers (startup, interval, reconnect, explicit request, config change)
//! live in [`SyncReconciler::run`].

mod scheduler;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{watch, Notify};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{FieldSyncConfig, RemoteConfig, SyncConfig};
use crate::manager::LocalDataManager;
use crate::metrics;
use crate::record::Record;
use crate::remote::{RemoteError, RemoteStore};
use crate::storage::StorageError;

/// Why a sync pass did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another pass is in flight
    AlreadyRunning,
    Offline,
    /// No usable remote store
    NotConfigured,
}

impl SkipReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyRunning => "already_running",
            Self::Offline => "offline",
            Self::NotConfigured => "not_configured",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one completed sync pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    /// Pending records found at the start of the pass
    pub attempted: usize,
    /// Written remotely and marked synced locally
    pub synced: usize,
    /// Remote write failed; still pending
    pub failed: usize,
    /// Written remotely but the synced mark was not persisted
    pub redeliver: usize,
    /// Full local record set after the pass
    pub records: Vec<Record>,
    pub elapsed: Duration,
}

impl SyncReport {
    /// Records still waiting after this pass.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.records.iter().filter(|r| r.is_pending()).count()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    Skipped(SkipReason),
}

impl SyncOutcome {
    #[must_use]
    pub fn report(&self) -> Option<&SyncReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Skipped(_) => None,
        }
    }

    /// Records synced by this pass (0 when skipped).
    #[must_use]
    pub fn synced(&self) -> usize {
        self.report().map_or(0, |r| r.synced)
    }
}

/// Result of [`SyncReconciler::save_and_sync`].
#[derive(Debug, Clone, PartialEq)]
pub struct SaveOutcome {
    /// The record as last persisted locally
    pub record: Record,
    /// Remote document id when the immediate write succeeded
    pub remote_id: Option<String>,
}

impl SaveOutcome {
    #[must_use]
    pub fn is_synced(&self) -> bool {
        self.record.synced
    }
}

/// Clears the busy flag when a pass ends, including on panic or cancel.
struct PassGuard<'a>(&'a AtomicBool);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Moves pending records from the local manager to the remote store.
pub struct SyncReconciler {
    manager: Arc<LocalDataManager>,
    remote: RwLock<Option<Arc<dyn RemoteStore>>>,
    remote_config: RwLock<RemoteConfig>,
    sync_config: RwLock<SyncConfig>,
    online: watch::Receiver<bool>,
    config_updates: Mutex<Option<watch::Receiver<FieldSyncConfig>>>,
    busy: AtomicBool,
    wake: Notify,
    total_synced: AtomicU64,
    passes: AtomicU64,
}

impl SyncReconciler {
    /// `online` reports connectivity; `true` means the remote may be reachable.
    pub fn new(
        manager: Arc<LocalDataManager>,
        remote: Option<Arc<dyn RemoteStore>>,
        config: &FieldSyncConfig,
        online: watch::Receiver<bool>,
    ) -> Self {
        Self {
            manager,
            remote: RwLock::new(remote),
            remote_config: RwLock::new(config.remote.clone()),
            sync_config: RwLock::new(config.sync.clone()),
            online,
            config_updates: Mutex::new(None),
            busy: AtomicBool::new(false),
            wake: Notify::new(),
            total_synced: AtomicU64::new(0),
            passes: AtomicU64::new(0),
        }
    }

    /// Reconnect and resync whenever a new config is published on `updates`.
    #[must_use]
    pub fn with_config_updates(self, updates: watch::Receiver<FieldSyncConfig>) -> Self {
        *self.config_updates.lock() = Some(updates);
        self
    }

    #[must_use]
    pub fn manager(&self) -> &Arc<LocalDataManager> {
        &self.manager
    }

    /// Replace the remote store (`None` disables sync).
    pub fn set_remote(&self, remote: Option<Arc<dyn RemoteStore>>) {
        *self.remote.write() = remote;
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.remote.read().is_some()
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.online.borrow()
    }

    /// Whether a pass is in flight.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Records synced since construction.
    #[must_use]
    pub fn total_synced(&self) -> u64 {
        self.total_synced.load(Ordering::Relaxed)
    }

    /// Completed passes since construction.
    #[must_use]
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Wake the run loop for an immediate pass.
    pub fn request_sync(&self) {
        self.wake.notify_one();
    }

    fn current_remote(&self) -> Option<Arc<dyn RemoteStore>> {
        self.remote.read().clone()
    }

    fn remote_settings(&self) -> (String, Duration) {
        let config = self.remote_config.read();
        (config.collection.clone(), config.write_timeout())
    }

    async fn write_remote(
        remote: &dyn RemoteStore,
        collection: &str,
        record: &Record,
        budget: Duration,
    ) -> Result<String, RemoteError> {
        let result = match timeout(budget, remote.write(collection, record)).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout),
        };
        metrics::record_remote_write(match &result {
            Ok(_) => "success",
            Err(RemoteError::Timeout) => "timeout",
            Err(_) => "error",
        });
        result
    }

    /// Persist `synced = true` for a record the remote store confirmed.
    ///
    /// The flag is set on the current local copy. A record deleted while
    /// its remote write was in flight is not written back (`Ok(None)`).
    /// The manager already retries and degrades across tiers, so an error
    /// here means every tier refused the write.
    async fn mark_synced(&self, record: &Record) -> Result<Option<Record>, StorageError> {
        let Some(mut current) = self.manager.get(&record.id).await else {
            debug!(id = %record.id, "Record deleted during sync, not marking");
            return Ok(None);
        };
        current.synced = true;
        self.manager.save(current).await.map(Some)
    }

    /// Run one sync pass over every pending record.
    ///
    /// Never fails: per-record errors are logged and counted in the report.
    #[tracing::instrument(skip(self))]
    pub async fn sync_all(&self) -> SyncOutcome {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Sync already running, skipping");
            return self.skipped(SkipReason::AlreadyRunning);
        }
        let _guard = PassGuard(&self.busy);

        if !self.is_online() {
            debug!("Offline, skipping sync");
            return self.skipped(SkipReason::Offline);
        }
        let Some(remote) = self.current_remote() else {
            debug!("Remote store not configured, skipping sync");
            return self.skipped(SkipReason::NotConfigured);
        };

        let start = Instant::now();
        let (collection, budget) = self.remote_settings();
        let pending = self.manager.get_unsynced().await;
        info!(pending = pending.len(), "Starting sync pass");

        let mut synced = 0;
        let mut failed = 0;
        let mut redeliver = 0;

        for record in &pending {
            match Self::write_remote(remote.as_ref(), &collection, record, budget).await {
                Ok(remote_id) => match self.mark_synced(record).await {
                    Ok(None) => {}
                    Ok(Some(_)) => {
                        debug!(id = %record.id, remote_id = %remote_id, "Record synced");
                        synced += 1;
                    }
                    Err(e) => {
                        warn!(
                            id = %record.id,
                            remote_id = %remote_id,
                            error = %e,
                            "Remote write succeeded but synced flag not persisted; will resend"
                        );
                        metrics::record_partial_durability();
                        redeliver += 1;
                    }
                },
                Err(e) => {
                    warn!(id = %record.id, error = %e, "Remote write failed, record stays pending");
                    failed += 1;
                }
            }
        }

        let records = self.manager.get_all().await;
        let elapsed = start.elapsed();

        self.total_synced.fetch_add(synced as u64, Ordering::Relaxed);
        self.passes.fetch_add(1, Ordering::Relaxed);
        metrics::record_sync_pass("completed", synced, failed, elapsed);

        info!(
            attempted = pending.len(),
            synced,
            failed,
            redeliver,
            elapsed_ms = elapsed.as_millis() as u64,
            "Sync pass complete"
        );

        SyncOutcome::Completed(SyncReport {
            attempted: pending.len(),
            synced,
            failed,
            redeliver,
            records,
            elapsed,
        })
    }

    fn skipped(&self, reason: SkipReason) -> SyncOutcome {
        metrics::record_sync_pass(reason.as_str(), 0, 0, Duration::ZERO);
        SyncOutcome::Skipped(reason)
    }

    /// Save locally, then try an immediate remote write when possible.
    ///
    /// Only the local save can fail the call. A remote failure leaves the
    /// record pending for the next pass.
    pub async fn save_and_sync(&self, record: Record) -> Result<SaveOutcome, StorageError> {
        let stored = self.manager.save(record).await?;

        let remote = match (self.is_online(), self.current_remote()) {
            (true, Some(remote)) => remote,
            _ => {
                debug!(id = %stored.id, "Saved locally, sync deferred");
                return Ok(SaveOutcome { record: stored, remote_id: None });
            }
        };

        let (collection, budget) = self.remote_settings();
        match Self::write_remote(remote.as_ref(), &collection, &stored, budget).await {
            Ok(remote_id) => match self.mark_synced(&stored).await {
                Ok(None) => Ok(SaveOutcome { record: stored, remote_id: Some(remote_id) }),
                Ok(Some(marked)) => {
                    self.total_synced.fetch_add(1, Ordering::Relaxed);
                    Ok(SaveOutcome { record: marked, remote_id: Some(remote_id) })
                }
                Err(e) => {
                    warn!(id = %stored.id, error = %e, "Synced flag not persisted; will resend");
                    metrics::record_partial_durability();
                    Ok(SaveOutcome { record: stored, remote_id: Some(remote_id) })
                }
            },
            Err(e) => {
                warn!(id = %stored.id, error = %e, "Immediate sync failed, record stays pending");
                Ok(SaveOutcome { record: stored, remote_id: None })
            }
        }
    }

    /// Connection test: write a probe document to the probe collection.
    pub async fn probe(&self) -> Result<String, RemoteError> {
        let remote = self.current_remote().ok_or(RemoteError::NotConfigured)?;
        let (collection, budget) = {
            let config = self.remote_config.read();
            (config.probe_collection.clone(), config.write_timeout())
        };

        match timeout(budget, remote.probe(&collection)).await {
            Ok(Ok(id)) => {
                info!(collection = %collection, "Remote connection test succeeded");
                Ok(id)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Remote connection test failed");
                Err(e)
            }
            Err(_) => {
                warn!("Remote connection test timed out");
                Err(RemoteError::Timeout)
            }
        }
    }
}
