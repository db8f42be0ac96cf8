// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local data manager.
//!
//! The [`LocalDataManager`] owns every storage tier handle. It routes CRUD
//! to the active tier and degrades failing writes down the chain. It also
//! keeps the last-known record set for reads that cannot reach a tier.
//!
//! # Lifecycle
//!
//! ```text
//! Created → Initializing → Ready → ShuttingDown → Closed
//! ```
//!
//! # Degraded writes
//!
//! A save that fails on the active tier (after the bounded retry, or at
//! once on a timeout) lands on the next tier instead. That record is *spilled*: `get_all` overlays it on
//! the active tier's set until a later save of the same id reaches the
//! active tier again.
//!
//! # Example
//!
//! ```rust,no_run
//! use field_sync::{FieldSyncConfig, LocalDataManager, Record};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), field_sync::StorageError> {
//! let manager = LocalDataManager::open(FieldSyncConfig::default()).await?;
//! println!("storage: {}", manager.storage_info());
//!
//! let mut record = Record::new("Tama river mouth");
//! record.temperature = Some(18.5);
//! manager.save(record).await?;
//!
//! assert_eq!(manager.pending_count().await, 1);
//! manager.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod lifecycle;
mod types;

pub use types::{ManagerState, StorageInfo};

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::FieldSyncConfig;
use crate::metrics::{self, LatencyTimer};
use crate::record::{demo_records, Record};
use crate::resilience::retry::retry_if;
use crate::storage::{StorageBackend, StorageError, TierKind};

/// Owned context for local persistence.
///
/// Construct once at startup, [`init`](Self::init) it, then share it
/// behind an `Arc` with every consumer.
pub struct LocalDataManager {
    pub(super) config: FieldSyncConfig,

    /// Lifecycle state (broadcast to watchers)
    pub(super) state: watch::Sender<ManagerState>,
    pub(super) state_rx: watch::Receiver<ManagerState>,

    /// Tiers not yet opened (drained by init)
    pub(super) candidates: Vec<Arc<dyn StorageBackend>>,

    /// Opened tiers; index 0 is the active tier
    pub(super) chain: Vec<Arc<dyn StorageBackend>>,

    /// Record id → chain index holding its latest copy (never 0)
    pub(super) spilled: DashMap<String, usize>,

    /// Last-known full record set
    pub(super) snapshot: RwLock<Vec<Record>>,
}

/// Run one tier operation under the per-op budget, with metrics.
///
/// A timeout becomes `StorageError::Timeout` so callers treat it like any
/// other tier failure.
pub(crate) async fn bounded<T>(
    tier: TierKind,
    operation: &'static str,
    budget: Duration,
    op: impl Future<Output = Result<T, StorageError>>,
) -> Result<T, StorageError> {
    let _timer = LatencyTimer::new(tier.as_str(), operation);
    let result = match timeout(budget, op).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout { tier, operation }),
    };
    let status = match &result {
        Ok(_) => "success",
        Err(StorageError::Timeout { .. }) => "timeout",
        Err(_) => "error",
    };
    metrics::record_operation(tier.as_str(), operation, status);
    result
}

/// A timed-out tier is not retried; the save moves down the chain.
fn is_retryable(err: &StorageError) -> bool {
    !matches!(err, StorageError::Timeout { .. } | StorageError::InvalidRecord(_))
}

/// Replace the record with the same id, or append.
fn upsert_into(records: &mut Vec<Record>, record: Record) {
    match records.iter_mut().find(|r| r.id == record.id) {
        Some(existing) => *existing = record,
        None => records.push(record),
    }
}

impl LocalDataManager {
    /// Get current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ManagerState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ManagerState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state() == ManagerState::Ready
    }

    #[must_use]
    pub fn config(&self) -> &FieldSyncConfig {
        &self.config
    }

    /// The tier currently serving reads and writes.
    #[must_use]
    pub fn active_tier(&self) -> Option<TierKind> {
        self.chain.first().map(|b| b.kind())
    }

    /// Report the active tier and its capabilities.
    #[must_use]
    pub fn storage_info(&self) -> StorageInfo {
        let active = self.chain.first();
        StorageInfo {
            active: active.map(|b| b.kind()),
            type_name: active.map_or("uninitialized", |b| b.kind().as_str()),
            capabilities: active.map(|b| b.capabilities()).unwrap_or_default(),
            fallbacks: self.chain.iter().skip(1).map(|b| b.kind()).collect(),
            spilled: self.spilled.len(),
            state: self.state(),
        }
    }

    fn active(&self) -> Result<&Arc<dyn StorageBackend>, StorageError> {
        if !self.is_ready() {
            return Err(StorageError::NotReady);
        }
        self.chain.first().ok_or(StorageError::NotReady)
    }

    fn snapshot(&self) -> Vec<Record> {
        self.snapshot.read().clone()
    }

    fn remember(&self, record: &Record) {
        upsert_into(&mut self.snapshot.write(), record.clone());
    }

    /// Persist a record, degrading down the tier chain on failure.
    ///
    /// Validates first and stamps `timestamp` if absent. Only an invalid
    /// record, an uninitialized manager, or every tier failing surfaces as
    /// an error.
    pub async fn save(&self, record: Record) -> Result<Record, StorageError> {
        self.active()?;
        record.validate()?;

        let mut record = record;
        record.ensure_timestamp();
        let record = record;

        let retry_config = self.config.write_retry();
        let budget = self.config.op_timeout();

        for (idx, backend) in self.chain.iter().enumerate() {
            let kind = backend.kind();
            let result = retry_if("local_save", &retry_config, is_retryable, || {
                let backend = Arc::clone(backend);
                let record = record.clone();
                async move { bounded(kind, "save", budget, backend.save(&record)).await }
            })
            .await;

            match result {
                Ok(stored) => {
                    if idx == 0 {
                        self.spilled.remove(&stored.id);
                    } else {
                        self.spilled.insert(stored.id.clone(), idx);
                    }
                    metrics::set_spilled_records(self.spilled.len());
                    self.remember(&stored);
                    debug!(id = %stored.id, tier = %kind, "Record saved");
                    return Ok(stored);
                }
                Err(StorageError::InvalidRecord(reason)) => {
                    return Err(StorageError::InvalidRecord(reason));
                }
                Err(e) => {
                    warn!(id = %record.id, tier = %kind, error = %e, "Save failed, degrading to next tier");
                    if let Some(next) = self.chain.get(idx + 1) {
                        metrics::record_failover(kind.as_str(), next.kind().as_str(), "save");
                    }
                }
            }
        }

        error!(id = %record.id, "Save failed on every storage tier");
        Err(StorageError::Exhausted)
    }

    /// Current full record set.
    ///
    /// Never fails: if the active tier cannot be read, the last-known
    /// snapshot is returned instead.
    pub async fn get_all(&self) -> Vec<Record> {
        let Ok(active) = self.active() else {
            return self.snapshot();
        };

        match bounded(active.kind(), "get_all", self.config.op_timeout(), active.get_all()).await {
            Ok(records) => {
                let merged = self.overlay_spilled(records).await;
                *self.snapshot.write() = merged.clone();
                merged
            }
            Err(e) => {
                warn!(tier = %active.kind(), error = %e, "Read failed, serving last-known snapshot");
                metrics::record_snapshot_read();
                self.snapshot()
            }
        }
    }

    /// Overlay spilled records (read from their fallback tiers) on `records`.
    async fn overlay_spilled(&self, mut records: Vec<Record>) -> Vec<Record> {
        if self.spilled.is_empty() {
            return records;
        }

        let spilled: Vec<(String, usize)> = self
            .spilled
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        let mut tiers: Vec<usize> = spilled.iter().map(|(_, idx)| *idx).collect();
        tiers.sort_unstable();
        tiers.dedup();

        for idx in tiers {
            let Some(backend) = self.chain.get(idx) else { continue };
            let wanted: HashSet<&str> = spilled
                .iter()
                .filter(|(_, i)| *i == idx)
                .map(|(id, _)| id.as_str())
                .collect();

            let source = match bounded(backend.kind(), "get_all", self.config.op_timeout(), backend.get_all()).await {
                Ok(all) => all,
                Err(e) => {
                    warn!(tier = %backend.kind(), error = %e, "Fallback tier unreadable, using snapshot copies");
                    self.snapshot()
                }
            };
            for record in source.into_iter().filter(|r| wanted.contains(r.id.as_str())) {
                upsert_into(&mut records, record);
            }
        }

        records
    }

    /// Save the sample measurements, for a session without a remote store.
    ///
    /// Demo records have fixed ids, so loading them again leaves one copy of
    /// each. Returns how many were saved.
    pub async fn load_demo_data(&self) -> Result<usize, StorageError> {
        let demos = demo_records();
        let count = demos.len();
        for record in demos {
            self.save(record).await?;
        }
        info!(count, "Demo records loaded");
        Ok(count)
    }

    /// Current copy of one record, if it exists.
    pub async fn get(&self, id: &str) -> Option<Record> {
        self.get_all().await.into_iter().find(|r| r.id == id)
    }

    /// Records still waiting for a remote write.
    ///
    /// Served from the active tier's `synced` index when nothing is spilled.
    pub async fn get_unsynced(&self) -> Vec<Record> {
        if self.spilled.is_empty() {
            if let Ok(active) = self.active() {
                match bounded(active.kind(), "get_unsynced", self.config.op_timeout(), active.get_unsynced()).await {
                    Ok(records) => {
                        metrics::set_pending_records(records.len());
                        return records;
                    }
                    Err(e) => {
                        warn!(tier = %active.kind(), error = %e, "Indexed pending read failed");
                    }
                }
            }
        }

        let pending: Vec<Record> = self
            .get_all()
            .await
            .into_iter()
            .filter(Record::is_pending)
            .collect();
        metrics::set_pending_records(pending.len());
        pending
    }

    /// Number of records still waiting for a remote write.
    pub async fn pending_count(&self) -> usize {
        self.get_unsynced().await.len()
    }

    /// Delete a record by id.
    ///
    /// A missing id is a successful no-op. Returns `Ok(false)` when the
    /// active tier could not apply the delete.
    pub async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let active = self.active()?;
        let budget = self.config.op_timeout();

        let deleted = match bounded(active.kind(), "delete", budget, active.delete(id)).await {
            Ok(deleted) => deleted,
            Err(e) => {
                warn!(id, tier = %active.kind(), error = %e, "Delete failed");
                false
            }
        };

        let spill_tier = self.spilled.get(id).map(|entry| *entry.value());
        if let Some(idx) = spill_tier {
            if let Some(backend) = self.chain.get(idx) {
                match bounded(backend.kind(), "delete", budget, backend.delete(id)).await {
                    Ok(_) => {
                        self.spilled.remove(id);
                    }
                    Err(e) => warn!(id, tier = %backend.kind(), error = %e, "Delete of spilled copy failed"),
                }
            }
        }

        if deleted {
            self.snapshot.write().retain(|r| r.id != id);
        }
        Ok(deleted)
    }

    /// Remove every record from every opened tier.
    ///
    /// Returns `Ok(true)` when the active tier was cleared. The manager
    /// stays usable afterwards.
    pub async fn clear(&self) -> Result<bool, StorageError> {
        self.active()?;
        let budget = self.config.op_timeout();

        let mut cleared = true;
        for (idx, backend) in self.chain.iter().enumerate() {
            let ok = match bounded(backend.kind(), "clear", budget, backend.clear()).await {
                Ok(ok) => ok,
                Err(e) => {
                    warn!(tier = %backend.kind(), error = %e, "Clear failed");
                    false
                }
            };
            if idx == 0 {
                cleared = ok;
            }
        }

        self.spilled.clear();
        metrics::set_spilled_records(0);
        if cleared {
            self.snapshot.write().clear();
            metrics::set_pending_records(0);
        }
        Ok(cleared)
    }
}
