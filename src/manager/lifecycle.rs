//! Manager lifecycle: construction, tier negotiation, shutdown.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::FieldSyncConfig;
use crate::metrics;
use crate::storage::{StorageBackend, StorageError, Tier, TierKind};

use super::{bounded, LocalDataManager, ManagerState, StorageInfo};

fn tier_level(kind: TierKind) -> u8 {
    match kind {
        TierKind::Transactional => 0,
        TierKind::KeyValue => 1,
        TierKind::Volatile => 2,
    }
}

impl LocalDataManager {
    /// Create a manager over the tiers `config` describes.
    ///
    /// Nothing is opened until [`init`](Self::init).
    #[must_use]
    pub fn new(config: FieldSyncConfig) -> Self {
        let candidates = Tier::candidates(&config)
            .into_iter()
            .map(|tier| Arc::new(tier) as Arc<dyn StorageBackend>)
            .collect();
        Self::with_backends(config, candidates)
    }

    /// Create a manager over an explicit tier chain, most reliable first.
    ///
    /// Useful for embedding custom backends. No volatile tier is appended,
    /// so a chain without one can end in [`StorageError::Exhausted`].
    #[must_use]
    pub fn with_backends(config: FieldSyncConfig, backends: Vec<Arc<dyn StorageBackend>>) -> Self {
        let (state_tx, state_rx) = watch::channel(ManagerState::Created);
        Self {
            config,
            state: state_tx,
            state_rx,
            candidates: backends,
            chain: Vec::new(),
            spilled: DashMap::new(),
            snapshot: RwLock::new(Vec::new()),
        }
    }

    /// Construct and initialize in one step.
    pub async fn open(config: FieldSyncConfig) -> Result<Self, StorageError> {
        let mut manager = Self::new(config);
        manager.init().await?;
        Ok(manager)
    }

    /// Open tiers in fallback order and select the active one.
    ///
    /// The first tier gets `primary_init_timeout`, the rest `op_timeout`.
    /// Tiers that fail or time out are skipped. Tiers that open stay in
    /// the chain as write fallbacks. Calling `init` again once ready is a
    /// no-op.
    #[tracing::instrument(skip(self))]
    pub async fn init(&mut self) -> Result<StorageInfo, StorageError> {
        match self.state() {
            ManagerState::Created => {}
            ManagerState::Ready => return Ok(self.storage_info()),
            _ => return Err(StorageError::NotReady),
        }

        info!("Initializing local storage...");
        let _ = self.state.send(ManagerState::Initializing);

        let candidates = std::mem::take(&mut self.candidates);
        for (idx, backend) in candidates.into_iter().enumerate() {
            let kind = backend.kind();
            let budget = if idx == 0 {
                self.config.primary_init_timeout()
            } else {
                self.config.op_timeout()
            };

            match bounded(kind, "init", budget, backend.init()).await {
                Ok(()) => {
                    metrics::record_tier_init(kind.as_str(), true);
                    debug!(tier = %kind, "Storage tier opened");
                    self.chain.push(backend);
                }
                Err(e) => {
                    metrics::record_tier_init(kind.as_str(), false);
                    warn!(tier = %kind, error = %e, "Storage tier unavailable, trying next");
                }
            }
        }

        let Some(active) = self.chain.first() else {
            error!("No storage tier could be opened");
            let _ = self.state.send(ManagerState::Created);
            return Err(StorageError::Exhausted);
        };
        let active_kind = active.kind();
        metrics::set_active_tier(tier_level(active_kind));

        let _ = self.state.send(ManagerState::Ready);

        // Warm the last-known snapshot so early read failures have a fallback
        let records = self.get_all().await;
        let pending = records.iter().filter(|r| r.is_pending()).count();
        metrics::set_pending_records(pending);

        let info = self.storage_info();
        info!(
            active = %active_kind,
            fallbacks = info.fallbacks.len(),
            records = records.len(),
            pending,
            "Local storage ready"
        );
        Ok(info)
    }

    /// Release every tier handle.
    ///
    /// Afterwards writes return [`StorageError::NotReady`] and reads serve
    /// the last-known snapshot.
    pub async fn shutdown(&self) {
        if matches!(self.state(), ManagerState::ShuttingDown | ManagerState::Closed) {
            return;
        }

        info!("Shutting down local storage...");
        let _ = self.state.send(ManagerState::ShuttingDown);

        for backend in &self.chain {
            backend.close().await;
            debug!(tier = %backend.kind(), "Storage tier closed");
        }

        let _ = self.state.send(ManagerState::Closed);
        info!("Local storage closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::VolatileStore;

    #[tokio::test]
    async fn test_init_volatile_only() {
        let mut manager = LocalDataManager::new(FieldSyncConfig::volatile());
        let info = manager.init().await.unwrap();

        assert_eq!(info.active, Some(TierKind::Volatile));
        assert_eq!(info.type_name, "volatile");
        assert!(info.fallbacks.is_empty());
        assert!(!info.is_durable());
        assert_eq!(manager.state(), ManagerState::Ready);
    }

    #[tokio::test]
    async fn test_init_twice_is_noop() {
        let mut manager = LocalDataManager::new(FieldSyncConfig::volatile());
        manager.init().await.unwrap();
        let info = manager.init().await.unwrap();
        assert_eq!(info.active, Some(TierKind::Volatile));
    }

    #[tokio::test]
    async fn test_empty_chain_is_exhausted() {
        let mut manager = LocalDataManager::with_backends(FieldSyncConfig::volatile(), Vec::new());
        assert!(matches!(manager.init().await, Err(StorageError::Exhausted)));
        assert_eq!(manager.state(), ManagerState::Created);
    }

    #[tokio::test]
    async fn test_shutdown_transitions_to_closed() {
        let volatile: Arc<dyn StorageBackend> = Arc::new(VolatileStore::new());
        let mut manager = LocalDataManager::with_backends(FieldSyncConfig::volatile(), vec![volatile]);
        manager.init().await.unwrap();
        let stored = manager.save(crate::Record::new("site")).await.unwrap();

        let mut rx = manager.state_receiver();
        manager.shutdown().await;
        assert_eq!(*rx.borrow_and_update(), ManagerState::Closed);

        assert!(matches!(
            manager.save(crate::Record::new("late")).await,
            Err(StorageError::NotReady)
        ));
        // Reads still serve what was last known
        assert_eq!(manager.get_all().await, vec![stored]);
    }
}
