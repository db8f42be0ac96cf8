// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Storage tiers and the tagged selector over them.
//!
//! ```text
//! Transactional (sqlx)  →  KeyValue (file / redis)  →  Volatile (memory)
//!   durable, indexed         durable, O(n) writes        always succeeds
//! ```
//!
//! [`Tier`] is resolved once per candidate at startup; the manager then only
//! talks to the uniform [`StorageBackend`] contract.

pub mod traits;
pub mod sql;
pub mod kv;
pub mod redis;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::config::FieldSyncConfig;
use crate::record::Record;

pub use traits::{StorageBackend, StorageError, TierCapabilities, TierKind};
pub use sql::TransactionalStore;
pub use kv::{FileStringStore, KeyValueStore, StringStore};
pub use self::redis::RedisStringStore;
pub use memory::VolatileStore;

/// One concrete storage tier.
pub enum Tier {
    Transactional(TransactionalStore),
    KeyValue(KeyValueStore),
    Volatile(VolatileStore),
}

impl Tier {
    /// Candidate tiers for `config`, most reliable first.
    ///
    /// The volatile tier is always last. A key-value backend that cannot
    /// even be described (bad Redis URL) is left out with a warning.
    pub fn candidates(config: &FieldSyncConfig) -> Vec<Tier> {
        let mut tiers = Vec::with_capacity(3);

        if let Some(ref url) = config.sql_url {
            tiers.push(Tier::Transactional(
                TransactionalStore::new(url.clone()).with_acquire_timeout(config.op_timeout()),
            ));
        }

        let kv_backend: Option<Arc<dyn StringStore>> = if let Some(ref url) = config.redis_url {
            match RedisStringStore::with_prefix(url, config.redis_prefix.as_deref()) {
                Ok(store) => Some(Arc::new(store)),
                Err(e) => {
                    warn!(error = %e, "Ignoring invalid Redis URL for key-value tier");
                    None
                }
            }
        } else {
            config
                .kv_dir
                .as_ref()
                .map(|dir| Arc::new(FileStringStore::new(dir)) as Arc<dyn StringStore>)
        };
        if let Some(store) = kv_backend {
            tiers.push(Tier::KeyValue(KeyValueStore::new(store, config.kv_key.clone())));
        }

        tiers.push(Tier::Volatile(VolatileStore::new()));
        tiers
    }

    fn backend(&self) -> &dyn StorageBackend {
        match self {
            Tier::Transactional(store) => store,
            Tier::KeyValue(store) => store,
            Tier::Volatile(store) => store,
        }
    }
}

#[async_trait]
impl StorageBackend for Tier {
    fn kind(&self) -> TierKind {
        self.backend().kind()
    }

    fn capabilities(&self) -> TierCapabilities {
        self.backend().capabilities()
    }

    async fn init(&self) -> Result<(), StorageError> {
        self.backend().init().await
    }

    async fn save(&self, record: &Record) -> Result<Record, StorageError> {
        self.backend().save(record).await
    }

    async fn get_all(&self) -> Result<Vec<Record>, StorageError> {
        self.backend().get_all().await
    }

    async fn get_unsynced(&self) -> Result<Vec<Record>, StorageError> {
        self.backend().get_unsynced().await
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        self.backend().delete(id).await
    }

    async fn clear(&self) -> Result<bool, StorageError> {
        self.backend().clear().await
    }

    async fn close(&self) {
        self.backend().close().await
    }
}
