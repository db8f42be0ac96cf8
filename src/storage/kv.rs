// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Key-value tier: the whole collection lives under one key of a
//! synchronous string store.
//!
//! Every write reads the collection, applies the change and writes the full
//! JSON array back, so a write costs O(n) in the number of stored records.
//! `init` only trusts the store after a throwaway write and remove succeed.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::spawn_blocking;
use tracing::{debug, info};

use super::traits::{prepare_for_write, StorageBackend, StorageError, TierCapabilities, TierKind};
use crate::record::Record;

/// Key written and removed by the availability probe.
pub const PROBE_KEY: &str = "__storage_test__";

/// A synchronous string-keyed store.
pub trait StringStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Prepare the backend (create directories, connect). Default is a no-op.
    fn open(&self) -> Result<(), StorageError> {
        Ok(())
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key succeeds.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;
}

/// One file per key inside a directory.
///
/// Writes go to a temporary sibling first and are renamed into place, so a
/// crash mid-write leaves the previous value intact.
pub struct FileStringStore {
    dir: PathBuf,
}

impl FileStringStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
            .collect();
        self.dir.join(format!("{}.json", file))
    }
}

fn io_err(context: &str, path: &Path, e: std::io::Error) -> StorageError {
    StorageError::Backend(format!("{} {}: {}", context, path.display(), e))
}

impl StringStore for FileStringStore {
    fn name(&self) -> &'static str {
        "file"
    }

    fn open(&self) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| io_err("create", &self.dir, e))
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err("read", &path, e)),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value).map_err(|e| io_err("write", &tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| io_err("rename", &path, e))
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err("remove", &path, e)),
        }
    }
}

/// The collection key plus its backing store. Every method blocks.
struct Collection {
    store: Arc<dyn StringStore>,
    key: String,
    /// Serializes read-modify-write cycles on the collection
    write_lock: Mutex<()>,
}

impl Collection {
    fn load(&self) -> Result<Vec<Record>, StorageError> {
        match self.store.get_item(&self.key)? {
            Some(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str(&raw)?),
            _ => Ok(Vec::new()),
        }
    }

    fn persist(&self, records: &[Record]) -> Result<(), StorageError> {
        let raw = serde_json::to_string(records)?;
        self.store.set_item(&self.key, &raw)
    }

    fn probe(&self) -> Result<usize, StorageError> {
        self.store.open()?;
        self.store.set_item(PROBE_KEY, PROBE_KEY)?;
        self.store.remove_item(PROBE_KEY)?;
        // A corrupt collection is not a usable tier
        Ok(self.load()?.len())
    }

    fn upsert(&self, stored: &Record) -> Result<usize, StorageError> {
        let _guard = self.write_lock.lock();
        let mut records = self.load()?;
        match records.iter_mut().find(|r| r.id == stored.id) {
            Some(existing) => *existing = stored.clone(),
            None => records.push(stored.clone()),
        }
        self.persist(&records)?;
        Ok(records.len())
    }

    fn remove(&self, id: &str) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        let mut records = self.load()?;
        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() != before {
            self.persist(&records)?;
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        self.store.remove_item(&self.key)
    }
}

/// Key-value tier over any [`StringStore`].
///
/// Store calls run on the blocking pool, so a stalled file system or Redis
/// server only holds a blocking thread and the caller's timeout still fires.
/// A call that outlives its timeout finishes in the background.
pub struct KeyValueStore {
    inner: Arc<Collection>,
}

impl KeyValueStore {
    pub fn new(store: Arc<dyn StringStore>, key: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Collection {
                store,
                key: key.into(),
                write_lock: Mutex::new(()),
            }),
        }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Collection) -> Result<T, StorageError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        spawn_blocking(move || op(&inner))
            .await
            .map_err(|e| StorageError::Backend(format!("key-value task failed: {}", e)))?
    }
}

#[async_trait]
impl StorageBackend for KeyValueStore {
    fn kind(&self) -> TierKind {
        TierKind::KeyValue
    }

    fn capabilities(&self) -> TierCapabilities {
        TierCapabilities {
            durable: true,
            transactional: false,
            indexed: false,
            whole_collection_writes: true,
        }
    }

    async fn init(&self) -> Result<(), StorageError> {
        let existing = self
            .blocking(Collection::probe)
            .await
            .map_err(|e| StorageError::Unavailable {
                tier: TierKind::KeyValue,
                reason: e.to_string(),
            })?;

        info!(backend = self.inner.store.name(), key = %self.inner.key, records = existing, "Key-value store opened");
        Ok(())
    }

    async fn save(&self, record: &Record) -> Result<Record, StorageError> {
        let stored = prepare_for_write(record)?;

        let written = stored.clone();
        let total = self.blocking(move |c| c.upsert(&written)).await?;
        debug!(id = %stored.id, total, "Collection rewritten");

        Ok(stored)
    }

    async fn get_all(&self) -> Result<Vec<Record>, StorageError> {
        self.blocking(Collection::load).await
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let id = id.to_string();
        self.blocking(move |c| c.remove(&id)).await?;
        Ok(true)
    }

    async fn clear(&self) -> Result<bool, StorageError> {
        self.blocking(Collection::clear).await?;
        Ok(true)
    }
}
