//! Volatile tier: records live in process memory and are lost on exit.
//!
//! This tier cannot fail, which is what makes it the floor of the fallback
//! chain.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::traits::{prepare_for_write, StorageBackend, StorageError, TierCapabilities, TierKind};
use crate::record::Record;

pub struct VolatileStore {
    /// id → (insertion sequence, record)
    data: DashMap<String, (u64, Record)>,
    next_seq: AtomicU64,
}

impl VolatileStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Get current record count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for VolatileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for VolatileStore {
    fn kind(&self) -> TierKind {
        TierKind::Volatile
    }

    fn capabilities(&self) -> TierCapabilities {
        TierCapabilities {
            durable: false,
            transactional: false,
            indexed: false,
            whole_collection_writes: false,
        }
    }

    async fn init(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn save(&self, record: &Record) -> Result<Record, StorageError> {
        let stored = prepare_for_write(record)?;
        // Replacing keeps the original position
        self.data
            .entry(stored.id.clone())
            .and_modify(|(_, existing)| *existing = stored.clone())
            .or_insert_with(|| (self.next_seq.fetch_add(1, Ordering::Relaxed), stored.clone()));
        Ok(stored)
    }

    async fn get_all(&self) -> Result<Vec<Record>, StorageError> {
        let mut entries: Vec<(u64, Record)> =
            self.data.iter().map(|r| r.value().clone()).collect();
        entries.sort_by_key(|(seq, _)| *seq);
        Ok(entries.into_iter().map(|(_, record)| record).collect())
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        self.data.remove(id);
        Ok(true)
    }

    async fn clear(&self) -> Result<bool, StorageError> {
        self.data.clear();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_record(id: &str) -> Record {
        Record::with_id(id, format!("site-{}", id))
    }

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = VolatileStore::new();
        assert!(store.is_empty());
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_stamps_timestamp() {
        let store = VolatileStore::new();
        let stored = store.save(&test_record("r1")).await.unwrap();
        assert!(stored.timestamp.is_some());

        let all = store.get_all().await.unwrap();
        assert_eq!(all, vec![stored]);
    }

    #[tokio::test]
    async fn test_save_rejects_missing_id() {
        let store = VolatileStore::new();
        let result = store.save(&test_record("")).await;
        assert!(matches!(result, Err(StorageError::InvalidRecord(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_save_upserts_in_place() {
        let store = VolatileStore::new();
        store.save(&test_record("a")).await.unwrap();
        store.save(&test_record("b")).await.unwrap();

        let mut updated = test_record("a");
        updated.synced = true;
        store.save(&updated).await.unwrap();

        let all = store.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "a");
        assert!(all[0].synced);
        assert_eq!(all[1].id, "b");
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let store = VolatileStore::new();
        store.save(&test_record("keep")).await.unwrap();

        assert!(store.delete("missing").await.unwrap());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_then_reuse() {
        let store = VolatileStore::new();
        for i in 0..10 {
            store.save(&test_record(&format!("r{}", i))).await.unwrap();
        }
        assert!(store.clear().await.unwrap());
        assert!(store.is_empty());

        store.save(&test_record("after")).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unsynced_filter() {
        let store = VolatileStore::new();
        let mut done = test_record("done");
        done.synced = true;
        store.save(&done).await.unwrap();
        store.save(&test_record("todo")).await.unwrap();

        let pending = store.get_unsynced().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "todo");
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        use std::sync::Arc;

        let store = Arc::new(VolatileStore::new());
        let mut handles = vec![];

        for batch in 0..10 {
            let store_clone = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    let record = test_record(&format!("batch-{}-record-{}", batch, i));
                    store_clone.save(&record).await.unwrap();
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len(), 100);
    }
}
