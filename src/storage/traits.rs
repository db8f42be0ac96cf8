use async_trait::async_trait;
use thiserror::Error;

use crate::record::Record;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("{tier} tier unavailable: {reason}")]
    Unavailable { tier: TierKind, reason: String },
    #[error("{tier} tier timed out during {operation}")]
    Timeout { tier: TierKind, operation: &'static str },
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Storage is not initialized")]
    NotReady,
    #[error("Every storage tier failed")]
    Exhausted,
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Which tier of the fallback chain a backend belongs to.
///
/// Ordered from most to least reliable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TierKind {
    /// Transactional, schema-versioned SQL store
    Transactional,
    /// Synchronous string-keyed store, whole-collection writes
    KeyValue,
    /// In-process memory, lost on exit
    Volatile,
}

impl TierKind {
    /// Stable name for logs, metrics and [`crate::StorageInfo`].
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transactional => "transactional",
            Self::KeyValue => "key-value",
            Self::Volatile => "volatile",
        }
    }
}

impl std::fmt::Display for TierKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability flags a tier reports for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierCapabilities {
    /// Survives process exit
    pub durable: bool,
    /// Writes are all-or-nothing transactions
    pub transactional: bool,
    /// Has secondary indexes (timestamp, synced)
    pub indexed: bool,
    /// Every write re-serializes the full collection
    pub whole_collection_writes: bool,
}

/// Uniform contract implemented by every storage tier.
///
/// `save` must reject records without an id, stamp a missing `timestamp`
/// and upsert by id. `delete` of a missing id succeeds.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> TierKind;

    fn capabilities(&self) -> TierCapabilities;

    async fn init(&self) -> Result<(), StorageError>;

    async fn save(&self, record: &Record) -> Result<Record, StorageError>;

    async fn get_all(&self) -> Result<Vec<Record>, StorageError>;

    /// Records with `synced == false`.
    /// Default implementation filters `get_all`.
    async fn get_unsynced(&self) -> Result<Vec<Record>, StorageError> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(Record::is_pending)
            .collect())
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError>;

    async fn clear(&self) -> Result<bool, StorageError>;

    /// Release handles. Default is a no-op.
    async fn close(&self) {}
}

/// Shared pre-write step for every tier: reject anonymous records and
/// stamp the creation instant.
pub(crate) fn prepare_for_write(record: &Record) -> Result<Record, StorageError> {
    if record.id.trim().is_empty() {
        return Err(StorageError::InvalidRecord("record has no id".into()));
    }
    let mut stored = record.clone();
    stored.ensure_timestamp();
    Ok(stored)
}
