// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote document store: where synced records end up.
//!
//! The reconciler only needs two operations: append a record to a
//! collection, and write a throwaway document to check the connection.
//! Every write creates a new document, so a record redelivered after a
//! partial failure simply appears twice remotely.

pub mod sql;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::config::RemoteConfig;
use crate::record::Record;

pub use sql::SqlDocumentStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Remote store is not configured")]
    NotConfigured,
    #[error("Remote write timed out")]
    Timeout,
    #[error("Remote write failed: {0}")]
    Write(String),
    #[error("Remote connection failed: {0}")]
    Connect(String),
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Append `record` to `collection`. Returns the new document's id.
    async fn write(&self, collection: &str, record: &Record) -> Result<String, RemoteError>;

    /// Write a connection-test document to `collection`.
    async fn probe(&self, collection: &str) -> Result<String, RemoteError>;
}

/// Connect to the remote store `config` describes.
///
/// Returns `Ok(None)` when the settings are missing or still placeholders.
pub async fn connect(config: &RemoteConfig) -> Result<Option<Arc<dyn RemoteStore>>, RemoteError> {
    if !config.is_configured() {
        info!("Remote store not configured, sync disabled");
        return Ok(None);
    }
    let Some(url) = config.url.as_deref() else {
        return Ok(None);
    };

    let store = SqlDocumentStore::connect(url.trim()).await?;
    Ok(Some(Arc::new(store)))
}
