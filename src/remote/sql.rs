// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL-backed document store.
//!
//! Documents are append-only rows keyed by a fresh UUID:
//!
//! ```sql
//! CREATE TABLE documents (
//!   remote_id TEXT PRIMARY KEY,
//!   collection TEXT NOT NULL,
//!   record_id TEXT,            -- NULL for probe documents
//!   payload TEXT NOT NULL,     -- JSON
//!   written_at TEXT NOT NULL   -- RFC 3339
//! );
//! CREATE INDEX idx_documents_record ON documents (collection, record_id);
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};
use tracing::debug;

use super::{RemoteError, RemoteStore};
use crate::record::Record;
use crate::storage::sql::{install_drivers, text_column};

fn write_err(e: sqlx::Error) -> RemoteError {
    RemoteError::Write(e.to_string())
}

pub struct SqlDocumentStore {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlDocumentStore {
    /// Connect and create the documents table if needed.
    pub async fn connect(url: &str) -> Result<Self, RemoteError> {
        install_drivers();
        let is_sqlite = url.starts_with("sqlite:");

        let pool = AnyPoolOptions::new()
            .max_connections(if is_sqlite { 1 } else { 5 })
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await
            .map_err(|e| RemoteError::Connect(e.to_string()))?;

        let store = Self { pool, is_sqlite };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), RemoteError> {
        let (create_table, create_index) = if self.is_sqlite {
            (
                r#"
                CREATE TABLE IF NOT EXISTS documents (
                    remote_id TEXT PRIMARY KEY,
                    collection TEXT NOT NULL,
                    record_id TEXT,
                    payload TEXT NOT NULL,
                    written_at TEXT NOT NULL
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_documents_record ON documents (collection, record_id)",
            )
        } else {
            (
                r#"
                CREATE TABLE IF NOT EXISTS documents (
                    remote_id VARCHAR(36) PRIMARY KEY,
                    collection VARCHAR(128) NOT NULL,
                    record_id VARCHAR(255),
                    payload LONGTEXT NOT NULL,
                    written_at VARCHAR(40) NOT NULL,
                    INDEX idx_documents_record (collection, record_id)
                )
                "#,
                "",
            )
        };

        sqlx::query(create_table)
            .execute(&self.pool)
            .await
            .map_err(|e| RemoteError::Connect(format!("Failed to create documents table: {}", e)))?;
        if !create_index.is_empty() {
            sqlx::query(create_index)
                .execute(&self.pool)
                .await
                .map_err(|e| RemoteError::Connect(format!("Failed to create documents index: {}", e)))?;
        }
        Ok(())
    }

    async fn insert(
        &self,
        collection: &str,
        record_id: Option<&str>,
        payload: String,
    ) -> Result<String, RemoteError> {
        let remote_id = uuid::Uuid::new_v4().to_string();
        let written_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        sqlx::query(
            "INSERT INTO documents (remote_id, collection, record_id, payload, written_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&remote_id)
        .bind(collection)
        .bind(record_id)
        .bind(payload)
        .bind(written_at)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        Ok(remote_id)
    }

    /// Number of documents in `collection`.
    pub async fn count(&self, collection: &str) -> Result<u64, RemoteError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_one(&self.pool)
            .await
            .map_err(write_err)?;
        let count: i64 = row.try_get("cnt").map_err(write_err)?;
        Ok(count as u64)
    }

    /// Payloads written for one record id, oldest first.
    pub async fn documents_for(&self, collection: &str, record_id: &str) -> Result<Vec<Record>, RemoteError> {
        let rows = sqlx::query(
            "SELECT payload FROM documents WHERE collection = ? AND record_id = ? ORDER BY written_at",
        )
        .bind(collection)
        .bind(record_id)
        .fetch_all(&self.pool)
        .await
        .map_err(write_err)?;

        Ok(rows
            .iter()
            .filter_map(|row| text_column(row, "payload"))
            .filter_map(|payload| serde_json::from_str(&payload).ok())
            .collect())
    }
}

#[async_trait]
impl RemoteStore for SqlDocumentStore {
    async fn write(&self, collection: &str, record: &Record) -> Result<String, RemoteError> {
        let payload = serde_json::to_string(record).map_err(|e| RemoteError::Write(e.to_string()))?;
        let remote_id = self.insert(collection, Some(&record.id), payload).await?;
        debug!(id = %record.id, remote_id = %remote_id, collection, "Remote document written");
        Ok(remote_id)
    }

    async fn probe(&self, collection: &str) -> Result<String, RemoteError> {
        let payload = serde_json::json!({
            "test": true,
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "message": "Connection test",
        })
        .to_string();
        self.insert(collection, None, payload).await
    }
}
