// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Transactional tier: a schema-versioned SQL store keyed by record id.
//!
//! SQLite is the expected backend (a local file next to the app), but any
//! URL the sqlx `Any` driver accepts works. Each record is stored as its
//! JSON payload, with the `timestamp` and `synced` fields lifted into
//! indexed columns:
//!
//! ```sql
//! CREATE TABLE measurements (
//!   id TEXT PRIMARY KEY,
//!   payload TEXT NOT NULL,     -- flat camelCase JSON
//!   timestamp TEXT NOT NULL,   -- RFC 3339, sortable
//!   synced INTEGER NOT NULL    -- 0 / 1
//! );
//! CREATE INDEX idx_measurements_timestamp ON measurements (timestamp);
//! CREATE INDEX idx_measurements_synced ON measurements (synced);
//! ```
//!
//! Every write runs in its own transaction. The pool holds a single
//! connection, so transactions from one caller complete in issue order.
//!
//! ## sqlx Any Driver Quirks
//!
//! Booleans are written and read as integers, and TEXT columns are read as
//! `String` first and `Vec<u8>` second (MySQL LONGTEXT comes back as bytes).

use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::traits::{prepare_for_write, StorageBackend, StorageError, TierCapabilities, TierKind};
use crate::record::Record;

/// Current on-disk schema version (SQLite `user_version`).
pub const SCHEMA_VERSION: i64 = 1;

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

pub(crate) fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

/// Read a TEXT column as String (SQLite) or bytes (MySQL LONGTEXT).
pub(crate) fn text_column(row: &AnyRow, column: &str) -> Option<String> {
    row.try_get::<String, _>(column).ok().or_else(|| {
        row.try_get::<Vec<u8>, _>(column)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
    })
}

fn backend_err(e: sqlx::Error) -> StorageError {
    StorageError::Backend(e.to_string())
}

pub struct TransactionalStore {
    url: String,
    is_sqlite: bool,
    acquire_timeout: Duration,
    pool: OnceCell<AnyPool>,
}

impl TransactionalStore {
    /// Describe the store. No I/O happens until [`StorageBackend::init`].
    pub fn new(connection_string: impl Into<String>) -> Self {
        let url = connection_string.into();
        let is_sqlite = url.starts_with("sqlite:");
        Self {
            url,
            is_sqlite,
            acquire_timeout: Duration::from_secs(5),
            pool: OnceCell::new(),
        }
    }

    /// Override how long a caller may wait for the single pooled connection.
    #[must_use]
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    fn pool(&self) -> Result<&AnyPool, StorageError> {
        self.pool.get().ok_or_else(|| StorageError::Unavailable {
            tier: TierKind::Transactional,
            reason: "store not initialized".into(),
        })
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM measurements")
            .fetch_one(self.pool()?)
            .await
            .map_err(backend_err)?;
        let count: i64 = row.try_get("cnt").map_err(backend_err)?;
        Ok(count as u64)
    }

    async fn connect(&self) -> Result<AnyPool, StorageError> {
        install_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.acquire_timeout)
            .connect(&self.url)
            .await
            .map_err(|e| StorageError::Unavailable {
                tier: TierKind::Transactional,
                reason: e.to_string(),
            })?;

        if self.is_sqlite {
            Self::enable_wal_mode(&pool).await?;
        }
        self.init_schema(&pool).await?;
        Ok(pool)
    }

    /// Enable WAL journaling for SQLite files (in-memory databases ignore it).
    async fn enable_wal_mode(pool: &AnyPool) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {}", e)))?;

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to set synchronous mode: {}", e)))?;

        Ok(())
    }

    async fn schema_version(pool: &AnyPool) -> Result<i64, StorageError> {
        let row = sqlx::query("PRAGMA user_version")
            .fetch_one(pool)
            .await
            .map_err(backend_err)?;
        row.try_get::<i64, _>(0).map_err(backend_err)
    }

    async fn init_schema(&self, pool: &AnyPool) -> Result<(), StorageError> {
        if self.is_sqlite {
            let version = Self::schema_version(pool).await?;
            if version > SCHEMA_VERSION {
                return Err(StorageError::Unavailable {
                    tier: TierKind::Transactional,
                    reason: format!(
                        "schema version {} is newer than supported {}",
                        version, SCHEMA_VERSION
                    ),
                });
            }

            let mut tx = pool.begin().await.map_err(backend_err)?;
            let statements = [
                "CREATE TABLE IF NOT EXISTS measurements (
                    id TEXT PRIMARY KEY,
                    payload TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    synced INTEGER NOT NULL DEFAULT 0
                )",
                "CREATE INDEX IF NOT EXISTS idx_measurements_timestamp ON measurements (timestamp)",
                "CREATE INDEX IF NOT EXISTS idx_measurements_synced ON measurements (synced)",
            ];
            for sql in statements {
                sqlx::query(sql).execute(&mut *tx).await.map_err(backend_err)?;
            }
            if version < SCHEMA_VERSION {
                // PRAGMA does not take bind parameters
                sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
                    .execute(&mut *tx)
                    .await
                    .map_err(backend_err)?;
            }
            tx.commit().await.map_err(backend_err)?;
        } else {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS measurements (
                    id VARCHAR(255) PRIMARY KEY,
                    payload LONGTEXT NOT NULL,
                    timestamp VARCHAR(40) NOT NULL,
                    synced TINYINT NOT NULL DEFAULT 0,
                    INDEX idx_measurements_timestamp (timestamp),
                    INDEX idx_measurements_synced (synced)
                )",
            )
            .execute(pool)
            .await
            .map_err(backend_err)?;
        }

        debug!(url = %self.url, version = SCHEMA_VERSION, "Measurement schema ready");
        Ok(())
    }

    fn upsert_sql(&self) -> &'static str {
        if self.is_sqlite {
            "INSERT INTO measurements (id, payload, timestamp, synced) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                payload = excluded.payload,
                timestamp = excluded.timestamp,
                synced = excluded.synced"
        } else {
            "INSERT INTO measurements (id, payload, timestamp, synced) VALUES (?, ?, ?, ?)
             ON DUPLICATE KEY UPDATE
                payload = VALUES(payload),
                timestamp = VALUES(timestamp),
                synced = VALUES(synced)"
        }
    }

    fn decode_rows(rows: Vec<AnyRow>) -> Vec<Record> {
        rows.iter()
            .filter_map(|row| {
                let payload = text_column(row, "payload")?;
                match serde_json::from_str::<Record>(&payload) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(error = %e, "Skipping unreadable measurement row");
                        None
                    }
                }
            })
            .collect()
    }
}

#[async_trait]
impl StorageBackend for TransactionalStore {
    fn kind(&self) -> TierKind {
        TierKind::Transactional
    }

    fn capabilities(&self) -> TierCapabilities {
        TierCapabilities {
            durable: true,
            transactional: true,
            indexed: true,
            whole_collection_writes: false,
        }
    }

    async fn init(&self) -> Result<(), StorageError> {
        self.pool.get_or_try_init(|| self.connect()).await?;
        info!(url = %self.url, "Transactional store opened");
        Ok(())
    }

    async fn save(&self, record: &Record) -> Result<Record, StorageError> {
        let stored = prepare_for_write(record)?;
        let payload = serde_json::to_string(&stored)?;
        let timestamp = stored
            .timestamp
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Micros, true))
            .unwrap_or_default();

        let mut tx = self.pool()?.begin().await.map_err(backend_err)?;
        sqlx::query(self.upsert_sql())
            .bind(&stored.id)
            .bind(&payload)
            .bind(&timestamp)
            .bind(i64::from(stored.synced))
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;
        tx.commit().await.map_err(backend_err)?;

        Ok(stored)
    }

    async fn get_all(&self) -> Result<Vec<Record>, StorageError> {
        let rows = sqlx::query("SELECT payload FROM measurements ORDER BY timestamp, id")
            .fetch_all(self.pool()?)
            .await
            .map_err(backend_err)?;
        Ok(Self::decode_rows(rows))
    }

    async fn get_unsynced(&self) -> Result<Vec<Record>, StorageError> {
        let rows = sqlx::query(
            "SELECT payload FROM measurements WHERE synced = 0 ORDER BY timestamp, id",
        )
        .fetch_all(self.pool()?)
        .await
        .map_err(backend_err)?;
        Ok(Self::decode_rows(rows))
    }

    async fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let mut tx = self.pool()?.begin().await.map_err(backend_err)?;
        sqlx::query("DELETE FROM measurements WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;
        tx.commit().await.map_err(backend_err)?;
        Ok(true)
    }

    async fn clear(&self) -> Result<bool, StorageError> {
        let mut tx = self.pool()?.begin().await.map_err(backend_err)?;
        sqlx::query("DELETE FROM measurements")
            .execute(&mut *tx)
            .await
            .map_err(backend_err)?;
        tx.commit().await.map_err(backend_err)?;
        Ok(true)
    }

    async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            pool.close().await;
        }
    }
}
