//! Redis-backed [`StringStore`] for the key-value tier.
//!
//! Uses a blocking connection: the key-value tier is synchronous by
//! contract, and each call is a single GET/SET/DEL. [`KeyValueStore`]
//! runs these calls on the blocking pool.
//!
//! [`KeyValueStore`]: super::KeyValueStore

use std::time::Duration;

use parking_lot::Mutex;
use redis::{Client, Commands, Connection};

use super::kv::StringStore;
use super::traits::StorageError;

fn backend_err(e: redis::RedisError) -> StorageError {
    StorageError::Backend(e.to_string())
}

pub struct RedisStringStore {
    client: Client,
    connection: Mutex<Option<Connection>>,
    /// Optional key prefix for namespacing (e.g., "field:" → "field:measurements")
    prefix: String,
    connect_timeout: Duration,
}

impl RedisStringStore {
    /// Create a new store without a key prefix.
    pub fn new(connection_string: &str) -> Result<Self, StorageError> {
        Self::with_prefix(connection_string, None)
    }

    /// Create a new store with an optional key prefix.
    ///
    /// Nothing connects until [`StringStore::open`].
    pub fn with_prefix(connection_string: &str, prefix: Option<&str>) -> Result<Self, StorageError> {
        let client = Client::open(connection_string).map_err(backend_err)?;
        Ok(Self {
            client,
            connection: Mutex::new(None),
            prefix: prefix.unwrap_or("").to_string(),
            connect_timeout: Duration::from_secs(5),
        })
    }

    /// Apply the prefix to a key.
    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    /// Get the configured prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Run a command on the shared connection, connecting on first use.
    /// A failed command drops the connection so the next call reconnects.
    fn with_connection<T>(
        &self,
        op: impl FnOnce(&mut Connection) -> redis::RedisResult<T>,
    ) -> Result<T, StorageError> {
        let mut guard = self.connection.lock();
        if guard.is_none() {
            let conn = self
                .client
                .get_connection_with_timeout(self.connect_timeout)
                .map_err(backend_err)?;
            conn.set_read_timeout(Some(self.connect_timeout)).map_err(backend_err)?;
            conn.set_write_timeout(Some(self.connect_timeout)).map_err(backend_err)?;
            *guard = Some(conn);
        }

        let Some(conn) = guard.as_mut() else {
            return Err(StorageError::Backend("redis connection missing".into()));
        };
        match op(conn) {
            Ok(value) => Ok(value),
            Err(e) => {
                *guard = None;
                Err(backend_err(e))
            }
        }
    }
}

impl StringStore for RedisStringStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn open(&self) -> Result<(), StorageError> {
        self.with_connection(|conn| redis::cmd("PING").query::<String>(conn))
            .map(|_| ())
    }

    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        let key = self.prefixed_key(key);
        self.with_connection(|conn| conn.get::<_, Option<String>>(&key))
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let key = self.prefixed_key(key);
        self.with_connection(|conn| conn.set::<_, _, ()>(&key, value))
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let key = self.prefixed_key(key);
        self.with_connection(|conn| conn.del::<_, ()>(&key))
    }
}
