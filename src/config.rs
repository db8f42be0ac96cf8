//! Configuration for the persistence and sync core.
//!
//! # Example
//!
//! ```
//! use field_sync::FieldSyncConfig;
//!
//! // Defaults: local SQLite file, file-backed key-value fallback, no remote
//! let config = FieldSyncConfig::default();
//! assert_eq!(config.primary_init_timeout_ms, 10_000);
//! assert_eq!(config.op_timeout_ms, 5_000);
//! assert!(!config.remote.is_configured());
//!
//! // Field laptop with a remote document store
//! let config = FieldSyncConfig {
//!     sql_url: Some("sqlite://survey.db?mode=rwc".into()),
//!     kv_dir: Some("./survey-kv".into()),
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::resilience::retry::RetryConfig;

/// Configuration for [`crate::LocalDataManager`] and [`crate::SyncReconciler`].
///
/// All fields have defaults, so a partial JSON/TOML document deserializes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FieldSyncConfig {
    /// Transactional tier URL (e.g., "sqlite://field_sync.db?mode=rwc").
    /// `None` skips the tier.
    #[serde(default = "default_sql_url")]
    pub sql_url: Option<String>,

    /// Directory for the file-backed key-value tier. `None` skips it
    /// unless `redis_url` is set.
    #[serde(default = "default_kv_dir")]
    pub kv_dir: Option<String>,

    /// Redis URL for the key-value tier (takes precedence over `kv_dir`)
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Key prefix for the Redis key-value tier
    #[serde(default)]
    pub redis_prefix: Option<String>,

    /// Key holding the serialized collection in the key-value tier
    #[serde(default = "default_kv_key")]
    pub kv_key: String,

    /// Budget for opening the transactional tier
    #[serde(default = "default_primary_init_timeout_ms")]
    pub primary_init_timeout_ms: u64,

    /// Budget for each tier read/write (and non-primary init)
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,

    /// Attempts per tier before a save degrades to the next tier
    #[serde(default = "default_write_attempts")]
    pub write_attempts: usize,

    /// Fixed delay between save attempts on one tier
    #[serde(default = "default_write_retry_delay_ms")]
    pub write_retry_delay_ms: u64,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Sync trigger settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SyncConfig {
    /// Periodic sync interval (default: 5 minutes)
    #[serde(default = "default_sync_interval_secs")]
    pub interval_secs: u64,

    /// Delay before the first sync after startup (default: 2s)
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,

    /// Settle time between connectivity returning and the sync it triggers (default: 1s)
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Disable all automatic triggers (explicit requests still run)
    #[serde(default = "default_true")]
    pub auto: bool,
}

/// Remote document store settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteConfig {
    /// Document store URL (sqlx `Any` URL)
    #[serde(default)]
    pub url: Option<String>,

    /// Collection measurements are written to
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Collection used by the connection probe
    #[serde(default = "default_probe_collection")]
    pub probe_collection: String,

    /// Budget for one remote write
    #[serde(default = "default_remote_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

fn default_sql_url() -> Option<String> { Some("sqlite://field_sync.db?mode=rwc".into()) }
fn default_kv_dir() -> Option<String> { Some("./field_sync_kv".into()) }
fn default_kv_key() -> String { "measurements".into() }
fn default_primary_init_timeout_ms() -> u64 { 10_000 }
fn default_op_timeout_ms() -> u64 { 5_000 }
fn default_write_attempts() -> usize { 3 }
fn default_write_retry_delay_ms() -> u64 { 100 }
fn default_sync_interval_secs() -> u64 { 5 * 60 }
fn default_startup_delay_ms() -> u64 { 2_000 }
fn default_reconnect_delay_ms() -> u64 { 1_000 }
fn default_true() -> bool { true }
fn default_collection() -> String { "waterQualityData".into() }
fn default_probe_collection() -> String { "connectionTest".into() }
fn default_remote_write_timeout_ms() -> u64 { 10_000 }

impl Default for FieldSyncConfig {
    fn default() -> Self {
        Self {
            sql_url: default_sql_url(),
            kv_dir: default_kv_dir(),
            redis_url: None,
            redis_prefix: None,
            kv_key: default_kv_key(),
            primary_init_timeout_ms: default_primary_init_timeout_ms(),
            op_timeout_ms: default_op_timeout_ms(),
            write_attempts: default_write_attempts(),
            write_retry_delay_ms: default_write_retry_delay_ms(),
            sync: SyncConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_sync_interval_secs(),
            startup_delay_ms: default_startup_delay_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            auto: default_true(),
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            collection: default_collection(),
            probe_collection: default_probe_collection(),
            write_timeout_ms: default_remote_write_timeout_ms(),
        }
    }
}

impl FieldSyncConfig {
    /// Memory-only configuration: no transactional or key-value tier.
    #[must_use]
    pub fn volatile() -> Self {
        Self {
            sql_url: None,
            kv_dir: None,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn primary_init_timeout(&self) -> Duration {
        Duration::from_millis(self.primary_init_timeout_ms)
    }

    #[must_use]
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }

    /// Retry policy applied to each tier on the save path.
    #[must_use]
    pub fn write_retry(&self) -> RetryConfig {
        RetryConfig::fixed(self.write_attempts, Duration::from_millis(self.write_retry_delay_ms))
    }
}

impl SyncConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    #[must_use]
    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl RemoteConfig {
    /// Whether the remote settings are filled in.
    ///
    /// A missing or blank URL, or one still holding a `YOUR_` placeholder
    /// from a config template, counts as not configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        match self.url.as_deref().map(str::trim) {
            Some(url) => !url.is_empty() && !url.contains("YOUR_"),
            None => false,
        }
    }

    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
