//! # Field Sync
//!
//! Offline-first persistence and sync core for field measurement records.
//!
//! Records are captured while disconnected, kept durably on the device, and
//! pushed to a remote document store once connectivity returns.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SyncReconciler                          │
//! │  • Triggers: startup, interval, reconnect, request, config │
//! │  • One pass at a time (busy flag)                          │
//! │  • At-least-once delivery to the RemoteStore               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    LocalDataManager                         │
//! │  • Validates, timestamps, upserts by id                    │
//! │  • Bounded timeouts + fixed-backoff retry per tier         │
//! │  • Last-known snapshot for failed reads                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                  (first tier that opens is active;
//!                   failing writes degrade downwards)
//!                              ▼
//! ┌──────────────────┐  ┌──────────────────┐  ┌──────────────────┐
//! │  Transactional   │→ │    Key-Value     │→ │     Volatile     │
//! │  SQLite / MySQL  │  │  file / Redis    │  │     DashMap      │
//! │  indexed, ACID   │  │  whole-collection│  │  lost on exit    │
//! └──────────────────┘  └──────────────────┘  └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use field_sync::{FieldSyncConfig, LocalDataManager, RecordInput, SyncReconciler};
//! use tokio::sync::watch;
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut config = FieldSyncConfig::default();
//!     config.remote.url = Some("sqlite://remote.db?mode=rwc".into());
//!
//!     let manager = Arc::new(LocalDataManager::open(config.clone()).await.expect("no storage"));
//!     let remote = field_sync::remote::connect(&config.remote).await.expect("remote");
//!
//!     let (_online_tx, online_rx) = watch::channel(true);
//!     let reconciler = SyncReconciler::new(manager.clone(), remote, &config, online_rx);
//!
//!     let input = RecordInput {
//!         location: "Tama river mouth".into(),
//!         temperature: Some("18.5".into()),
//!         ph: Some("".into()), // blank: not measured
//!         ..Default::default()
//!     };
//!     let outcome = reconciler
//!         .save_and_sync(input.into_record().expect("invalid input"))
//!         .await
//!         .expect("save failed");
//!     println!("synced immediately: {}", outcome.is_synced());
//!
//!     println!("{:?}", reconciler.sync_all().await);
//!     manager.shutdown().await;
//! }
//! ```
//!
//! ## Features
//!
//! - **Tiered Storage**: transactional → key-value → volatile, chosen at init
//! - **Degraded Writes**: a failing save lands on the next tier instead of failing
//! - **Bounded Operations**: every tier call has a timeout; retries are fixed-count
//! - **At-least-once Sync**: records are marked synced only after remote confirmation
//! - **Sync Triggers**: startup delay, periodic interval, reconnect, explicit request
//!
//! ## Modules
//!
//! - [`manager`]: The [`LocalDataManager`] owning all tier handles
//! - [`storage`]: Tier backends and the [`StorageBackend`] contract
//! - [`sync`]: The [`SyncReconciler`] and its trigger loop
//! - [`remote`]: The [`RemoteStore`] contract and SQL document store
//! - [`resilience`]: Retry logic
//! - [`record`]: The measurement [`Record`]

pub mod config;
pub mod record;
pub mod storage;
pub mod resilience;
pub mod manager;
pub mod remote;
pub mod sync;
pub mod metrics;

// Note: We don't expose a `tracing` module to avoid conflict with the tracing crate

pub use config::{FieldSyncConfig, SyncConfig, RemoteConfig};
pub use record::{Record, RecordInput};
pub use manager::{LocalDataManager, ManagerState, StorageInfo};
pub use storage::{StorageBackend, StorageError, TierKind, TierCapabilities};
pub use sync::{SyncReconciler, SyncOutcome, SyncReport, SkipReason, SaveOutcome};
pub use remote::{RemoteStore, RemoteError, SqlDocumentStore};
pub use resilience::retry::RetryConfig;
pub use metrics::LatencyTimer;
