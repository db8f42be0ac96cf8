// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync triggers: the long-running loop around [`SyncReconciler::sync_all`].

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::SyncReconciler;
use crate::config::FieldSyncConfig;
use crate::remote;

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Wait for the next published config. Never resolves once the sender is gone.
async fn next_config(updates: &mut Option<watch::Receiver<FieldSyncConfig>>) -> Option<FieldSyncConfig> {
    match updates {
        Some(rx) => match rx.changed().await {
            Ok(()) => Some(rx.borrow_and_update().clone()),
            Err(_) => None,
        },
        None => std::future::pending().await,
    }
}

impl SyncReconciler {
    /// Run sync triggers until `shutdown` turns true (or its sender drops).
    ///
    /// - once, `startup_delay` after start, if records are pending
    /// - every `interval`, if online, configured and pending
    /// - `reconnect_delay` after connectivity comes back, if still online
    /// - on [`request_sync`](Self::request_sync)
    /// - after a config update reconnects the remote store
    ///
    /// Automatic triggers respect `SyncConfig::auto`; explicit requests
    /// always run.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut updates = self.config_updates.lock().take();
        let mut online = self.online.clone();
        let mut online_open = true;

        let (startup_delay, period) = {
            let config = self.sync_config.read();
            (config.startup_delay(), config.interval())
        };
        let startup = sleep(startup_delay);
        tokio::pin!(startup);
        let mut started = false;
        let reconnect = sleep(Duration::ZERO);
        tokio::pin!(reconnect);
        let mut reconnect_armed = false;
        let mut ticker = ticker(period);

        info!(interval_secs = period.as_secs(), "Sync scheduler started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }

                _ = &mut startup, if !started => {
                    started = true;
                    self.auto_sync("startup").await;
                }

                _ = ticker.tick() => {
                    self.auto_sync("interval").await;
                }

                changed = online.changed(), if online_open => {
                    if changed.is_err() {
                        debug!("Connectivity sender dropped");
                        online_open = false;
                        continue;
                    }
                    let is_online = *online.borrow_and_update();
                    info!(online = is_online, "Connectivity changed");
                    reconnect_armed = is_online && self.auto_enabled();
                    if reconnect_armed {
                        let settle = self.sync_config.read().reconnect_delay();
                        reconnect.as_mut().reset(Instant::now() + settle);
                    }
                }

                _ = &mut reconnect, if reconnect_armed => {
                    reconnect_armed = false;
                    if self.is_online() {
                        self.sync_all().await;
                    }
                }

                _ = self.wake.notified() => {
                    debug!("Sync requested");
                    self.sync_all().await;
                }

                config = next_config(&mut updates) => {
                    let Some(config) = config else {
                        updates = None;
                        continue;
                    };
                    let old_period = self.sync_config.read().interval();
                    self.apply_config(&config).await;
                    if config.sync.interval() != old_period {
                        ticker = self::ticker(config.sync.interval());
                    }
                    if self.auto_enabled() {
                        self.sync_all().await;
                    }
                }
            }
        }

        info!("Sync scheduler stopped");
    }

    fn auto_enabled(&self) -> bool {
        self.sync_config.read().auto
    }

    /// Automatic trigger: sync only when there is something to send.
    async fn auto_sync(&self, trigger: &'static str) {
        if !self.auto_enabled() || !self.is_online() || !self.is_configured() {
            return;
        }
        let pending = self.manager.pending_count().await;
        if pending == 0 {
            return;
        }
        debug!(trigger, pending, "Automatic sync");
        self.sync_all().await;
    }

    /// Swap in new sync settings and reconnect the remote store.
    async fn apply_config(&self, config: &FieldSyncConfig) {
        *self.sync_config.write() = config.sync.clone();
        *self.remote_config.write() = config.remote.clone();

        match remote::connect(&config.remote).await {
            Ok(store) => {
                info!(configured = store.is_some(), "Remote store reconfigured");
                self.set_remote(store);
            }
            Err(e) => {
                warn!(error = %e, "Remote reconnect failed, sync disabled until next update");
                self.set_remote(None);
            }
        }
    }
}
