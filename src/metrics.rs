// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for field-sync.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter.
//!
//! # Metric Naming Convention
//! - `field_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `tier`: transactional, key-value, volatile
//! - `operation`: init, save, get_all, delete, clear
//! - `status`: success, error, timeout

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

/// Record a storage operation outcome
pub fn record_operation(tier: &str, operation: &str, status: &str) {
    counter!(
        "field_sync_operations_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(tier: &str, operation: &str, duration: Duration) {
    histogram!(
        "field_sync_operation_seconds",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a tier init attempt at startup
pub fn record_tier_init(tier: &str, success: bool) {
    counter!(
        "field_sync_tier_init_total",
        "tier" => tier.to_string(),
        "status" => if success { "success" } else { "error" }
    )
    .increment(1);
}

/// Record an operation degrading from one tier to the next
pub fn record_failover(from: &str, to: &str, operation: &str) {
    counter!(
        "field_sync_failovers_total",
        "from" => from.to_string(),
        "to" => to.to_string(),
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record a read served from the last-known snapshot
pub fn record_snapshot_read() {
    counter!("field_sync_snapshot_reads_total").increment(1);
}

/// Set the active tier (0 = transactional, 1 = key-value, 2 = volatile)
pub fn set_active_tier(level: u8) {
    gauge!("field_sync_active_tier").set(level as f64);
}

/// Set the number of records waiting for a remote write
pub fn set_pending_records(count: usize) {
    gauge!("field_sync_pending_records").set(count as f64);
}

/// Set the number of records whose latest write landed below the active tier
pub fn set_spilled_records(count: usize) {
    gauge!("field_sync_spilled_records").set(count as f64);
}

/// Record a remote write outcome
pub fn record_remote_write(status: &str) {
    counter!(
        "field_sync_remote_writes_total",
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a completed or skipped sync pass
pub fn record_sync_pass(outcome: &str, synced: usize, failed: usize, duration: Duration) {
    counter!(
        "field_sync_sync_passes_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
    counter!("field_sync_records_synced_total").increment(synced as u64);
    counter!("field_sync_records_failed_total").increment(failed as u64);
    histogram!("field_sync_sync_pass_seconds").record(duration.as_secs_f64());
}

/// Record a remote write whose local synced flag could not be persisted
pub fn record_partial_durability() {
    counter!("field_sync_partial_durability_total").increment(1);
}

/// Timer guard that records latency on drop
pub struct LatencyTimer {
    tier: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(tier: &'static str, operation: &'static str) -> Self {
        Self {
            tier,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.tier, self.operation, self.start.elapsed());
    }
}
