// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Field session walkthrough.
//!
//! Demonstrates:
//! 1. Opening local storage (SQLite → file → memory fallback)
//! 2. Capturing measurements while offline
//! 3. Coming back online and syncing to a remote document store
//! 4. A connection test against the remote store
//! 5. Displaying metrics
//! 6. Clean shutdown
//!
//! Everything lives in a temporary directory; no services are needed.
//!
//! # Run
//!
//! ```bash
//! cargo run --example field_session
//! ```

use std::sync::Arc;

use field_sync::{FieldSyncConfig, LocalDataManager, ManagerState, RecordInput, SyncReconciler};
use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║              field-sync: Field Session Example                ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Open local storage
    // ─────────────────────────────────────────────────────────────────────────
    let dir = tempfile::tempdir()?;
    let config = FieldSyncConfig {
        sql_url: Some(format!("sqlite://{}?mode=rwc", dir.path().join("field.db").display())),
        kv_dir: Some(dir.path().join("kv").display().to_string()),
        ..Default::default()
    };

    println!("📦 Opening local storage...");
    let manager = Arc::new(LocalDataManager::open(config.clone()).await?);
    println!("   ✅ Storage: {}", manager.storage_info());

    // No remote yet: the app shows sample data instead
    let (online_tx, online_rx) = watch::channel(false);
    let reconciler = SyncReconciler::new(manager.clone(), None, &config, online_rx);
    match reconciler.probe().await {
        Ok(_) => println!("   └─ Remote reachable"),
        Err(e) => {
            println!("   └─ Connection test: {}", e);
            let loaded = manager.load_demo_data().await?;
            println!("   └─ Loaded {} demo records", loaded);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Capture while offline
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📝 Capturing measurements offline...");
    let inputs = vec![
        RecordInput {
            location: "Sumida weir".into(),
            coordinates: "35.7390, 139.8170".into(),
            temperature: Some("16.4".into()),
            ph: Some("7.1".into()),
            conductivity: Some("301".into()),
            weather: "cloudy".into(),
            ..Default::default()
        },
        RecordInput {
            location: "Tama estuary (winter)".into(),
            temperature: Some("0".into()),
            ph: Some("".into()),
            notes: "pH probe not calibrated".into(),
            ..Default::default()
        },
    ];

    for input in inputs {
        let outcome = reconciler.save_and_sync(input.into_record()?).await?;
        let r = &outcome.record;
        println!(
            "   └─ {} temp={:?} pH={:?} synced={}",
            r.location, r.temperature, r.ph, outcome.is_synced()
        );
    }
    println!("   ⏳ Pending: {}", manager.pending_count().await);

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Back online: configure the remote and sync
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🌐 Back online, connecting remote store...");
    let mut remote_config = config.remote.clone();
    remote_config.url = Some(format!("sqlite://{}?mode=rwc", dir.path().join("remote.db").display()));
    reconciler.set_remote(field_sync::remote::connect(&remote_config).await?);
    online_tx.send(true)?;

    let outcome = reconciler.sync_all().await;
    match outcome.report() {
        Some(report) => println!(
            "   ✅ Synced {}/{} ({} failed, {} to resend) in {:?}",
            report.synced, report.attempted, report.failed, report.redeliver, report.elapsed
        ),
        None => println!("   ⚠️  {:?}", outcome),
    }
    println!("   ⏳ Pending: {}", manager.pending_count().await);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Connection test
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🔌 Connection test...");
    match reconciler.probe().await {
        Ok(id) => println!("   └─ ✅ Probe document {}", id),
        Err(e) => println!("   └─ ❌ {}", e),
    }

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Raw Metrics:");
    dump_metrics(&snapshotter);

    // ─────────────────────────────────────────────────────────────────────────
    // 6. Clean shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n🛑 Shutting down...");
    manager.shutdown().await;
    assert_eq!(manager.state(), ManagerState::Closed);
    println!("   ✅ Shutdown complete! State: {}", manager.state());

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║                    Example complete!                          ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<_> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
            let label_str = if labels.is_empty() { String::new() } else { format!("{{{}}}", labels.join(",")) };
            let rendered = match value {
                DebugValue::Counter(v) => v.to_string(),
                DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
                DebugValue::Histogram(samples) => format!("{} samples", samples.len()),
            };
            format!("{}{} = {}", key.name(), label_str, rendered)
        })
        .collect();
    lines.sort();

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {}", line);
    }
}
