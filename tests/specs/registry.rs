// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A CN boots, posts sysinfo, and starts heartbeating.

use corral_core::test_support::sample_sysinfo;
use corral_core::{FakeClock, ServerId, ServerStatus};
use corral_engine::{Heartbeater, RegistryConfig, ServerRegistry};
use corral_store::{MemoryStore, ObjectStore};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const CN: &str = "372bdb58-7b64-4c3c-9046-5a1a0a1b0d5e";

#[tokio::test]
async fn sysinfo_then_heartbeat_brings_a_server_online() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let clock = FakeClock::new();
    clock.set_epoch_ms(1_517_295_100_000);
    let registry =
        ServerRegistry::new(Arc::clone(&store), clock.clone(), RegistryConfig::default());
    let heartbeat = Heartbeater::new(Arc::clone(&store), clock.clone());

    // Boot-time sysinfo announcement creates the record.
    let server = registry.upsert_from_sysinfo(sample_sysinfo(CN)).await.unwrap();
    assert_eq!(server.uuid, CN);
    assert_eq!(server.status, ServerStatus::Unknown);

    // Boot Time 1517295064 renders as millisecond-precision ISO-8601.
    let doc = serde_json::to_value(&server).unwrap();
    assert_eq!(doc["last_boot"], json!("2018-01-30T07:11:04.000Z"));

    // First heartbeat flips it to running within the liveness window.
    heartbeat.ingest(ServerId::from_string(CN), &json!({"vms": {}})).unwrap();
    heartbeat.reconcile().await;
    let server = registry.get(&ServerId::from_string(CN)).await.unwrap();
    assert_eq!(server.status, ServerStatus::Running);

    // Silence past the 11-second window drops it back to unknown.
    clock.advance(Duration::from_secs(12));
    let server = registry.get(&ServerId::from_string(CN)).await.unwrap();
    assert_eq!(server.status, ServerStatus::Unknown);

    // A repeated identical sysinfo post writes nothing.
    let etag_before = server.etag.clone();
    let after = registry.upsert_from_sysinfo(sample_sysinfo(CN)).await.unwrap();
    assert_eq!(after.etag, etag_before);
}
