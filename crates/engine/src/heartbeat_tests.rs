// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::registry::{RegistryConfig, ServerRegistry};
use corral_core::test_support::sample_sysinfo;
use corral_core::FakeClock;
use corral_store::MemoryStore;
use serde_json::json;

const CN1: &str = "372bdb58-7b64-4c3c-9046-5a1a0a1b0d5e";

async fn setup() -> (Heartbeater<FakeClock>, ServerRegistry<FakeClock>, FakeClock) {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let clock = FakeClock::new();
    clock.set_epoch_ms(1_517_295_100_000);
    let registry =
        ServerRegistry::new(Arc::clone(&store), clock.clone(), RegistryConfig::default());
    registry.upsert_from_sysinfo(sample_sysinfo(CN1)).await.unwrap();
    (Heartbeater::new(store, clock.clone()), registry, clock)
}

fn heartbeat_payload() -> serde_json::Value {
    json!({
        "vms": {
            "vm-1": {
                "uuid": "vm-1",
                "owner_uuid": "owner-1",
                "max_physical_memory": 512,
                "quota": 10,
                "state": "running"
            }
        }
    })
}

#[tokio::test]
async fn ingest_marks_alive() {
    let (hb, _, clock) = setup().await;
    let uuid = ServerId::from_string(CN1);

    assert!(!hb.is_alive(&uuid));
    hb.ingest(uuid, &heartbeat_payload()).unwrap();
    assert!(hb.is_alive(&uuid));

    clock.advance(Duration::from_secs(HEARTBEAT_LIFETIME_SECONDS + 1));
    assert!(!hb.is_alive(&uuid));
}

#[tokio::test]
async fn reconcile_persists_heartbeat_and_vms() {
    let (hb, registry, _) = setup().await;
    let uuid = ServerId::from_string(CN1);

    hb.ingest(uuid, &heartbeat_payload()).unwrap();
    assert_eq!(hb.reconcile().await, 1);

    let server = registry.get(&uuid).await.unwrap();
    assert!(server.last_heartbeat.is_some());
    assert_eq!(server.status, ServerStatus::Running);
    assert_eq!(server.vms.len(), 1);
    assert_eq!(server.vms["vm-1"].owner_uuid, "owner-1");

    // Nothing dirty on a second pass.
    assert_eq!(hb.reconcile().await, 0);
}

#[tokio::test]
async fn later_heartbeats_supersede_earlier_unpersisted_ones() {
    let (hb, registry, clock) = setup().await;
    let uuid = ServerId::from_string(CN1);

    hb.ingest(uuid, &json!({"vms": {}})).unwrap();
    let first_ms = hb.last_heartbeat_ms(&uuid).unwrap();

    clock.advance(Duration::from_secs(2));
    hb.ingest(uuid, &heartbeat_payload()).unwrap();
    let second_ms = hb.last_heartbeat_ms(&uuid).unwrap();
    assert_eq!(second_ms - first_ms, 2_000);

    // Only the newest lands in the store.
    hb.reconcile().await;
    let server = registry.get(&uuid).await.unwrap();
    assert_eq!(
        server.last_heartbeat.map(|t| t.timestamp_millis() as u64),
        Some(second_ms)
    );
    assert_eq!(server.vms.len(), 1);
}

#[tokio::test]
async fn heartbeat_for_unknown_server_stays_dirty() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let clock = FakeClock::new();
    let hb = Heartbeater::new(Arc::clone(&store), clock.clone());
    let uuid = ServerId::from_string("00000000-0000-0000-0000-00000000aaaa");

    hb.ingest(uuid, &json!({"vms": {}})).unwrap();
    assert_eq!(hb.reconcile().await, 0);

    // Record appears; next pass persists.
    let registry = ServerRegistry::new(store, clock.clone(), RegistryConfig::default());
    registry
        .upsert_from_sysinfo(sample_sysinfo("00000000-0000-0000-0000-00000000aaaa"))
        .await
        .unwrap();
    assert_eq!(hb.reconcile().await, 1);
}

#[tokio::test]
async fn overlay_prefers_fresher_memory_state() {
    let (hb, registry, clock) = setup().await;
    let uuid = ServerId::from_string(CN1);

    hb.ingest(uuid, &heartbeat_payload()).unwrap();

    // Store still has no heartbeat; overlay fills it in.
    let mut server = registry.get(&uuid).await.unwrap();
    assert_eq!(server.status, ServerStatus::Unknown);
    hb.overlay(&mut server);
    assert_eq!(server.status, ServerStatus::Running);
    assert_eq!(server.vms.len(), 1);

    clock.advance(Duration::from_secs(30));
    assert_eq!(hb.status_of(&server), ServerStatus::Unknown);
}

#[tokio::test]
async fn malformed_payload_is_rejected() {
    let (hb, _, _) = setup().await;
    let err = hb.ingest(ServerId::from_string(CN1), &json!({"vms": [1, 2]})).unwrap_err();
    assert!(matches!(err, HeartbeatError::BadPayload(_)));
}
