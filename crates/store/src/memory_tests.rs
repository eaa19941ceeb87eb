// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::buckets;
use serde_json::json;

#[tokio::test]
async fn get_missing_is_not_found() {
    let store = MemoryStore::new();
    let err = store.get(buckets::SERVERS, "nope").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
async fn put_then_get_round_trips() {
    let store = MemoryStore::new();
    let etag = store
        .put(buckets::SERVERS, "s1", json!({"hostname": "cn0"}), PutOptions::default())
        .await
        .unwrap();

    let stored = store.get(buckets::SERVERS, "s1").await.unwrap();
    assert_eq!(stored.etag, etag);
    assert_eq!(stored.value["hostname"], "cn0");
}

#[tokio::test]
async fn every_write_changes_the_etag() {
    let store = MemoryStore::new();
    let e1 = store.put("b", "k", json!(1), PutOptions::default()).await.unwrap();
    let e2 = store.put("b", "k", json!(2), PutOptions::default()).await.unwrap();
    assert_ne!(e1, e2);
}

#[tokio::test]
async fn must_match_succeeds_on_current_etag() {
    let store = MemoryStore::new();
    let etag = store.put("b", "k", json!(1), PutOptions::default()).await.unwrap();
    store.put("b", "k", json!(2), PutOptions::must_match(etag)).await.unwrap();
}

#[tokio::test]
async fn must_match_conflicts_on_stale_etag() {
    let store = MemoryStore::new();
    let stale = store.put("b", "k", json!(1), PutOptions::default()).await.unwrap();
    store.put("b", "k", json!(2), PutOptions::default()).await.unwrap();

    let err = store.put("b", "k", json!(3), PutOptions::must_match(stale)).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn must_match_conflicts_on_absent_object() {
    let store = MemoryStore::new();
    let err = store.put("b", "k", json!(1), PutOptions::must_match("deadbeef")).await.unwrap_err();
    assert!(matches!(err, StoreError::EtagConflict { .. }));
}

#[tokio::test]
async fn must_not_exist_is_create_only() {
    let store = MemoryStore::new();
    store.put("b", "k", json!(1), PutOptions::must_not_exist()).await.unwrap();
    let err = store.put("b", "k", json!(2), PutOptions::must_not_exist()).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }));
}

#[tokio::test]
async fn delete_removes() {
    let store = MemoryStore::new();
    store.put("b", "k", json!(1), PutOptions::default()).await.unwrap();
    store.delete("b", "k").await.unwrap();
    assert!(store.get("b", "k").await.is_err());
    assert!(store.delete("b", "k").await.is_err());
}

#[tokio::test]
async fn find_filters_sorts_and_pages() {
    let store = MemoryStore::new();
    for (key, created) in [("t3", "2020-01-03"), ("t1", "2020-01-01"), ("t2", "2020-01-02")] {
        store
            .put(
                buckets::WAITLIST_TICKETS,
                key,
                json!({"scope": "vm", "created_at": created}),
                PutOptions::default(),
            )
            .await
            .unwrap();
    }
    store
        .put(buckets::WAITLIST_TICKETS, "other", json!({"scope": "zfs"}), PutOptions::default())
        .await
        .unwrap();

    let found = store
        .find(
            buckets::WAITLIST_TICKETS,
            &Filter::eq("scope", "vm"),
            FindOptions::sorted_by("created_at", SortOrder::Ascending),
        )
        .await
        .unwrap();
    let keys: Vec<&str> = found.iter().map(|f| f.key.as_str()).collect();
    assert_eq!(keys, ["t1", "t2", "t3"]);

    let page = store
        .find(
            buckets::WAITLIST_TICKETS,
            &Filter::eq("scope", "vm"),
            FindOptions {
                sort: Some(("created_at".to_string(), SortOrder::Ascending)),
                limit: Some(1),
                offset: 1,
            },
        )
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].key, "t2");
}

#[tokio::test]
async fn find_on_missing_bucket_is_empty() {
    let store = MemoryStore::new();
    let found = store.find("nope", &Filter::True, FindOptions::default()).await.unwrap();
    assert!(found.is_empty());
}
