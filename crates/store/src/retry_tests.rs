// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::filter::Filter;
use crate::memory::MemoryStore;
use crate::store::{Etag, FindOptions, FoundObject, ObjectStore, PutOptions, Stored};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn creates_when_absent() {
    let store = MemoryStore::new();
    let etag = with_etag_retry(&store, "b", "k", 3, |current| {
        assert!(current.is_none());
        Ok(Modify::Write(json!({"n": 1})))
    })
    .await
    .unwrap();
    assert!(etag.is_some());
    assert_eq!(store.get("b", "k").await.unwrap().value["n"], 1);
}

#[tokio::test]
async fn modifies_current_value() {
    let store = MemoryStore::new();
    store.put("b", "k", json!({"n": 1}), PutOptions::default()).await.unwrap();

    with_etag_retry(&store, "b", "k", 3, |current| {
        let n = current.and_then(|v| v["n"].as_u64()).unwrap_or(0);
        Ok(Modify::Write(json!({"n": n + 1})))
    })
    .await
    .unwrap();

    assert_eq!(store.get("b", "k").await.unwrap().value["n"], 2);
}

#[tokio::test]
async fn skip_leaves_object_untouched() {
    let store = MemoryStore::new();
    let etag = store.put("b", "k", json!({"n": 1}), PutOptions::default()).await.unwrap();

    let written = with_etag_retry(&store, "b", "k", 3, |_| Ok(Modify::Skip)).await.unwrap();
    assert!(written.is_none());
    assert_eq!(store.get("b", "k").await.unwrap().etag, etag);
}

/// Store wrapper whose first `conflicts` puts fail with a stale etag.
#[derive(Clone)]
struct FlakyStore {
    inner: MemoryStore,
    conflicts: Arc<Mutex<u32>>,
}

impl FlakyStore {
    fn new(inner: MemoryStore, conflicts: u32) -> Self {
        Self { inner, conflicts: Arc::new(Mutex::new(conflicts)) }
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Stored, StoreError> {
        self.inner.get(bucket, key).await
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        value: serde_json::Value,
        opts: PutOptions,
    ) -> Result<Etag, StoreError> {
        {
            let mut left = self.conflicts.lock();
            if *left > 0 {
                *left -= 1;
                return Err(StoreError::EtagConflict {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    expected: "stale".to_string(),
                    found: "fresh".to_string(),
                });
            }
        }
        self.inner.put(bucket, key, value, opts).await
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        self.inner.delete(bucket, key).await
    }

    async fn find(
        &self,
        bucket: &str,
        filter: &Filter,
        opts: FindOptions,
    ) -> Result<Vec<FoundObject>, StoreError> {
        self.inner.find(bucket, filter, opts).await
    }
}

#[tokio::test]
async fn retries_through_transient_conflicts() {
    let inner = MemoryStore::new();
    inner.put("b", "k", json!({"n": 0}), PutOptions::default()).await.unwrap();
    let store = FlakyStore::new(inner.clone(), 2);

    let mut calls = 0;
    let etag = with_etag_retry(&store, "b", "k", 5, |current| {
        calls += 1;
        let n = current.and_then(|v| v["n"].as_u64()).unwrap_or(0);
        Ok(Modify::Write(json!({"n": n + 1})))
    })
    .await
    .unwrap();

    assert!(etag.is_some());
    assert_eq!(calls, 3, "two conflicted attempts plus the one that landed");
    assert_eq!(inner.get("b", "k").await.unwrap().value["n"], 1);
}

#[tokio::test]
async fn surfaces_conflict_after_exhausting_attempts() {
    let inner = MemoryStore::new();
    inner.put("b", "k", json!({"n": 0}), PutOptions::default()).await.unwrap();
    let store = FlakyStore::new(inner, 100);

    let result =
        with_etag_retry(&store, "b", "k", 2, |_| Ok(Modify::Write(json!({"n": 1})))).await;
    assert!(matches!(result, Err(e) if e.is_conflict()));
}
