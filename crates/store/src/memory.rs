// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store implementation.

use crate::filter::{Filter, SortOrder};
use crate::store::{
    Etag, EtagConstraint, FindOptions, FoundObject, ObjectStore, PutOptions, Stored, StoreError,
};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct VersionedObject {
    pub value: Value,
    pub etag: Etag,
}

pub(crate) type Buckets = HashMap<String, BTreeMap<String, VersionedObject>>;

/// The bundled store: buckets of BTreeMaps behind one RwLock.
///
/// Good for the single-writer control-plane deployment the system
/// assumes; snapshots give durability across restarts (see
/// [`crate::Snapshot`]).
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Buckets>>,
}

fn fresh_etag() -> Etag {
    format!("{:032x}", rand::random::<u128>())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_buckets(buckets: Buckets) -> Self {
        Self { inner: Arc::new(RwLock::new(buckets)) }
    }

    pub(crate) fn clone_buckets(&self) -> Buckets {
        self.inner.read().clone()
    }

    /// Number of objects in a bucket (diagnostics).
    pub fn len(&self, bucket: &str) -> usize {
        self.inner.read().get(bucket).map(BTreeMap::len).unwrap_or(0)
    }

    pub fn is_empty(&self, bucket: &str) -> bool {
        self.len(bucket) == 0
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Stored, StoreError> {
        let guard = self.inner.read();
        guard
            .get(bucket)
            .and_then(|b| b.get(key))
            .map(|obj| Stored { value: obj.value.clone(), etag: obj.etag.clone() })
            .ok_or_else(|| StoreError::NotFound { bucket: bucket.to_string(), key: key.to_string() })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        value: Value,
        opts: PutOptions,
    ) -> Result<Etag, StoreError> {
        let mut guard = self.inner.write();
        let bucket_map = guard.entry(bucket.to_string()).or_default();

        match (&opts.etag, bucket_map.get(key)) {
            (EtagConstraint::MustMatch(expected), Some(current)) => {
                if &current.etag != expected {
                    return Err(StoreError::EtagConflict {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                        expected: expected.clone(),
                        found: current.etag.clone(),
                    });
                }
            }
            (EtagConstraint::MustMatch(expected), None) => {
                return Err(StoreError::EtagConflict {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    expected: expected.clone(),
                    found: "<absent>".to_string(),
                });
            }
            (EtagConstraint::MustNotExist, Some(_)) => {
                return Err(StoreError::AlreadyExists {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            _ => {}
        }

        let etag = fresh_etag();
        bucket_map.insert(key.to_string(), VersionedObject { value, etag: etag.clone() });
        Ok(etag)
    }

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write();
        let removed = guard.get_mut(bucket).and_then(|b| b.remove(key));
        match removed {
            Some(_) => Ok(()),
            None => {
                Err(StoreError::NotFound { bucket: bucket.to_string(), key: key.to_string() })
            }
        }
    }

    async fn find(
        &self,
        bucket: &str,
        filter: &Filter,
        opts: FindOptions,
    ) -> Result<Vec<FoundObject>, StoreError> {
        let guard = self.inner.read();
        let mut found: Vec<FoundObject> = guard
            .get(bucket)
            .map(|b| {
                b.iter()
                    .filter(|(_, obj)| filter.matches(&obj.value))
                    .map(|(key, obj)| FoundObject {
                        key: key.clone(),
                        value: obj.value.clone(),
                        etag: obj.etag.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        drop(guard);

        if let Some((attr, order)) = &opts.sort {
            found.sort_by(|a, b| {
                let ord = cmp_values(a.value.get(attr), b.value.get(attr));
                match order {
                    SortOrder::Ascending => ord,
                    SortOrder::Descending => ord.reverse(),
                }
            });
        }

        let iter = found.into_iter().skip(opts.offset);
        Ok(match opts.limit {
            Some(n) => iter.take(n).collect(),
            None => iter.collect(),
        })
    }
}

/// Missing/null attributes sort first; numbers numerically, the rest
/// by string form.
fn cmp_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(m), Some(n)) => m.partial_cmp(&n).unwrap_or(Ordering::Equal),
            _ => {
                let xs = x.as_str().map(str::to_string).unwrap_or_else(|| x.to_string());
                let ys = y.as_str().map(str::to_string).unwrap_or_else(|| y.to_string());
                xs.cmp(&ys)
            }
        },
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
