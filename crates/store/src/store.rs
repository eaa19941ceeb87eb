// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The object-store contract.

use crate::filter::{Filter, SortOrder};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Opaque version token attached to every stored object.
pub type Etag = String;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no such object: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("etag mismatch on {bucket}/{key}: expected {expected}, found {found}")]
    EtagConflict { bucket: String, key: String, expected: String, found: String },

    #[error("object already exists: {bucket}/{key}")]
    AlreadyExists { bucket: String, key: String },

    #[error("store is not connected")]
    NotConnected,

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::EtagConflict { .. } | StoreError::AlreadyExists { .. })
    }
}

/// A stored object with its version token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stored {
    pub value: Value,
    pub etag: Etag,
}

/// A find result: key plus the stored object.
#[derive(Debug, Clone, PartialEq)]
pub struct FoundObject {
    pub key: String,
    pub value: Value,
    pub etag: Etag,
}

/// Write precondition for `put`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EtagConstraint {
    /// Unconditional write.
    #[default]
    None,
    /// Object must exist with exactly this etag.
    MustMatch(Etag),
    /// Object must not exist (create-only).
    MustNotExist,
}

#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub etag: EtagConstraint,
}

impl PutOptions {
    pub fn must_match(etag: impl Into<Etag>) -> Self {
        Self { etag: EtagConstraint::MustMatch(etag.into()) }
    }

    pub fn must_not_exist() -> Self {
        Self { etag: EtagConstraint::MustNotExist }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Attribute to order results by, with direction.
    pub sort: Option<(String, SortOrder)>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl FindOptions {
    pub fn sorted_by(attribute: impl Into<String>, order: SortOrder) -> Self {
        Self { sort: Some((attribute.into(), order)), limit: None, offset: 0 }
    }
}

/// Bucket-scoped key-value store with ETag optimistic concurrency.
///
/// Writes are serialized per object by the etag protocol, never by
/// locks: callers re-read and retry on [`StoreError::EtagConflict`]
/// (see [`crate::with_etag_retry`]).
#[async_trait]
pub trait ObjectStore: Send + Sync + 'static {
    async fn get(&self, bucket: &str, key: &str) -> Result<Stored, StoreError>;

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        value: Value,
        opts: PutOptions,
    ) -> Result<Etag, StoreError>;

    async fn delete(&self, bucket: &str, key: &str) -> Result<(), StoreError>;

    async fn find(
        &self,
        bucket: &str,
        filter: &Filter,
        opts: FindOptions,
    ) -> Result<Vec<FoundObject>, StoreError>;

    /// Liveness signal for the `connected` HTTP precondition.
    fn is_connected(&self) -> bool {
        true
    }
}
