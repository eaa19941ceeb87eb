// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot persistence for the bundled store.
//!
//! A snapshot is the complete bucket map, zstd-compressed JSON, written
//! atomically (tmp file + rename) with rotated `.bak` files so a torn
//! write never eats the only copy.

use crate::memory::MemoryStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current snapshot schema version
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 3;
const MAX_BAK_FILES: u32 = 3;

/// Errors that can occur in snapshot operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported snapshot version {0}")]
    Version(u32),
}

/// A point-in-time copy of every bucket.
#[derive(Debug, Serialize, Deserialize)]
pub struct Snapshot {
    /// Schema version for migrations
    #[serde(rename = "v")]
    pub version: u32,
    pub created_at: DateTime<Utc>,
    buckets: crate::memory::Buckets,
}

impl Snapshot {
    /// Capture the store's current contents.
    pub fn capture(store: &MemoryStore) -> Self {
        Self {
            version: CURRENT_SNAPSHOT_VERSION,
            created_at: Utc::now(),
            buckets: store.clone_buckets(),
        }
    }

    /// Restore a store from this snapshot.
    pub fn restore(self) -> Result<MemoryStore, SnapshotError> {
        if self.version != CURRENT_SNAPSHOT_VERSION {
            return Err(SnapshotError::Version(self.version));
        }
        Ok(MemoryStore::from_buckets(self.buckets))
    }

    /// Write atomically to `path`, rotating previous snapshots to `.bak`.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec(self)?;
        let compressed = zstd::stream::encode_all(json.as_slice(), ZSTD_LEVEL)?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &compressed)?;

        if path.exists() {
            let _ = fs::rename(path, rotate_bak_path(path));
        }
        fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), bytes = compressed.len(), "snapshot saved");
        Ok(())
    }

    /// Load a snapshot from `path`.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let compressed = fs::read(path)?;
        let json = zstd::stream::decode_all(compressed.as_slice())?;
        Ok(serde_json::from_slice(&json)?)
    }
}

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`.
/// The oldest backup is removed when the limit is reached.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
