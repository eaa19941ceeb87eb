// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! corral-store: the bucketed object store the control plane persists into.
//!
//! The store contract is a key-value namespace of buckets with
//! ETag-versioned writes and structured AND/OR filtering. The control
//! plane never locks: every mutation is a conditional put retried on
//! conflict. [`MemoryStore`] is the bundled implementation; a remote
//! store implements the same [`ObjectStore`] trait.

pub mod buckets;
mod filter;
mod memory;
mod retry;
mod snapshot;
mod store;

pub use filter::{Filter, SortOrder};
pub use memory::MemoryStore;
pub use retry::{with_etag_retry, Modify, DEFAULT_ETAG_ATTEMPTS};
pub use snapshot::{Snapshot, SnapshotError, CURRENT_SNAPSHOT_VERSION};
pub use store::{
    Etag, EtagConstraint, FindOptions, FoundObject, ObjectStore, PutOptions, Stored, StoreError,
};
