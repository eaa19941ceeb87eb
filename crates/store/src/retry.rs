// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Read-modify-write with bounded ETag retry.

use crate::store::{Etag, EtagConstraint, ObjectStore, PutOptions, StoreError};
use serde_json::Value;

/// How many conditional-put attempts a mutation path gets before the
/// conflict is surfaced to the caller.
pub const DEFAULT_ETAG_ATTEMPTS: u32 = 10;

/// What the modify closure decided.
pub enum Modify {
    /// Write this document back (conditioned on the etag that was read).
    Write(Value),
    /// Current state is already satisfactory; no write.
    Skip,
}

/// Run `modify` over the current document and conditionally write the
/// result, retrying the whole read-modify-write on etag conflict up to
/// `attempts` times.
///
/// The closure sees `None` when the object does not exist; returning
/// `Modify::Write` then performs a create-only put. Returns the new etag,
/// or `None` when the closure skipped the write.
pub async fn with_etag_retry<S, F>(
    store: &S,
    bucket: &str,
    key: &str,
    attempts: u32,
    mut modify: F,
) -> Result<Option<Etag>, StoreError>
where
    S: ObjectStore + ?Sized,
    F: FnMut(Option<&Value>) -> Result<Modify, StoreError>,
{
    let mut last_conflict = None;

    for attempt in 0..attempts.max(1) {
        let current = match store.get(bucket, key).await {
            Ok(stored) => Some(stored),
            Err(StoreError::NotFound { .. }) => None,
            Err(e) => return Err(e),
        };

        let outcome = modify(current.as_ref().map(|s| &s.value))?;
        let value = match outcome {
            Modify::Write(v) => v,
            Modify::Skip => return Ok(None),
        };

        let constraint = match &current {
            Some(stored) => EtagConstraint::MustMatch(stored.etag.clone()),
            None => EtagConstraint::MustNotExist,
        };

        match store.put(bucket, key, value, PutOptions { etag: constraint }).await {
            Ok(etag) => return Ok(Some(etag)),
            Err(e) if e.is_conflict() => {
                tracing::debug!(bucket, key, attempt, "etag conflict, retrying");
                last_conflict = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_conflict.unwrap_or(StoreError::NotConnected))
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
