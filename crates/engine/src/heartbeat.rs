// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat ingest: liveness plus the VM inventory slice.
//!
//! Heartbeats land in memory first (`last_heartbeat` + vms), then a
//! single reconciler task persists dirty entries every
//! `HEARTBEAT_RECONCILIATION_PERIOD_SECONDS`. Ingest for one server is
//! serialized by construction: the entry map holds exactly one slot per
//! server and a newer heartbeat overwrites an older unpersisted one
//! (last-write-wins), so a backlog can never reorder liveness.

use corral_core::{
    epoch_ms_to_utc, Clock, Server, ServerId, ServerStatus, VmEntry,
    HEARTBEAT_LIFETIME_SECONDS, HEARTBEAT_RECONCILIATION_PERIOD_SECONDS,
};
use corral_store::{buckets, with_etag_retry, Modify, ObjectStore, StoreError};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Errors from heartbeat ingest
#[derive(Debug, Error)]
pub enum HeartbeatError {
    #[error("malformed heartbeat payload: {0}")]
    BadPayload(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// The wire shape of a heartbeat.
#[derive(Debug, Default, Deserialize)]
struct HeartbeatPayload {
    #[serde(default)]
    vms: HashMap<String, VmEntry>,
}

#[derive(Debug, Clone)]
struct HbEntry {
    last_heartbeat_ms: u64,
    vms: Option<HashMap<String, VmEntry>>,
    dirty: bool,
}

/// In-memory heartbeat state plus the store reconciler.
#[derive(Clone)]
pub struct Heartbeater<C: Clock> {
    clock: C,
    store: Arc<dyn ObjectStore>,
    entries: Arc<Mutex<HashMap<ServerId, HbEntry>>>,
}

impl<C: Clock> Heartbeater<C> {
    pub fn new(store: Arc<dyn ObjectStore>, clock: C) -> Self {
        Self { clock, store, entries: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Record a heartbeat. Cheap; all I/O is deferred to the reconciler.
    pub fn ingest(&self, server_uuid: ServerId, payload: &Value) -> Result<(), HeartbeatError> {
        let parsed: HeartbeatPayload = serde_json::from_value(payload.clone())?;
        let now_ms = self.clock.epoch_ms();

        let mut entries = self.entries.lock();
        entries.insert(
            server_uuid,
            HbEntry { last_heartbeat_ms: now_ms, vms: Some(parsed.vms), dirty: true },
        );
        Ok(())
    }

    /// Is this server inside the liveness window right now?
    pub fn is_alive(&self, server_uuid: &ServerId) -> bool {
        let now_ms = self.clock.epoch_ms();
        self.entries
            .lock()
            .get(server_uuid)
            .map(|e| now_ms.saturating_sub(e.last_heartbeat_ms) <= HEARTBEAT_LIFETIME_SECONDS * 1000)
            .unwrap_or(false)
    }

    /// Overlay fresher in-memory liveness onto a server read from the
    /// store, and recompute status.
    pub fn overlay(&self, server: &mut Server) {
        let now_ms = self.clock.epoch_ms();
        if let Some(entry) = self.entries.lock().get(&server.uuid) {
            let mem = epoch_ms_to_utc(entry.last_heartbeat_ms);
            if server.last_heartbeat.map(|t| t < mem).unwrap_or(true) {
                server.last_heartbeat = Some(mem);
            }
            if let Some(vms) = &entry.vms {
                server.vms = vms.clone();
            }
        }
        server.status = server.status_at(now_ms);
    }

    /// Persist dirty entries once. Returns how many were written.
    pub async fn reconcile(&self) -> usize {
        let dirty: Vec<(ServerId, HbEntry)> = {
            let mut entries = self.entries.lock();
            entries
                .iter_mut()
                .filter(|(_, e)| e.dirty)
                .map(|(uuid, e)| {
                    e.dirty = false;
                    (*uuid, e.clone())
                })
                .collect()
        };

        let mut written = 0;
        for (uuid, entry) in dirty {
            match self.persist_entry(uuid, &entry).await {
                Ok(()) => written += 1,
                Err(HeartbeatError::Store(StoreError::NotFound { .. })) => {
                    // Heartbeat before first sysinfo: keep it in memory,
                    // the record will appear shortly.
                    debug!(%uuid, "heartbeat for unknown server, deferring");
                    self.entries.lock().entry(uuid).and_modify(|e| e.dirty = true);
                }
                Err(e) => {
                    warn!(%uuid, error = %e, "heartbeat reconciliation failed");
                    self.entries.lock().entry(uuid).and_modify(|e| e.dirty = true);
                }
            }
        }
        written
    }

    async fn persist_entry(&self, uuid: ServerId, entry: &HbEntry) -> Result<(), HeartbeatError> {
        let hb = epoch_ms_to_utc(entry.last_heartbeat_ms);
        let now_ms = self.clock.epoch_ms();

        with_etag_retry(self.store.as_ref(), buckets::SERVERS, &uuid, 5, |current| {
            let value = current.ok_or_else(|| StoreError::NotFound {
                bucket: buckets::SERVERS.to_string(),
                key: uuid.to_string(),
            })?;
            let mut server: Server = serde_json::from_value(value.clone())
                .map_err(|e| StoreError::Backend(e.to_string()))?;

            // A fresher heartbeat may already be persisted; never regress.
            if server.last_heartbeat.map(|t| t >= hb).unwrap_or(false) {
                return Ok(Modify::Skip);
            }

            server.last_heartbeat = Some(hb);
            if let Some(vms) = &entry.vms {
                server.vms = vms.clone();
            }
            server.status = server.status_at(now_ms);
            server.etag = None;
            serde_json::to_value(&server)
                .map(Modify::Write)
                .map_err(|e| StoreError::Backend(e.to_string()))
        })
        .await?;
        Ok(())
    }

    /// The reconciler loop. One instance per deployment.
    pub async fn run(&self, cancel: CancellationToken) {
        let period = Duration::from_secs(HEARTBEAT_RECONCILIATION_PERIOD_SECONDS);
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(period) => {}
            }
            let written = self.reconcile().await;
            if written > 0 {
                debug!(written, "heartbeat state reconciled");
            }
        }
    }

    /// Expose the liveness status the allocator and HTTP surface see.
    pub fn status_of(&self, server: &Server) -> ServerStatus {
        let mut copy = server.clone();
        self.overlay(&mut copy);
        copy.status
    }

    #[cfg(test)]
    fn last_heartbeat_ms(&self, uuid: &ServerId) -> Option<u64> {
        self.entries.lock().get(uuid).map(|e| e.last_heartbeat_ms)
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
