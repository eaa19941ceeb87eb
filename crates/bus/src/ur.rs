// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Ur: correlated request/reply to CN agents over the bus.
//!
//! Every `execute` call owns an ephemeral reply queue named after a
//! fresh correlation id. The continuation fires exactly once (a
//! single-shot latch guards against the duplicate replies an
//! at-least-once bus is allowed to produce) and the queue is destroyed
//! after a short grace delay so in-flight duplicates die quietly
//! instead of erroring at the broker.

use crate::bus::{Bus, BusError, Delivery, QueueOptions};
use crate::topic;
use corral_core::{RequestId, ServerId, Sysinfo};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

/// Exchange all Ur traffic rides on.
pub const UR_EXCHANGE: &str = "ur";

/// Queue the control plane consumes CN sysinfo announcements from.
pub const SYSINFO_QUEUE: &str = "ur.cnapi.sysinfo";

/// How long a reply queue lingers after the first reply, absorbing
/// duplicates.
pub const REPLY_TEARDOWN_GRACE: Duration = Duration::from_secs(1);

/// Errors from Ur calls.
#[derive(Debug, Error)]
pub enum UrError {
    #[error("command timeout after {timeout:?} (reqid {reqid})")]
    CommandTimeout { reqid: RequestId, timeout: Duration },

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("malformed execute reply: {0}")]
    BadReply(serde_json::Error),

    #[error("reply queue closed before any reply")]
    Closed,
}

/// What a CN agent reports back from an execute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecResult {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    pub exit_status: i32,
}

/// A sysinfo announcement routed in from `ur.sysinfo.#` / `ur.startup.#`.
#[derive(Debug, Clone)]
pub struct SysinfoMessage {
    pub server_uuid: ServerId,
    pub sysinfo: Sysinfo,
    pub routing_key: String,
}

/// The Ur RPC client.
#[derive(Clone)]
pub struct Ur {
    bus: Arc<dyn Bus>,
    grace: Duration,
}

impl Ur {
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self { bus, grace: REPLY_TEARDOWN_GRACE }
    }

    /// Override the teardown grace delay (tests).
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Run a script on one CN and wait for its reply.
    pub async fn execute(
        &self,
        target: ServerId,
        payload: Value,
        timeout: Duration,
    ) -> Result<ExecResult, UrError> {
        let reqid = RequestId::new();
        let queue = format!("ur.cnapi.{reqid}");
        let reply_key = format!("ur.execute-reply.{target}.{reqid}");
        let execute_key = format!("ur.execute.{target}.{reqid}");

        self.bus.declare_queue(&queue, QueueOptions::ephemeral()).await?;
        self.bus.bind(&queue, &reply_key).await?;
        let mut deliveries = self.bus.subscribe(&queue).await?;

        // Single-shot latch: the first reply takes the sender; later
        // replies find it gone and are dropped.
        let (reply_tx, reply_rx) = oneshot::channel::<Delivery>();
        let latch = Arc::new(Mutex::new(Some(reply_tx)));
        let pump_latch = Arc::clone(&latch);
        let pump = tokio::spawn(async move {
            while let Some(delivery) = deliveries.recv().await {
                match pump_latch.lock().take() {
                    Some(tx) => {
                        let _ = tx.send(delivery);
                    }
                    None => trace!("duplicate execute reply dropped"),
                }
            }
        });

        debug!(%target, %reqid, "ur execute");
        self.bus.publish(UR_EXCHANGE, &execute_key, payload).await?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(delivery)) => {
                // Leave the queue up briefly to absorb duplicates.
                let bus = Arc::clone(&self.bus);
                let grace = self.grace;
                tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    pump.abort();
                    let _ = bus.delete_queue(&queue).await;
                });
                serde_json::from_value(delivery.payload).map_err(UrError::BadReply)
            }
            Ok(Err(_)) => {
                pump.abort();
                let _ = self.bus.delete_queue(&queue).await;
                Err(UrError::Closed)
            }
            Err(_) => {
                // Disarm the latch first so no late reply can fire.
                latch.lock().take();
                pump.abort();
                let _ = self.bus.delete_queue(&queue).await;
                debug!(%target, %reqid, "ur execute timeout");
                Err(UrError::CommandTimeout { reqid, timeout })
            }
        }
    }

    /// Ask every CN for sysinfo and collect replies for `window`.
    /// Non-responders are silently omitted.
    pub async fn broadcast_sysinfo(&self, window: Duration) -> Result<Vec<Sysinfo>, UrError> {
        let reqid = RequestId::new();
        let queue = format!("ur.cnapi.{reqid}");

        self.bus.declare_queue(&queue, QueueOptions::ephemeral()).await?;
        self.bus.bind(&queue, &format!("ur.execute-reply.*.{reqid}")).await?;
        let mut deliveries = self.bus.subscribe(&queue).await?;

        self.bus
            .publish(UR_EXCHANGE, &format!("ur.broadcast.sysinfo.{reqid}"), Value::Null)
            .await?;

        let mut collected = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, deliveries.recv()).await {
                Ok(Some(delivery)) => collected.push(Sysinfo::new(delivery.payload)),
                Ok(None) | Err(_) => break,
            }
        }

        let _ = self.bus.delete_queue(&queue).await;
        debug!(%reqid, count = collected.len(), "sysinfo broadcast collected");
        Ok(collected)
    }

    /// Subscribe to CN sysinfo announcements.
    ///
    /// Binds `ur.sysinfo.#` plus the legacy `ur.startup.#`; both carry
    /// the CN uuid as the third routing-key segment.
    pub async fn subscribe_sysinfo(&self) -> Result<mpsc::Receiver<SysinfoMessage>, UrError> {
        self.bus.declare_queue(SYSINFO_QUEUE, QueueOptions::default()).await?;
        self.bus.bind(SYSINFO_QUEUE, "ur.sysinfo.#").await?;
        self.bus.bind(SYSINFO_QUEUE, "ur.startup.#").await?;
        let mut raw = self.bus.subscribe(SYSINFO_QUEUE).await?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            while let Some(delivery) = raw.recv().await {
                let Some(uuid) = topic::segment(&delivery.routing_key, 2) else {
                    warn!(key = %delivery.routing_key, "sysinfo message without CN uuid segment");
                    continue;
                };
                let msg = SysinfoMessage {
                    server_uuid: ServerId::from_string(uuid),
                    sysinfo: Sysinfo::new(delivery.payload),
                    routing_key: delivery.routing_key,
                };
                if tx.send(msg).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}

#[cfg(test)]
#[path = "ur_tests.rs"]
mod tests;
