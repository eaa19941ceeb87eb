// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The bus seam every component talks through.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// A message delivered from a subscribed queue.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub routing_key: String,
    pub payload: Value,
}

/// Queue declaration options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    /// Owned by one connection; dies with it.
    pub exclusive: bool,
    /// Deleted once the last subscriber goes away.
    pub auto_delete: bool,
}

impl QueueOptions {
    /// The shape every ephemeral reply queue wants.
    pub fn ephemeral() -> Self {
        Self { exclusive: true, auto_delete: true }
    }
}

/// Errors from bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus is not connected")]
    NotConnected,

    #[error("no such queue: {0}")]
    NoSuchQueue(String),

    #[error("bus protocol error: {0}")]
    Protocol(String),
}

/// Topic publish/subscribe with named queues.
///
/// Delivery is at-least-once: consumers may see duplicates after a
/// reconnect, so every mutation driven from the bus must be idempotent
/// on `(server_uuid, reqid)`.
#[async_trait]
pub trait Bus: Send + Sync + 'static {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Value,
    ) -> Result<(), BusError>;

    async fn declare_queue(&self, name: &str, opts: QueueOptions) -> Result<(), BusError>;

    async fn bind(&self, queue: &str, pattern: &str) -> Result<(), BusError>;

    /// Attach a consumer. Messages that arrived between bind and
    /// subscribe are buffered and drained to the first subscriber.
    async fn subscribe(&self, queue: &str) -> Result<mpsc::Receiver<Delivery>, BusError>;

    async fn delete_queue(&self, queue: &str) -> Result<(), BusError>;

    /// Liveness signal for the `connected` HTTP precondition.
    fn is_connected(&self) -> bool;
}
