// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process bus for tests and single-process deployments.

use crate::bus::{Bus, BusError, Delivery, QueueOptions};
use crate::router::Router;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A bus whose broker lives in this process.
#[derive(Clone, Default)]
pub struct MemoryBus {
    router: Arc<Mutex<Router>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(
        &self,
        _exchange: &str,
        routing_key: &str,
        payload: Value,
    ) -> Result<(), BusError> {
        self.router.lock().publish(routing_key, payload);
        Ok(())
    }

    async fn declare_queue(&self, name: &str, opts: QueueOptions) -> Result<(), BusError> {
        self.router.lock().declare(name, opts, None);
        Ok(())
    }

    async fn bind(&self, queue: &str, pattern: &str) -> Result<(), BusError> {
        self.router.lock().bind(queue, pattern)
    }

    async fn subscribe(&self, queue: &str) -> Result<mpsc::Receiver<Delivery>, BusError> {
        self.router.lock().subscribe(queue)
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), BusError> {
        self.router.lock().delete(queue);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
