// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The routing core shared by [`crate::MemoryBus`] and [`crate::Broker`].
//!
//! One topic exchange: a published key is tested against every queue's
//! bindings. Queues buffer while they have no subscriber so a
//! bind-then-subscribe sequence cannot drop messages.

use crate::bus::{BusError, Delivery, QueueOptions};
use std::collections::{HashMap, VecDeque};
use tokio::sync::mpsc;

/// Messages buffered per queue while no subscriber is attached.
const QUEUE_BUFFER: usize = 1024;

/// Per-subscriber channel depth.
pub(crate) const SUBSCRIBER_DEPTH: usize = 256;

#[derive(Default)]
struct QueueState {
    bindings: Vec<String>,
    subscribers: Vec<mpsc::Sender<Delivery>>,
    options: QueueOptions,
    /// Connection tag for exclusive-queue cleanup (broker side).
    owner: Option<u64>,
    buffer: VecDeque<Delivery>,
}

/// Queues, bindings, and subscriber channels.
#[derive(Default)]
pub(crate) struct Router {
    queues: HashMap<String, QueueState>,
}

impl Router {
    pub fn declare(&mut self, name: &str, options: QueueOptions, owner: Option<u64>) {
        let entry = self.queues.entry(name.to_string()).or_default();
        entry.options = options;
        if entry.owner.is_none() {
            entry.owner = owner;
        }
    }

    pub fn bind(&mut self, queue: &str, pattern: &str) -> Result<(), BusError> {
        let state = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| BusError::NoSuchQueue(queue.to_string()))?;
        if !state.bindings.iter().any(|p| p == pattern) {
            state.bindings.push(pattern.to_string());
        }
        Ok(())
    }

    pub fn subscribe(&mut self, queue: &str) -> Result<mpsc::Receiver<Delivery>, BusError> {
        let state = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| BusError::NoSuchQueue(queue.to_string()))?;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_DEPTH);
        for delivery in state.buffer.drain(..) {
            let _ = tx.try_send(delivery);
        }
        state.subscribers.push(tx);
        Ok(rx)
    }

    pub fn unsubscribe(&mut self, queue: &str) {
        if let Some(state) = self.queues.get_mut(queue) {
            state.subscribers.clear();
            if state.options.auto_delete {
                self.queues.remove(queue);
            }
        }
    }

    pub fn delete(&mut self, queue: &str) {
        self.queues.remove(queue);
    }

    /// Route a published message to every matching queue.
    pub fn publish(&mut self, routing_key: &str, payload: serde_json::Value) {
        for (name, state) in &mut self.queues {
            if !state.bindings.iter().any(|p| crate::topic::matches(p, routing_key)) {
                continue;
            }
            let delivery =
                Delivery { routing_key: routing_key.to_string(), payload: payload.clone() };

            // Drop closed subscriber channels as we go.
            state.subscribers.retain(|tx| !tx.is_closed());
            if state.subscribers.is_empty() {
                if state.buffer.len() == QUEUE_BUFFER {
                    tracing::warn!(queue = %name, "queue buffer full, dropping oldest");
                    state.buffer.pop_front();
                }
                state.buffer.push_back(delivery);
                continue;
            }

            for tx in &state.subscribers {
                if tx.try_send(delivery.clone()).is_err() {
                    tracing::warn!(queue = %name, key = routing_key, "slow subscriber, dropping");
                }
            }
        }
    }

    /// Remove everything a disconnected connection owned.
    pub fn drop_owner(&mut self, owner: u64) {
        self.queues.retain(|_, state| {
            if state.owner == Some(owner) && state.options.exclusive {
                return false;
            }
            state.subscribers.retain(|tx| !tx.is_closed());
            true
        });
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    #[cfg(test)]
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queues.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
