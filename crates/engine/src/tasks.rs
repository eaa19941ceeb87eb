// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Asynchronous CN agent commands, tracked as persisted task records.
//!
//! Dispatch publishes the command to the CN agent and persists a task
//! with an empty history; the agent streams progress events back over
//! the bus, each appended to the history, and a `finish`/`error` event
//! is terminal. `wait` parks callers until that terminal event.

use corral_bus::{topic, Bus, BusError, QueueOptions};
use corral_core::{Clock, RequestId, ServerId, Task, TaskEvent, TaskId};
use corral_store::{
    buckets, with_etag_retry, Modify, ObjectStore, StoreError, DEFAULT_ETAG_ATTEMPTS,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default CN agent resource a task is addressed to.
pub const DEFAULT_RESOURCE: &str = "provisioner";

/// Errors from task operations
#[derive(Debug, Error)]
pub enum TaskError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Bus(#[from] BusError),

    #[error("malformed task record {uuid}: {message}")]
    BadRecord { uuid: String, message: String },
}

/// Dispatch knobs.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// CN agent resource (`provisioner` unless stated otherwise).
    pub resource: String,
    pub timeout_secs: Option<u64>,
    pub req_id: Option<RequestId>,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self { resource: DEFAULT_RESOURCE.to_string(), timeout_secs: None, req_id: None }
    }
}

impl DispatchOptions {
    corral_core::setters! {
        into {
            resource: String,
        }
        option {
            timeout_secs: u64,
            req_id: RequestId,
        }
    }
}

/// Outcome of a `wait`: final (or last-known) task state, and whether
/// the wait gave up first.
#[derive(Debug, Clone)]
pub struct TaskWait {
    pub task: Task,
    pub timed_out: bool,
}

/// Task dispatch and tracking.
#[derive(Clone)]
pub struct TaskDispatcher<C: Clock> {
    clock: C,
    store: Arc<dyn ObjectStore>,
    bus: Arc<dyn Bus>,
    /// Identifies this control plane in task-event routing keys.
    client_id: String,
    waiters: Arc<Mutex<HashMap<TaskId, Vec<oneshot::Sender<Task>>>>>,
}

fn parse_task(key: &str, value: &Value) -> Result<Task, TaskError> {
    serde_json::from_value(value.clone())
        .map_err(|e| TaskError::BadRecord { uuid: key.to_string(), message: e.to_string() })
}

impl<C: Clock> TaskDispatcher<C> {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bus: Arc<dyn Bus>,
        clock: C,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            clock,
            store,
            bus,
            client_id: client_id.into(),
            waiters: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Publish a command to a CN agent and persist its task record.
    pub async fn dispatch(
        &self,
        server_uuid: ServerId,
        task_name: &str,
        params: Value,
        opts: DispatchOptions,
    ) -> Result<Task, TaskError> {
        let mut task = Task::new(TaskId::new(), server_uuid, self.clock.now_utc());
        task.timeout_secs = opts.timeout_secs;
        task.req_id = opts.req_id;

        let value = serde_json::to_value(&task)
            .map_err(|e| StoreError::Backend(e.to_string()))
            .map_err(TaskError::Store)?;
        self.store
            .put(buckets::TASKS, &task.taskid, value, corral_store::PutOptions::must_not_exist())
            .await?;

        let key = format!("{}.{}.task.{}", opts.resource, server_uuid, task_name);
        let payload = json!({
            "task_id": task.taskid,
            "client_id": self.client_id,
            "req_id": task.req_id,
            "params": params,
        });
        self.bus.publish(opts.resource.as_str(), &key, payload).await?;

        info!(task = %task.taskid, server = %server_uuid, task_name, "task dispatched");
        Ok(task)
    }

    /// Read-through task fetch.
    pub async fn get(&self, taskid: &TaskId) -> Result<Task, TaskError> {
        match self.store.get(buckets::TASKS, taskid).await {
            Ok(stored) => parse_task(taskid, &stored.value),
            Err(StoreError::NotFound { .. }) => Err(TaskError::NotFound(*taskid)),
            Err(e) => Err(e.into()),
        }
    }

    /// Block until the task is terminal, or until `timeout`. Already
    /// terminal returns immediately; a timed-out wait returns the
    /// last-known state with the timeout flag set.
    pub async fn wait(
        &self,
        taskid: &TaskId,
        timeout: Option<Duration>,
    ) -> Result<TaskWait, TaskError> {
        let task = self.get(taskid).await?;
        if task.is_terminal() {
            return Ok(TaskWait { task, timed_out: false });
        }

        let rx = {
            let (tx, rx) = oneshot::channel();
            let mut waiters = self.waiters.lock();
            let entry = waiters.entry(*taskid).or_default();
            entry.retain(|w| !w.is_closed());
            entry.push(tx);
            rx
        };

        // Close the register/transition race with a second read.
        let task = self.get(taskid).await?;
        if task.is_terminal() {
            self.notify(&task);
            return Ok(TaskWait { task, timed_out: false });
        }

        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, rx).await,
            None => Ok(rx.await),
        };

        match outcome {
            Ok(Ok(task)) => Ok(TaskWait { task, timed_out: false }),
            Ok(Err(_)) => Ok(TaskWait { task: self.get(taskid).await?, timed_out: false }),
            Err(_) => Ok(TaskWait { task: self.get(taskid).await?, timed_out: true }),
        }
    }

    /// Append an agent event to a task, applying terminal transitions
    /// and resolving waiters. Duplicate deliveries (same event id) are
    /// dropped; the bus is at-least-once.
    pub async fn ingest_event(
        &self,
        taskid: &TaskId,
        event_name: &str,
        payload: Value,
    ) -> Result<Task, TaskError> {
        let now = self.clock.now_utc();
        let event_id = payload.get("id").and_then(Value::as_str).map(str::to_string);

        let result = with_etag_retry(
            self.store.as_ref(),
            buckets::TASKS,
            taskid,
            DEFAULT_ETAG_ATTEMPTS,
            |current| {
                let value = current.ok_or_else(|| StoreError::NotFound {
                    bucket: buckets::TASKS.to_string(),
                    key: taskid.to_string(),
                })?;
                let mut task =
                    parse_task(taskid, value).map_err(|e| StoreError::Backend(e.to_string()))?;

                if let Some(id) = &event_id {
                    let seen = task.history.iter().any(|e| {
                        e.payload.get("id").and_then(Value::as_str) == Some(id.as_str())
                    });
                    if seen {
                        return Ok(Modify::Skip);
                    }
                }

                task.append_event(TaskEvent {
                    name: event_name.to_string(),
                    timestamp: now,
                    payload: payload.clone(),
                });
                serde_json::to_value(&task)
                    .map(Modify::Write)
                    .map_err(|e| StoreError::Backend(e.to_string()))
            },
        )
        .await;

        match result {
            Ok(_) => {
                let task = self.get(taskid).await?;
                if task.is_terminal() {
                    debug!(task = %taskid, status = %task.status, "task reached terminal state");
                    self.notify(&task);
                }
                Ok(task)
            }
            Err(StoreError::NotFound { .. }) => Err(TaskError::NotFound(*taskid)),
            Err(e) => Err(e.into()),
        }
    }

    /// Consume task events from the bus until cancelled.
    ///
    /// Binds `*.*.event.*.<client_id>.*`; the routing key carries
    /// `<resource>.<cn_uuid>.event.<event_name>.<client_id>.<task_id>`.
    pub async fn run_event_listener(&self, cancel: CancellationToken) -> Result<(), TaskError> {
        let queue = format!("corral.task-events.{}", self.client_id);
        self.bus.declare_queue(&queue, QueueOptions::default()).await?;
        self.bus.bind(&queue, &format!("*.*.event.*.{}.*", self.client_id)).await?;
        let mut rx = self.bus.subscribe(&queue).await?;

        loop {
            let delivery = tokio::select! {
                () = cancel.cancelled() => return Ok(()),
                delivery = rx.recv() => match delivery {
                    Some(d) => d,
                    None => return Ok(()),
                },
            };

            let key = delivery.routing_key.as_str();
            let (Some(event_name), Some(task_id)) =
                (topic::segment(key, 3), topic::segment(key, 5))
            else {
                warn!(key, "task event with malformed routing key");
                continue;
            };

            let taskid = TaskId::from_string(task_id);
            if let Err(e) = self.ingest_event(&taskid, event_name, delivery.payload).await {
                warn!(task = %taskid, error = %e, "task event ingest failed");
            }
        }
    }

    /// Resolve every waiter for this task, exactly once each.
    fn notify(&self, task: &Task) {
        let senders = self.waiters.lock().remove(&task.taskid).unwrap_or_default();
        for tx in senders {
            let _ = tx.send(task.clone());
        }
    }
}

#[cfg(test)]
#[path = "tasks_tests.rs"]
mod tests;
