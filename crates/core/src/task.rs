// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persisted records for asynchronous CN agent commands.

use crate::id::{RequestId, ServerId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event name a CN agent sends when a task ends well.
pub const EVENT_FINISH: &str = "finish";

/// Event name a CN agent sends when a task ends badly.
pub const EVENT_ERROR: &str = "error";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Active,
    Complete,
    Failure,
}

crate::simple_display! {
    TaskStatus {
        Active => "active",
        Complete => "complete",
        Failure => "failure",
    }
}

/// One progress event streamed back from the CN agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub name: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub payload: Value,
}

/// A tracked CN agent command.
///
/// Created with an empty history when the command is dispatched; the
/// history is append-only, and a `finish`/`error` event is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub taskid: TaskId,
    pub server_uuid: ServerId,
    pub status: TaskStatus,
    pub history: Vec<TaskEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_id: Option<RequestId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(taskid: TaskId, server_uuid: ServerId, created_at: DateTime<Utc>) -> Self {
        Self {
            taskid,
            server_uuid,
            status: TaskStatus::Active,
            history: Vec::new(),
            timeout_secs: None,
            req_id: None,
            created_at,
            updated_at: created_at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Complete | TaskStatus::Failure)
    }

    /// Append a progress event, applying terminal transitions.
    ///
    /// Events arriving after a terminal transition are still recorded
    /// (the bus is at-least-once) but cannot change the outcome.
    pub fn append_event(&mut self, event: TaskEvent) {
        let terminal = self.is_terminal();
        if !terminal {
            match event.name.as_str() {
                EVENT_FINISH => self.status = TaskStatus::Complete,
                EVENT_ERROR => self.status = TaskStatus::Failure,
                _ => {}
            }
        }
        self.updated_at = event.timestamp;
        self.history.push(event);
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
