// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/tasks`: CN agent command tracking.

use crate::app::AppState;
use crate::error::ApiError;
use axum::extract::{Path, Query, State};
use axum::Json;
use corral_core::{Task, TaskId};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
pub struct WaitQuery {
    /// Seconds to wait before giving up.
    timeout: Option<u64>,
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(taskid): Path<String>,
) -> Result<Json<Task>, ApiError> {
    Ok(Json(state.tasks.get(&TaskId::from_string(&taskid)).await?))
}

/// Block until the task is terminal. On timeout, the last-known state
/// comes back with a distinct flag.
pub async fn wait(
    State(state): State<AppState>,
    Path(taskid): Path<String>,
    Query(query): Query<WaitQuery>,
) -> Result<Json<Value>, ApiError> {
    let timeout = query.timeout.map(Duration::from_secs);
    let outcome = state.tasks.wait(&TaskId::from_string(&taskid), timeout).await?;

    let mut body = serde_json::to_value(&outcome.task).unwrap_or(Value::Null);
    if outcome.timed_out {
        if let Some(obj) = body.as_object_mut() {
            obj.insert("wait_timed_out".to_string(), Value::Bool(true));
        }
    }
    Ok(Json(body))
}
