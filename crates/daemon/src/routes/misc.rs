// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/ping` and `/platforms`.

use crate::app::AppState;
use crate::error::ApiError;
use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

pub async fn ping(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "ping": "pong",
        "version": crate::env::VERSION,
        "connected": {
            "bus": state.bus.is_connected(),
            "workflow": state.workflow.is_connected(),
            "store": state.store.is_connected(),
        },
    }))
}

pub async fn platforms(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let platforms = state.registry.platforms().await?;
    Ok(Json(json!(platforms)))
}
