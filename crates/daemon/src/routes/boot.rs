// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/boot`: netboot parameters, per server and the default record.

use crate::app::AppState;
use crate::error::ApiError;
use crate::validation::{validate, Check, Rule};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use corral_core::{BootParams, ServerId, DEFAULT_SERVER_UUID};
use corral_engine::BootParamsPatch;
use serde_json::Value;

const BOOT_RULES: &[Rule] = &[
    Rule::new("platform", &[Check::Optional, Check::IsString]),
    Rule::new("kernel_args", &[Check::Optional, Check::IsObject]),
    Rule::new("kernel_flags", &[Check::Optional, Check::IsObject]),
    Rule::new("boot_modules", &[Check::Optional, Check::IsArray]),
    Rule::new("default_console", &[Check::Optional, Check::IsString]),
    Rule::new("serial", &[Check::Optional, Check::IsString]),
];

fn parse_patch(mut body: Value) -> Result<BootParamsPatch, ApiError> {
    validate(&mut body, BOOT_RULES, true).map_err(ApiError::invalid_parameters)?;
    serde_json::from_value(body).map_err(|e| {
        ApiError::invalid_parameters(vec![corral_allocator::FieldError::invalid(
            "body",
            e.to_string(),
        )])
    })
}

pub async fn get_params(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<BootParams>, ApiError> {
    Ok(Json(state.registry.get_boot_params(&ServerId::from_string(&uuid)).await?))
}

pub async fn set_params(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Json(body): Json<Value>,
) -> Result<StatusCode, ApiError> {
    let patch = parse_patch(body)?;
    state.registry.set_boot_params(&ServerId::from_string(&uuid), &patch).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_params(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Json(body): Json<Value>,
) -> Result<StatusCode, ApiError> {
    let patch = parse_patch(body)?;
    state.registry.update_boot_params(&ServerId::from_string(&uuid), &patch).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_default(State(state): State<AppState>) -> Result<Json<BootParams>, ApiError> {
    Ok(Json(
        state.registry.get_boot_params(&ServerId::from_string(DEFAULT_SERVER_UUID)).await?,
    ))
}

pub async fn set_default(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<StatusCode, ApiError> {
    let patch = parse_patch(body)?;
    state
        .registry
        .set_boot_params(&ServerId::from_string(DEFAULT_SERVER_UUID), &patch)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_default(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<StatusCode, ApiError> {
    let patch = parse_patch(body)?;
    state
        .registry
        .update_boot_params(&ServerId::from_string(DEFAULT_SERVER_UUID), &patch)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
