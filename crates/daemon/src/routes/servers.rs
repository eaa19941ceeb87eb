// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/servers`: the authoritative CN records.

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{require_connected, Backend};
use crate::validation::{validate, Check, Rule};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use corral_bus::ExecResult;
use corral_core::{Server, ServerId, ServerStatus, Sysinfo};
use corral_engine::{ListServers, ServerUpdate};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    setup: Option<String>,
    headnode: Option<String>,
    hostname: Option<String>,
    /// Comma-separated uuid list.
    uuids: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Server>>, ApiError> {
    let mut opts = ListServers { hostname: query.hostname.clone(), ..Default::default() };
    if let Some(setup) = &query.setup {
        opts.setup = Some(super::parse_bool_flag("setup", setup)?);
    }
    if let Some(headnode) = &query.headnode {
        opts.headnode = Some(super::parse_bool_flag("headnode", headnode)?);
    }
    if let Some(uuids) = &query.uuids {
        opts.uuids = uuids.split(',').filter(|s| !s.is_empty()).map(ServerId::from_string).collect();
    }

    let mut servers = state.registry.list(&opts).await?;
    for server in &mut servers {
        state.heartbeat.overlay(server);
    }
    Ok(Json(servers))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<Server>, ApiError> {
    let mut server = state.registry.get(&ServerId::from_string(&uuid)).await?;
    state.heartbeat.overlay(&mut server);
    Ok(Json(server))
}

const UPDATE_RULES: &[Rule] = &[
    Rule::new("reserved", &[Check::Optional, Check::ToBoolean]),
    Rule::new("reservation_ratio", &[Check::Optional, Check::IsNumber]),
    Rule::new("boot_platform", &[Check::Optional, Check::IsString]),
    Rule::new("default_console", &[Check::Optional, Check::IsString]),
    Rule::new("serial", &[Check::Optional, Check::IsString]),
    Rule::new("traits", &[Check::Optional, Check::IsObject]),
    Rule::new("overprovision_ratios", &[Check::Optional, Check::IsObject]),
    Rule::new("next_reboot", &[Check::Optional]),
];

pub async fn update(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Json(mut body): Json<Value>,
) -> Result<Json<Server>, ApiError> {
    validate(&mut body, UPDATE_RULES, true).map_err(ApiError::invalid_parameters)?;
    let update: ServerUpdate = serde_json::from_value(body)
        .map_err(|e| ApiError::invalid_parameters(vec![
            corral_allocator::FieldError::invalid("body", e.to_string()),
        ]))?;

    let server = state.registry.update(&ServerId::from_string(&uuid), &update).await?;
    Ok(Json(server))
}

pub async fn delete_one(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.registry.delete(&ServerId::from_string(&uuid)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn factory_reset(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<Server>, ApiError> {
    let server = state.registry.factory_reset(&ServerId::from_string(&uuid)).await?;
    Ok(Json(server))
}

/// CN agents (and operators) push sysinfo documents here; this is the
/// path that creates server records.
pub async fn post_sysinfo(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Json(body): Json<Value>,
) -> Result<Json<Server>, ApiError> {
    let sysinfo = Sysinfo::new(body);
    let reported = sysinfo.uuid().map_err(|e| {
        ApiError::new(StatusCode::CONFLICT, "InvalidArgument", e.to_string())
    })?;
    if reported != ServerId::from_string(&uuid) {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "InvalidArgument",
            format!("sysinfo UUID {reported} does not match {uuid}"),
        ));
    }

    let server = state.registry.upsert_from_sysinfo(sysinfo).await?;
    Ok(Json(server))
}

const EXECUTE_RULES: &[Rule] = &[
    Rule::new("script", &[Check::IsString]),
    Rule::new("args", &[Check::Optional, Check::IsArray]),
    Rule::new("env", &[Check::Optional, Check::IsObject]),
    Rule::new("timeout", &[Check::Optional, Check::IsNumber]),
];

/// Synchronous remote execution over Ur.
pub async fn execute(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Json(mut body): Json<Value>,
) -> Result<Json<ExecResult>, ApiError> {
    require_connected(&state, &[Backend::Bus])?;
    validate(&mut body, EXECUTE_RULES, true).map_err(ApiError::invalid_parameters)?;

    let server_uuid = ServerId::from_string(&uuid);
    let mut server = state.registry.get(&server_uuid).await?;
    state.heartbeat.overlay(&mut server);
    if server.status != ServerStatus::Running {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "ServerNotRunning",
            format!("server {uuid} is {}", server.status),
        ));
    }

    let timeout = body
        .get("timeout")
        .and_then(Value::as_u64)
        .map(Duration::from_secs)
        .unwrap_or(Duration::from_secs(60));

    let payload = json!({
        "script": body["script"],
        "args": body.get("args").cloned().unwrap_or_else(|| json!([])),
        "env": body.get("env").cloned().unwrap_or_else(|| json!({})),
    });

    let result = state.ur.execute(server_uuid, payload, timeout).await?;
    Ok(Json(result))
}

/// Kick off a single-server reboot job.
pub async fn reboot(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<(StatusCode, Json<HashMap<&'static str, String>>), ApiError> {
    require_connected(&state, &[Backend::Workflow])?;
    let job = state.orchestrator.reboot_server(&ServerId::from_string(&uuid)).await?;
    Ok((StatusCode::ACCEPTED, Json(HashMap::from([("job_uuid", job.to_string())]))))
}
