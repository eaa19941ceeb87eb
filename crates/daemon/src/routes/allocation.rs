// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/allocate` and `/capacity`: VM placement.

use crate::app::AppState;
use crate::error::ApiError;
use crate::validation::{validate, Check, Rule};
use axum::extract::State;
use axum::Json;
use corral_allocator::{AllocationRequest, FieldError, Image, Package, VmPayload};
use corral_core::{Server, ServerId};
use corral_engine::ListServers;
use serde_json::{json, Value};

const ALLOCATE_RULES: &[Rule] = &[
    Rule::new("vm", &[Check::IsObject]),
    Rule::new("image", &[Check::Optional, Check::IsObject]),
    Rule::new("package", &[Check::Optional, Check::IsObject]),
    Rule::new("servers", &[Check::Optional, Check::IsArray]),
];

const CAPACITY_RULES: &[Rule] = &[Rule::new("servers", &[Check::Optional, Check::IsArray])];

pub async fn allocate(
    State(state): State<AppState>,
    Json(mut body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    validate(&mut body, ALLOCATE_RULES, true).map_err(ApiError::invalid_parameters)?;
    let request = build_request(&state, &body, true).await?;

    let allocation = state.allocator.allocate(&request)?;
    Ok(Json(json!({
        "server": allocation.server,
        "steps": allocation.steps,
    })))
}

pub async fn capacity(
    State(state): State<AppState>,
    Json(mut body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    validate(&mut body, CAPACITY_RULES, true).map_err(ApiError::invalid_parameters)?;
    // Capacity reuses the allocation snapshot with a placeholder VM.
    if let Some(obj) = body.as_object_mut() {
        obj.entry("vm").or_insert(json!({"ram": 1, "owner_uuid": "capacity"}));
    }
    let request = build_request(&state, &body, false).await?;

    let capacities = state.allocator.capacity(&request);
    Ok(Json(json!({ "capacities": capacities })))
}

/// Resolve the request body into an allocation snapshot.
///
/// When the caller names servers, every uuid must exist, and (for
/// allocation proper) none may sit in a pending reboot plan.
async fn build_request(
    state: &AppState,
    body: &Value,
    check_pending_reboots: bool,
) -> Result<AllocationRequest, ApiError> {
    let payload: VmPayload = serde_json::from_value(body["vm"].clone())
        .map_err(|e| bad_field("vm", e.to_string()))?;
    let image: Image = match body.get("image") {
        Some(raw) => serde_json::from_value(raw.clone())
            .map_err(|e| bad_field("image", e.to_string()))?,
        None => Image::default(),
    };
    let package: Option<Package> = match body.get("package") {
        Some(raw) => Some(
            serde_json::from_value(raw.clone())
                .map_err(|e| bad_field("package", e.to_string()))?,
        ),
        None => None,
    };

    let requested: Vec<String> = body
        .get("servers")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();

    let mut servers: Vec<Server> = if requested.is_empty() {
        state.registry.list(&ListServers { setup: Some(true), ..Default::default() }).await?
    } else {
        let mut resolved = Vec::with_capacity(requested.len());
        let mut unknown = Vec::new();
        for uuid in &requested {
            match state.registry.get(&ServerId::from_string(uuid)).await {
                Ok(server) => resolved.push(server),
                Err(corral_engine::RegistryError::NotFound(_)) => unknown.push(uuid.clone()),
                Err(e) => return Err(e.into()),
            }
        }
        if !unknown.is_empty() {
            return Err(invalid(vec![FieldError::invalid(
                "servers",
                format!("unknown server uuids: {}", unknown.join(", ")),
            )]));
        }
        resolved
    };

    if check_pending_reboots && !requested.is_empty() {
        let busy = state.orchestrator.servers_in_pending_plans().await?;
        let blocked: Vec<String> = servers
            .iter()
            .filter(|s| busy.contains(&s.uuid))
            .map(|s| s.uuid.to_string())
            .collect();
        if !blocked.is_empty() {
            return Err(invalid(vec![FieldError::invalid(
                "servers",
                format!("servers with pending reboot plans: {}", blocked.join(", ")),
            )]));
        }
    }

    for server in &mut servers {
        state.heartbeat.overlay(server);
    }
    let open_tickets = state.waitlist.open_tickets().await?;

    Ok(AllocationRequest { payload, image, package, servers, open_tickets })
}

fn bad_field(field: &str, message: String) -> ApiError {
    invalid(vec![FieldError::invalid(field, message)])
}

/// Allocation parameter failures are 409s, unlike the validator's 500s.
fn invalid(errors: Vec<FieldError>) -> ApiError {
    corral_allocator::AllocatorError::InvalidParameters { errors }.into()
}
