// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/reboot-plans`: rolling-reboot orchestration.

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{require_connected, Backend};
use crate::validation::{validate, Check, Rule};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use corral_allocator::FieldError;
use corral_core::{PlanAction, PlanId, Reboot, RebootId, ServerId};
use corral_engine::{NewPlan, PlanView};
use serde::Deserialize;
use serde_json::{json, Value};

const CREATE_RULES: &[Rule] = &[
    Rule::new("servers", &[Check::IsArray]),
    Rule::new("concurrency", &[Check::Default(default_concurrency), Check::IsNumber]),
    Rule::new("single_step", &[Check::Optional, Check::ToBoolean]),
];

fn default_concurrency() -> Value {
    json!(1)
}

const ACTION_RULES: &[Rule] = &[Rule::new("action", &[Check::IsString])];

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    include_finished: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<PlanView>>, ApiError> {
    let include_finished = match query.include_finished.as_deref() {
        Some(raw) => super::parse_bool_flag("include_finished", raw)?,
        None => false,
    };
    Ok(Json(state.orchestrator.list_plans(include_finished).await?))
}

pub async fn create(
    State(state): State<AppState>,
    Json(mut body): Json<Value>,
) -> Result<Json<PlanView>, ApiError> {
    require_connected(&state, &[Backend::Workflow])?;
    validate(&mut body, CREATE_RULES, true).map_err(ApiError::invalid_parameters)?;

    let servers: Vec<ServerId> = body["servers"]
        .as_array()
        .map(|arr| {
            arr.iter().filter_map(Value::as_str).map(ServerId::from_string).collect::<Vec<_>>()
        })
        .unwrap_or_default();
    if servers.is_empty() {
        return Err(ApiError::invalid_parameters(vec![FieldError::invalid(
            "servers",
            "at least one server uuid is required",
        )]));
    }

    let new = NewPlan {
        servers,
        concurrency: body["concurrency"].as_u64().unwrap_or(1) as u32,
        single_step: body.get("single_step").and_then(Value::as_bool).unwrap_or(false),
    };

    let view = state.orchestrator.create_plan(new).await?;
    Ok(Json(view))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<PlanView>, ApiError> {
    Ok(Json(state.orchestrator.get_plan(&PlanId::from_string(&uuid)).await?))
}

/// Lifecycle actions ride on PUT: `{"action": "run" | "continue" |
/// "stop" | "cancel"}`.
pub async fn action(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Json(mut body): Json<Value>,
) -> Result<Json<PlanView>, ApiError> {
    validate(&mut body, ACTION_RULES, true).map_err(ApiError::invalid_parameters)?;

    let action: PlanAction = serde_json::from_value(body["action"].clone()).map_err(|_| {
        ApiError::invalid_parameters(vec![FieldError::invalid(
            "action",
            "must be one of run, continue, stop, cancel",
        )])
    })?;
    if action == PlanAction::Finish {
        // Finish is the orchestrator's own transition.
        return Err(ApiError::invalid_parameters(vec![FieldError::invalid(
            "action",
            "must be one of run, continue, stop, cancel",
        )]));
    }

    if matches!(action, PlanAction::Run | PlanAction::Continue) {
        require_connected(&state, &[Backend::Workflow])?;
    }

    Ok(Json(state.orchestrator.apply_action(&PlanId::from_string(&uuid), action).await?))
}

pub async fn delete_one(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.orchestrator.delete_plan(&PlanId::from_string(&uuid)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_reboot(
    State(state): State<AppState>,
    Path((plan, uuid)): Path<(String, String)>,
) -> Result<Json<Reboot>, ApiError> {
    Ok(Json(
        state
            .orchestrator
            .get_reboot(&PlanId::from_string(&plan), &RebootId::from_string(&uuid))
            .await?,
    ))
}
