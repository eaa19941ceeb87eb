// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `/tickets` and `/servers/:uuid/tickets`: the waitlist surface.

use crate::app::AppState;
use crate::error::ApiError;
use crate::validation::{validate, Check, Rule};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use corral_core::{parse_iso8601_ms, epoch_ms_to_utc, RequestId, ServerId, Ticket, TicketId};
use corral_engine::NewTicket;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const CREATE_RULES: &[Rule] = &[
    Rule::new("scope", &[Check::IsString]),
    Rule::new("id", &[Check::IsString]),
    Rule::new("action", &[Check::IsString]),
    Rule::new("expires_at", &[Check::IsString]),
    Rule::new("extra", &[Check::Optional, Check::IsObject]),
];

#[derive(Debug, Default, Deserialize)]
pub struct WaitQuery {
    /// Seconds to wait before giving up.
    timeout: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScopeQuery {
    scope: Option<String>,
}

pub async fn list_for_server(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Query(query): Query<ScopeQuery>,
) -> Result<Json<Vec<Ticket>>, ApiError> {
    // 404 for unknown servers, matching the prepopulate precondition.
    state.registry.get(&ServerId::from_string(&uuid)).await?;
    let queue = state
        .waitlist
        .server_queue(&ServerId::from_string(&uuid), query.scope.as_deref())
        .await?;
    Ok(Json(queue))
}

pub async fn create(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Extension(req_id): Extension<RequestId>,
    Json(mut body): Json<Value>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    validate(&mut body, CREATE_RULES, true).map_err(ApiError::invalid_parameters)?;
    state.registry.get(&ServerId::from_string(&uuid)).await?;

    let expires_at = body["expires_at"]
        .as_str()
        .and_then(parse_iso8601_ms)
        .map(epoch_ms_to_utc)
        .ok_or_else(|| {
            ApiError::invalid_parameters(vec![corral_allocator::FieldError::invalid(
                "expires_at",
                "must be an ISO-8601 timestamp",
            )])
        })?;

    let new = NewTicket {
        server_uuid: ServerId::from_string(&uuid),
        scope: body["scope"].as_str().unwrap_or_default().to_string(),
        id: body["id"].as_str().unwrap_or_default().to_string(),
        action: body["action"].as_str().unwrap_or_default().to_string(),
        expires_at,
        extra: body.get("extra").cloned().unwrap_or(Value::Null),
        req_id: Some(req_id),
    };

    let (ticket, queue) = state.waitlist.create_ticket(new).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "uuid": ticket.uuid, "ticket": ticket, "queue": queue })),
    ))
}

pub async fn flush_for_server(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.registry.get(&ServerId::from_string(&uuid)).await?;
    state.waitlist.flush_server(&ServerId::from_string(&uuid)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<Ticket>, ApiError> {
    Ok(Json(state.waitlist.get(&TicketId::from_string(&uuid)).await?))
}

pub async fn delete_one(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.waitlist.delete(&TicketId::from_string(&uuid)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Block until the ticket activates or expires. A timed-out wait is
/// still a 200: the caller learns the ticket remains queued.
pub async fn wait(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    Query(query): Query<WaitQuery>,
) -> Result<Json<Value>, ApiError> {
    let timeout = query.timeout.map(Duration::from_secs);
    let outcome = state.waitlist.wait(&TicketId::from_string(&uuid), timeout).await?;

    let mut body = serde_json::to_value(&outcome.ticket).unwrap_or(Value::Null);
    if outcome.timed_out {
        if let Some(obj) = body.as_object_mut() {
            obj.insert("wait_timed_out".to_string(), Value::Bool(true));
        }
    }
    Ok(Json(body))
}

pub async fn release(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
) -> Result<Json<Ticket>, ApiError> {
    Ok(Json(state.waitlist.release(&TicketId::from_string(&uuid)).await?))
}
