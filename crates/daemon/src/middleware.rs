// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-request middleware: request ids, deadlines, and backend
//! preconditions.

use crate::app::AppState;
use crate::error::ApiError;
use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use corral_core::RequestId;
use std::time::Duration;
use tracing::info;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Attach a request id (honoring one the client sent), log the
/// request, and echo the id on the response.
pub async fn request_id(mut request: Request, next: Next) -> Response {
    let req_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(RequestId::from_string)
        .unwrap_or_default();

    request.extensions_mut().insert(req_id);
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let mut response = next.run(request).await;

    info!(req_id = %req_id, %method, %path, status = %response.status(), "http request");
    if let Ok(value) = HeaderValue::from_str(req_id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Bound every handler by the configured deadline (default 1 hour;
/// task and ticket waits are expected to hold connections open).
pub async fn deadline(request: Request, next: Next) -> Response {
    deadline_with(crate::env::request_deadline(), request, next).await
}

pub async fn deadline_with(limit: Duration, request: Request, next: Next) -> Response {
    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => ApiError::new(
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "RequestTimeout",
            format!("request exceeded the {}s deadline", limit.as_secs()),
        )
        .into_response(),
    }
}

/// Backends a handler may require before doing real work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Bus,
    Workflow,
    Store,
}

/// The `connected` precondition: requests that depend on a
/// disconnected backend short-circuit with 503 instead of hanging.
pub fn require_connected(state: &AppState, backends: &[Backend]) -> Result<(), ApiError> {
    for backend in backends {
        let (connected, name) = match backend {
            Backend::Bus => (state.bus.is_connected(), "bus"),
            Backend::Workflow => (state.workflow.is_connected(), "workflow"),
            Backend::Store => (state.store.is_connected(), "store"),
        };
        if !connected {
            return Err(ApiError::service_unavailable(name));
        }
    }
    Ok(())
}
