// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The error envelope: every engine error maps to exactly one HTTP
//! shape here, `{code, message, errors?}`, plus `steps` for allocator
//! refusals.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use corral_allocator::{AllocatorError, FieldError, StepSummary};
use corral_bus::{BusError, UrError};
use corral_engine::{HeartbeatError, PlanError, RegistryError, TaskError, WaitlistError, WorkflowError};
use corral_store::StoreError;
use serde_json::json;

/// An HTTP-mappable failure.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub errors: Vec<FieldError>,
    pub steps: Vec<StepSummary>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self { status, code, message: message.into(), errors: Vec::new(), steps: Vec::new() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "ResourceNotFound", message)
    }

    /// The declarative validator's failure shape: 500 with per-field
    /// entries, matching the original surface.
    pub fn invalid_parameters(errors: Vec<FieldError>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "InvalidParameters",
            message: "Request parameters failed validation".to_string(),
            errors,
            steps: Vec::new(),
        }
    }

    pub fn service_unavailable(backend: &str) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "ServiceUnavailable",
            format!("{backend} backend is not connected"),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({ "code": self.code, "message": self.message });
        if !self.errors.is_empty() {
            body["errors"] = json!(self.errors);
        }
        if !self.steps.is_empty() {
            body["steps"] = json!(self.steps);
        }
        (self.status, Json(body)).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound(uuid) => Self::not_found(format!("server {uuid} not found")),
            RegistryError::UuidMismatch { .. } => {
                Self::new(StatusCode::CONFLICT, "InvalidArgument", e.to_string())
            }
            RegistryError::Sysinfo(e) => {
                Self::new(StatusCode::CONFLICT, "InvalidArgument", e.to_string())
            }
            RegistryError::Store(e) => e.into(),
            RegistryError::BadRecord { .. } => Self::internal(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => Self::not_found(e.to_string()),
            StoreError::EtagConflict { .. } | StoreError::AlreadyExists { .. } => {
                Self::new(StatusCode::CONFLICT, "Conflict", e.to_string())
            }
            StoreError::NotConnected => Self::service_unavailable("store"),
            StoreError::Backend(_) => Self::internal(e.to_string()),
        }
    }
}

impl From<WaitlistError> for ApiError {
    fn from(e: WaitlistError) -> Self {
        match e {
            WaitlistError::NotFound(uuid) => Self::not_found(format!("ticket {uuid} not found")),
            WaitlistError::Store(e) => e.into(),
            WaitlistError::BadRecord { .. } => Self::internal(e.to_string()),
        }
    }
}

impl From<TaskError> for ApiError {
    fn from(e: TaskError) -> Self {
        match e {
            TaskError::NotFound(taskid) => Self::not_found(format!("task {taskid} not found")),
            TaskError::Store(e) => e.into(),
            TaskError::Bus(e) => e.into(),
            TaskError::BadRecord { .. } => Self::internal(e.to_string()),
        }
    }
}

impl From<BusError> for ApiError {
    fn from(e: BusError) -> Self {
        match e {
            BusError::NotConnected => Self::service_unavailable("bus"),
            _ => Self::internal(e.to_string()),
        }
    }
}

impl From<UrError> for ApiError {
    fn from(e: UrError) -> Self {
        match e {
            UrError::CommandTimeout { .. } => {
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, "CommandTimeout", e.to_string())
            }
            UrError::Bus(e) => e.into(),
            UrError::BadReply(_) | UrError::Closed => Self::internal(e.to_string()),
        }
    }
}

impl From<HeartbeatError> for ApiError {
    fn from(e: HeartbeatError) -> Self {
        match e {
            HeartbeatError::BadPayload(_) => {
                Self::new(StatusCode::CONFLICT, "InvalidArgument", e.to_string())
            }
            HeartbeatError::Store(e) => e.into(),
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(e: WorkflowError) -> Self {
        match e {
            WorkflowError::NotConnected => Self::service_unavailable("workflow"),
            _ => Self::internal(e.to_string()),
        }
    }
}

impl From<PlanError> for ApiError {
    fn from(e: PlanError) -> Self {
        match e {
            PlanError::NotFound(uuid) => Self::not_found(format!("reboot plan {uuid} not found")),
            PlanError::ServerBusy(_) | PlanError::BadConcurrency => {
                Self::new(StatusCode::CONFLICT, "InvalidArgument", e.to_string())
            }
            PlanError::NotTerminal(_) | PlanError::Transition(_) => {
                Self::new(StatusCode::CONFLICT, "InvalidState", e.to_string())
            }
            PlanError::Registry(e) => e.into(),
            PlanError::Workflow(e) => e.into(),
            PlanError::Store(e) => e.into(),
            PlanError::BadRecord { .. } => Self::internal(e.to_string()),
        }
    }
}

impl From<AllocatorError> for ApiError {
    fn from(e: AllocatorError) -> Self {
        match e {
            AllocatorError::NoAllocatableServers { steps } => Self {
                status: StatusCode::CONFLICT,
                code: "NoAllocatableServers",
                message: "no allocatable servers found".to_string(),
                errors: Vec::new(),
                steps,
            },
            AllocatorError::VolumeServerNoResources { steps } => Self {
                status: StatusCode::CONFLICT,
                code: "VolumeServerNoResources",
                message: "no volume servers with enough resources".to_string(),
                errors: Vec::new(),
                steps,
            },
            AllocatorError::InvalidParameters { errors } => Self {
                status: StatusCode::CONFLICT,
                code: "InvalidParameters",
                message: "allocation parameters failed validation".to_string(),
                errors,
                steps: Vec::new(),
            },
        }
    }
}
