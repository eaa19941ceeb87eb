// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the external workflow engine.
//!
//! Contract: `POST /jobs {name, params}` → `{uuid}`; `GET /jobs/:uuid`
//! reports `execution` which ends in `succeeded` / `failed` /
//! `canceled`. The adapter polls; the engine exposes no event stream
//! to us here.

use async_trait::async_trait;
use corral_engine::{JobOutcome, WorkflowAdapter, WorkflowError};
use corral_core::JobId;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const POLL_PERIOD: Duration = Duration::from_secs(2);
const HEALTH_PERIOD: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct CreatedJob {
    uuid: String,
}

#[derive(Deserialize)]
struct JobStatus {
    execution: String,
}

/// A no-op adapter for deployments without a workflow engine; every
/// dependent request short-circuits with 503.
#[derive(Clone, Copy, Debug, Default)]
pub struct DisconnectedWorkflow;

#[async_trait]
impl WorkflowAdapter for DisconnectedWorkflow {
    async fn create_job(&self, _workflow: &str, _params: Value) -> Result<JobId, WorkflowError> {
        Err(WorkflowError::NotConnected)
    }

    async fn watch(&self, _job: JobId) -> Result<JobOutcome, WorkflowError> {
        Err(WorkflowError::NotConnected)
    }

    fn is_connected(&self) -> bool {
        false
    }
}

/// The real client.
#[derive(Clone)]
pub struct HttpWorkflowAdapter {
    client: reqwest::Client,
    base_url: String,
    connected: Arc<AtomicBool>,
}

impl HttpWorkflowAdapter {
    /// Build the client and start its health loop.
    pub fn new(base_url: impl Into<String>) -> Self {
        let adapter = Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            connected: Arc::new(AtomicBool::new(false)),
        };

        let health = adapter.clone();
        tokio::spawn(async move {
            loop {
                let url = format!("{}/ping", health.base_url);
                let up = matches!(health.client.get(&url).send().await, Ok(r) if r.status().is_success());
                let was = health.connected.swap(up, Ordering::SeqCst);
                if was != up {
                    if up {
                        debug!(url, "workflow engine reachable");
                    } else {
                        warn!(url, "workflow engine unreachable");
                    }
                }
                tokio::time::sleep(HEALTH_PERIOD).await;
            }
        });

        adapter
    }
}

#[async_trait]
impl WorkflowAdapter for HttpWorkflowAdapter {
    async fn create_job(&self, workflow: &str, params: Value) -> Result<JobId, WorkflowError> {
        let url = format!("{}/jobs", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "name": workflow, "params": params }))
            .send()
            .await
            .map_err(|e| WorkflowError::CreateFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(WorkflowError::CreateFailed(format!(
                "workflow engine returned {}",
                response.status()
            )));
        }
        let created: CreatedJob =
            response.json().await.map_err(|e| WorkflowError::CreateFailed(e.to_string()))?;
        Ok(JobId::from_string(created.uuid))
    }

    async fn watch(&self, job: JobId) -> Result<JobOutcome, WorkflowError> {
        let url = format!("{}/jobs/{}", self.base_url, job);
        loop {
            match self.client.get(&url).send().await {
                Ok(response) if response.status().is_success() => {
                    let status: JobStatus = response
                        .json()
                        .await
                        .map_err(|e| WorkflowError::CreateFailed(e.to_string()))?;
                    match status.execution.as_str() {
                        "succeeded" => return Ok(JobOutcome::Succeeded),
                        "failed" | "canceled" => return Ok(JobOutcome::Failed),
                        _ => {}
                    }
                }
                Ok(response) if response.status().as_u16() == 404 => {
                    return Err(WorkflowError::UnknownJob(job));
                }
                // Transient errors: keep polling; the job is still out
                // there and its terminal state will reappear.
                Ok(_) | Err(_) => {}
            }
            tokio::time::sleep(POLL_PERIOD).await;
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
