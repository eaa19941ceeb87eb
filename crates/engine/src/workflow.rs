// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The seam to the external workflow engine.
//!
//! The control plane never executes provisioning or reboots itself; it
//! creates jobs and watches their terminal events.

use async_trait::async_trait;
use corral_core::JobId;
use serde_json::Value;
use thiserror::Error;

/// Errors from workflow operations
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("workflow engine is not connected")]
    NotConnected,

    #[error("job creation failed: {0}")]
    CreateFailed(String),

    #[error("job {0} unknown to the workflow engine")]
    UnknownJob(JobId),
}

/// Terminal outcome of a workflow job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed,
}

/// Adapter for creating and watching workflow jobs.
#[async_trait]
pub trait WorkflowAdapter: Send + Sync + 'static {
    /// Create a job and return its uuid.
    async fn create_job(&self, workflow: &str, params: Value) -> Result<JobId, WorkflowError>;

    /// Block until the job's terminal event.
    async fn watch(&self, job: JobId) -> Result<JobOutcome, WorkflowError>;

    /// Liveness signal for the `connected` HTTP precondition.
    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{JobOutcome, WorkflowAdapter, WorkflowError};
    use async_trait::async_trait;
    use corral_core::JobId;
    use parking_lot::Mutex;
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::watch;

    /// A recorded job creation.
    #[derive(Debug, Clone)]
    pub struct CreatedJob {
        pub uuid: JobId,
        pub workflow: String,
        pub params: Value,
    }

    struct FakeState {
        created: Vec<CreatedJob>,
        outcomes: HashMap<JobId, watch::Sender<Option<JobOutcome>>>,
        auto: Option<JobOutcome>,
        connected: bool,
    }

    /// Fake workflow engine for testing.
    ///
    /// Jobs stay pending until the test calls [`FakeWorkflowAdapter::finish`],
    /// unless `auto_succeed` is set.
    #[derive(Clone)]
    pub struct FakeWorkflowAdapter {
        inner: Arc<Mutex<FakeState>>,
    }

    impl Default for FakeWorkflowAdapter {
        fn default() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeState {
                    created: Vec::new(),
                    outcomes: HashMap::new(),
                    auto: None,
                    connected: true,
                })),
            }
        }
    }

    impl FakeWorkflowAdapter {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every created job completes immediately with `outcome`.
        pub fn auto_complete(outcome: JobOutcome) -> Self {
            let fake = Self::default();
            fake.inner.lock().auto = Some(outcome);
            fake
        }

        /// All jobs created so far.
        pub fn created(&self) -> Vec<CreatedJob> {
            self.inner.lock().created.clone()
        }

        /// Complete a pending job.
        pub fn finish(&self, job: JobId, outcome: JobOutcome) {
            if let Some(tx) = self.inner.lock().outcomes.get(&job) {
                // send_replace also reaches watchers that subscribe later.
                tx.send_replace(Some(outcome));
            }
        }

        pub fn set_connected(&self, connected: bool) {
            self.inner.lock().connected = connected;
        }
    }

    #[async_trait]
    impl WorkflowAdapter for FakeWorkflowAdapter {
        async fn create_job(&self, workflow: &str, params: Value) -> Result<JobId, WorkflowError> {
            let mut state = self.inner.lock();
            if !state.connected {
                return Err(WorkflowError::NotConnected);
            }
            let uuid = JobId::new();
            let (tx, _rx) = watch::channel(state.auto);
            state.outcomes.insert(uuid, tx);
            state.created.push(CreatedJob {
                uuid,
                workflow: workflow.to_string(),
                params,
            });
            Ok(uuid)
        }

        async fn watch(&self, job: JobId) -> Result<JobOutcome, WorkflowError> {
            let mut rx = {
                let state = self.inner.lock();
                let tx = state.outcomes.get(&job).ok_or(WorkflowError::UnknownJob(job))?;
                tx.subscribe()
            };
            loop {
                if let Some(outcome) = *rx.borrow() {
                    return Ok(outcome);
                }
                if rx.changed().await.is_err() {
                    return Err(WorkflowError::UnknownJob(job));
                }
            }
        }

        fn is_connected(&self) -> bool {
            self.inner.lock().connected
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{CreatedJob, FakeWorkflowAdapter};
