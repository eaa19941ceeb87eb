// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The rolling-reboot orchestrator.
//!
//! A plan owns one reboot per server. While the plan runs, the
//! orchestrator keeps at most `concurrency` reboots in flight: a
//! reboot occupies a slot from `started_at` until `operational_at`
//! (the server heartbeats again on its boot platform), not merely
//! until the workflow job ends. Selection is headnodes-last, then
//! lowest server uuid.

use crate::registry::{RegistryError, ServerRegistry};
use crate::workflow::{JobOutcome, WorkflowAdapter, WorkflowError};
use corral_core::{
    Clock, JobId, PlanAction, PlanId, PlanState, Reboot, RebootId, RebootPlan, Server, ServerId,
    ServerStatus, TransitionError,
};
use corral_store::{
    buckets, with_etag_retry, Filter, FindOptions, Modify, ObjectStore, StoreError,
    DEFAULT_ETAG_ATTEMPTS,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Workflow that actually reboots a CN.
pub const REBOOT_WORKFLOW: &str = "server_reboot";

/// How often the orchestrator re-evaluates running plans.
pub const ORCHESTRATOR_PERIOD: Duration = Duration::from_secs(1);

/// Errors from reboot-plan operations
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("reboot plan {0} not found")]
    NotFound(PlanId),

    #[error("server {0} is already part of a pending reboot plan")]
    ServerBusy(ServerId),

    #[error("reboot plan concurrency must be at least 1")]
    BadConcurrency,

    #[error("cannot delete a {0} reboot plan")]
    NotTerminal(PlanState),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("malformed record {uuid}: {message}")]
    BadRecord { uuid: String, message: String },
}

/// Parameters for a new plan.
#[derive(Debug, Clone)]
pub struct NewPlan {
    pub servers: Vec<ServerId>,
    pub concurrency: u32,
    pub single_step: bool,
}

/// A plan with its reboots, as the HTTP surface returns it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PlanView {
    #[serde(flatten)]
    pub plan: RebootPlan,
    pub reboots: Vec<Reboot>,
}

/// The orchestrator over store, registry, and workflow engine.
pub struct RebootOrchestrator<C: Clock> {
    clock: C,
    store: Arc<dyn ObjectStore>,
    registry: Arc<ServerRegistry<C>>,
    workflow: Arc<dyn WorkflowAdapter>,
    /// Reboots with a live job-watcher task.
    watched: Arc<Mutex<HashSet<RebootId>>>,
}

fn parse<T: serde::de::DeserializeOwned>(key: &str, value: &Value) -> Result<T, PlanError> {
    serde_json::from_value(value.clone())
        .map_err(|e| PlanError::BadRecord { uuid: key.to_string(), message: e.to_string() })
}

fn to_value<T: serde::Serialize>(record: &T) -> Result<Value, StoreError> {
    serde_json::to_value(record).map_err(|e| StoreError::Backend(e.to_string()))
}

impl<C: Clock> RebootOrchestrator<C> {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registry: Arc<ServerRegistry<C>>,
        workflow: Arc<dyn WorkflowAdapter>,
        clock: C,
    ) -> Self {
        Self { clock, store, registry, workflow, watched: Arc::new(Mutex::new(HashSet::new())) }
    }

    /// Create a plan over a set of servers.
    ///
    /// Every server must exist and must not belong to another
    /// non-terminal plan.
    pub async fn create_plan(&self, new: NewPlan) -> Result<PlanView, PlanError> {
        if new.concurrency == 0 {
            return Err(PlanError::BadConcurrency);
        }

        let busy = self.servers_in_pending_plans().await?;
        let mut reboots = Vec::with_capacity(new.servers.len());
        let now = self.clock.now_utc();
        let plan = RebootPlan {
            uuid: PlanId::new(),
            concurrency: new.concurrency,
            state: PlanState::Created,
            single_step: new.single_step,
            created_at: now,
            updated_at: now,
        };

        for server_uuid in &new.servers {
            let server = self.registry.get(server_uuid).await?;
            if busy.contains(server_uuid) {
                return Err(PlanError::ServerBusy(*server_uuid));
            }
            reboots.push(Reboot {
                uuid: RebootId::new(),
                plan_uuid: plan.uuid,
                server_uuid: *server_uuid,
                server_hostname: server.hostname.clone(),
                job_uuid: None,
                started_at: None,
                finished_at: None,
                operational_at: None,
                canceled_at: None,
                current_platform: server.current_platform.clone(),
                boot_platform: server.boot_platform.clone(),
                headnode: server.headnode,
            });
        }

        self.store
            .put(
                buckets::REBOOT_PLANS,
                &plan.uuid,
                to_value(&plan)?,
                corral_store::PutOptions::must_not_exist(),
            )
            .await?;
        for reboot in &reboots {
            self.store
                .put(
                    buckets::REBOOTS,
                    &reboot.uuid,
                    to_value(reboot)?,
                    corral_store::PutOptions::must_not_exist(),
                )
                .await?;
        }

        info!(plan = %plan.uuid, servers = reboots.len(), concurrency = plan.concurrency,
              "reboot plan created");
        Ok(PlanView { plan, reboots })
    }

    pub async fn get_plan(&self, uuid: &PlanId) -> Result<PlanView, PlanError> {
        let stored = match self.store.get(buckets::REBOOT_PLANS, uuid).await {
            Ok(s) => s,
            Err(StoreError::NotFound { .. }) => return Err(PlanError::NotFound(*uuid)),
            Err(e) => return Err(e.into()),
        };
        let plan: RebootPlan = parse(uuid, &stored.value)?;
        let reboots = self.plan_reboots(uuid).await?;
        Ok(PlanView { plan, reboots })
    }

    pub async fn get_reboot(&self, plan: &PlanId, uuid: &RebootId) -> Result<Reboot, PlanError> {
        let view = self.get_plan(plan).await?;
        view.reboots
            .into_iter()
            .find(|r| &r.uuid == uuid)
            .ok_or(PlanError::NotFound(*plan))
    }

    pub async fn list_plans(&self, include_terminal: bool) -> Result<Vec<PlanView>, PlanError> {
        let found = self
            .store
            .find(
                buckets::REBOOT_PLANS,
                &Filter::True,
                FindOptions::sorted_by("created_at", corral_store::SortOrder::Ascending),
            )
            .await?;
        let mut views = Vec::new();
        for obj in found {
            let plan: RebootPlan = parse(&obj.key, &obj.value)?;
            if !include_terminal && plan.state.is_terminal() {
                continue;
            }
            let reboots = self.plan_reboots(&plan.uuid).await?;
            views.push(PlanView { plan, reboots });
        }
        Ok(views)
    }

    /// Apply a lifecycle action through the guarded transition table.
    pub async fn apply_action(
        &self,
        uuid: &PlanId,
        action: PlanAction,
    ) -> Result<PlanView, PlanError> {
        let mut guard_error: Option<TransitionError> = None;
        let now = self.clock.now_utc();

        let result = with_etag_retry(
            self.store.as_ref(),
            buckets::REBOOT_PLANS,
            uuid,
            DEFAULT_ETAG_ATTEMPTS,
            |current| {
                let value = current.ok_or_else(|| StoreError::NotFound {
                    bucket: buckets::REBOOT_PLANS.to_string(),
                    key: uuid.to_string(),
                })?;
                let mut plan: RebootPlan =
                    parse(uuid, value).map_err(|e| StoreError::Backend(e.to_string()))?;
                match plan.state.apply(action) {
                    Ok(next) => {
                        plan.state = next;
                        plan.updated_at = now;
                        guard_error = None;
                        Ok(Modify::Write(to_value(&plan)?))
                    }
                    Err(e) => {
                        guard_error = Some(e);
                        Ok(Modify::Skip)
                    }
                }
            },
        )
        .await;

        match result {
            Ok(_) => {}
            Err(StoreError::NotFound { .. }) => return Err(PlanError::NotFound(*uuid)),
            Err(e) => return Err(e.into()),
        }
        if let Some(e) = guard_error {
            return Err(e.into());
        }

        info!(plan = %uuid, %action, "reboot plan transition");
        if action == PlanAction::Cancel {
            self.stamp_cancellations(uuid).await?;
        }
        self.get_plan(uuid).await
    }

    /// Delete a plan and its reboots. Terminal plans only.
    pub async fn delete_plan(&self, uuid: &PlanId) -> Result<(), PlanError> {
        let view = self.get_plan(uuid).await?;
        if !view.plan.state.is_terminal() {
            return Err(PlanError::NotTerminal(view.plan.state));
        }
        for reboot in &view.reboots {
            let _ = self.store.delete(buckets::REBOOTS, &reboot.uuid).await;
        }
        self.store.delete(buckets::REBOOT_PLANS, uuid).await?;
        Ok(())
    }

    /// Reboot one server outside any plan: create the workflow job and
    /// flag the server as rebooting.
    pub async fn reboot_server(&self, server_uuid: &ServerId) -> Result<JobId, PlanError> {
        let server = self.registry.get(server_uuid).await?;
        let job = self
            .workflow
            .create_job(
                REBOOT_WORKFLOW,
                json!({
                    "server_uuid": server_uuid,
                    "boot_platform": server.boot_platform,
                }),
            )
            .await?;
        self.registry.mark_rebooting(server_uuid).await?;
        info!(server = %server_uuid, %job, "reboot job created");
        Ok(job)
    }

    /// The orchestrator loop. One instance per deployment.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(ORCHESTRATOR_PERIOD) => {}
            }
            if let Err(e) = self.step().await {
                warn!(error = %e, "reboot orchestrator step failed");
            }
        }
    }

    /// One orchestration pass over every running plan.
    pub async fn step(&self) -> Result<(), PlanError> {
        let plans = self.list_plans(false).await?;
        for view in plans {
            if view.plan.state == PlanState::Running {
                self.step_plan(&view).await?;
            }
        }
        Ok(())
    }

    async fn step_plan(&self, view: &PlanView) -> Result<(), PlanError> {
        let plan = &view.plan;
        let reboots = &view.reboots;

        // Stamp operational_at on reboots whose server came back on the
        // expected platform.
        for reboot in reboots.iter().filter(|r| {
            r.finished_at.is_some() && !r.is_operational() && !r.is_canceled()
        }) {
            if let Ok(server) = self.registry.get(&reboot.server_uuid).await {
                if self.server_is_operational(&server, reboot) {
                    self.stamp_reboot(&reboot.uuid, |r, now| {
                        if r.operational_at.is_none() {
                            r.operational_at = Some(now);
                        }
                    })
                    .await?;
                    info!(plan = %plan.uuid, server = %reboot.server_uuid, "reboot operational");
                }
            }
        }

        // Re-attach watchers for started jobs (also covers restarts).
        for reboot in reboots.iter().filter(|r| {
            r.started_at.is_some() && r.finished_at.is_none() && !r.is_canceled()
        }) {
            if let Some(job) = reboot.job_uuid {
                self.spawn_watcher(reboot.uuid, job);
            }
        }

        // Refresh our view before counting slots.
        let reboots = self.plan_reboots(&plan.uuid).await?;

        if reboots.iter().all(|r| r.is_operational() || r.is_canceled()) {
            self.apply_action(&plan.uuid, PlanAction::Finish).await?;
            return Ok(());
        }

        // Single-step: one reboot per running episode. Reboots started
        // since the last transition (Run/Continue stamps updated_at)
        // belong to this episode; once one completes, stop and wait for
        // the operator to continue.
        if plan.single_step {
            let episode: Vec<&Reboot> = reboots
                .iter()
                .filter(|r| r.started_at.map(|t| t >= plan.updated_at).unwrap_or(false))
                .collect();
            if episode.iter().any(|r| r.is_operational()) {
                self.apply_action(&plan.uuid, PlanAction::Stop).await?;
                return Ok(());
            }
            if !episode.is_empty() {
                return Ok(());
            }
        }

        let mut in_flight = reboots.iter().filter(|r| r.holds_slot()).count() as u32;
        let budget = if plan.single_step { 1 } else { plan.concurrency };

        // Start pending reboots, headnodes last, lowest uuid first.
        let mut pending: Vec<&Reboot> = reboots.iter().filter(|r| r.is_pending()).collect();
        pending.sort_by_key(|r| (r.headnode, r.server_uuid.as_str().to_string()));

        for reboot in pending {
            if in_flight >= budget {
                break;
            }
            self.start_reboot(plan, reboot).await?;
            in_flight += 1;
        }
        Ok(())
    }

    async fn start_reboot(&self, plan: &RebootPlan, reboot: &Reboot) -> Result<(), PlanError> {
        let job = self
            .workflow
            .create_job(
                REBOOT_WORKFLOW,
                json!({
                    "server_uuid": reboot.server_uuid,
                    "plan_uuid": plan.uuid,
                    "reboot_uuid": reboot.uuid,
                    "boot_platform": reboot.boot_platform,
                }),
            )
            .await?;

        self.stamp_reboot(&reboot.uuid, |r, now| {
            if r.started_at.is_none() {
                r.started_at = Some(now);
                r.job_uuid = Some(job);
            }
        })
        .await?;
        let _ = self.registry.mark_rebooting(&reboot.server_uuid).await;
        self.spawn_watcher(reboot.uuid, job);

        info!(plan = %plan.uuid, server = %reboot.server_uuid, %job, "reboot started");
        Ok(())
    }

    /// Watch a workflow job; stamp finished_at on its terminal event.
    fn spawn_watcher(&self, reboot_uuid: RebootId, job: JobId) {
        {
            let mut watched = self.watched.lock();
            if !watched.insert(reboot_uuid) {
                return;
            }
        }

        let workflow = Arc::clone(&self.workflow);
        let store = Arc::clone(&self.store);
        let clock = self.clock.clone();
        let watched = Arc::clone(&self.watched);
        tokio::spawn(async move {
            let outcome = workflow.watch(job).await;
            let now = clock.now_utc();
            let result = with_etag_retry(
                store.as_ref(),
                buckets::REBOOTS,
                &reboot_uuid,
                DEFAULT_ETAG_ATTEMPTS,
                |current| {
                    let Some(value) = current else {
                        return Ok(Modify::Skip);
                    };
                    let mut reboot: Reboot = serde_json::from_value(value.clone())
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                    if reboot.finished_at.is_none() {
                        reboot.finished_at = Some(now);
                        if matches!(outcome, Ok(JobOutcome::Failed) | Err(_)) {
                            // A dead job never becomes operational.
                            reboot.canceled_at = Some(now);
                        }
                    }
                    to_value(&reboot).map(Modify::Write)
                },
            )
            .await;
            if let Err(e) = result {
                warn!(reboot = %reboot_uuid, error = %e, "failed to stamp reboot job outcome");
            }
            debug!(reboot = %reboot_uuid, %job, "reboot job terminal");
            watched.lock().remove(&reboot_uuid);
        });
    }

    fn server_is_operational(&self, server: &Server, reboot: &Reboot) -> bool {
        server.status_at(self.clock.epoch_ms()) == ServerStatus::Running
            && server.current_platform == reboot.boot_platform
    }

    async fn stamp_cancellations(&self, plan: &PlanId) -> Result<(), PlanError> {
        let reboots = self.plan_reboots(plan).await?;
        for reboot in reboots.iter().filter(|r| !r.is_operational() && !r.is_canceled()) {
            self.stamp_reboot(&reboot.uuid, |r, now| {
                if r.operational_at.is_none() && r.canceled_at.is_none() {
                    r.canceled_at = Some(now);
                }
            })
            .await?;
        }
        Ok(())
    }

    async fn stamp_reboot(
        &self,
        uuid: &RebootId,
        mut apply: impl FnMut(&mut Reboot, chrono::DateTime<chrono::Utc>),
    ) -> Result<(), PlanError> {
        let now = self.clock.now_utc();
        with_etag_retry(
            self.store.as_ref(),
            buckets::REBOOTS,
            uuid,
            DEFAULT_ETAG_ATTEMPTS,
            |current| {
                let value = current.ok_or_else(|| StoreError::NotFound {
                    bucket: buckets::REBOOTS.to_string(),
                    key: uuid.to_string(),
                })?;
                let mut reboot: Reboot =
                    parse(uuid, value).map_err(|e| StoreError::Backend(e.to_string()))?;
                apply(&mut reboot, now);
                Ok(Modify::Write(to_value(&reboot)?))
            },
        )
        .await?;
        Ok(())
    }

    async fn plan_reboots(&self, plan: &PlanId) -> Result<Vec<Reboot>, PlanError> {
        let found = self
            .store
            .find(
                buckets::REBOOTS,
                &Filter::eq("plan_uuid", plan.as_str()),
                FindOptions::default(),
            )
            .await?;
        let mut reboots = found
            .iter()
            .map(|obj| parse::<Reboot>(&obj.key, &obj.value))
            .collect::<Result<Vec<_>, _>>()?;
        reboots.sort_by_key(|r| (r.headnode, r.server_uuid.as_str().to_string()));
        Ok(reboots)
    }

    /// Server uuids locked by non-terminal plans (used by plan creation
    /// and by allocation validation).
    pub async fn servers_in_pending_plans(&self) -> Result<HashSet<ServerId>, PlanError> {
        let plans = self.list_plans(false).await?;
        let mut busy = HashSet::new();
        for view in plans {
            for reboot in view.reboots {
                busy.insert(reboot.server_uuid);
            }
        }
        Ok(busy)
    }
}

#[cfg(test)]
#[path = "reboot_tests.rs"]
mod tests;
