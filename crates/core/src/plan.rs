// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reboot plans: bounded-concurrency rolling reboots across a fleet.

use crate::id::{JobId, PlanId, RebootId, ServerId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Plan lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanState {
    #[default]
    Created,
    Running,
    Stopped,
    Canceled,
    Complete,
}

crate::simple_display! {
    PlanState {
        Created => "created",
        Running => "running",
        Stopped => "stopped",
        Canceled => "canceled",
        Complete => "complete",
    }
}

impl PlanState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PlanState::Canceled | PlanState::Complete)
    }
}

/// Operator/orchestrator actions on a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    Run,
    Continue,
    Stop,
    Cancel,
    Finish,
}

crate::simple_display! {
    PlanAction {
        Run => "run",
        Continue => "continue",
        Stop => "stop",
        Cancel => "cancel",
        Finish => "finish",
    }
}

/// An action was applied in a state that does not permit it.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("cannot {action} a {state} reboot plan")]
pub struct TransitionError {
    pub state: PlanState,
    pub action: PlanAction,
}

impl PlanState {
    /// Guarded transition table:
    /// run from {created, stopped}; continue from {stopped};
    /// stop from {running}; cancel from any non-terminal;
    /// finish from {running}.
    pub fn apply(self, action: PlanAction) -> Result<PlanState, TransitionError> {
        use PlanAction as A;
        use PlanState as S;
        let next = match (self, action) {
            (S::Created | S::Stopped, A::Run) => S::Running,
            (S::Stopped, A::Continue) => S::Running,
            (S::Running, A::Stop) => S::Stopped,
            (S::Created | S::Running | S::Stopped, A::Cancel) => S::Canceled,
            (S::Running, A::Finish) => S::Complete,
            (state, action) => return Err(TransitionError { state, action }),
        };
        Ok(next)
    }
}

/// A rolling-reboot plan over a set of servers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebootPlan {
    pub uuid: PlanId,
    /// Upper bound on simultaneously in-flight reboots, ≥ 1.
    pub concurrency: u32,
    pub state: PlanState,
    /// Stop again after each completed reboot (operator-paced rollout).
    #[serde(default)]
    pub single_step: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One server's reboot within a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reboot {
    pub uuid: RebootId,
    pub plan_uuid: PlanId,
    pub server_uuid: ServerId,
    pub server_hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_uuid: Option<JobId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operational_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canceled_at: Option<DateTime<Utc>>,
    pub current_platform: String,
    pub boot_platform: String,
    #[serde(default)]
    pub headnode: bool,
}

impl Reboot {
    /// A reboot is done once the server came back and heartbeated on the
    /// expected platform.
    pub fn is_operational(&self) -> bool {
        self.operational_at.is_some()
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled_at.is_some()
    }

    /// Started reboots hold a concurrency slot until operational or canceled.
    pub fn holds_slot(&self) -> bool {
        self.started_at.is_some() && !self.is_operational() && !self.is_canceled()
    }

    /// Not yet started, not canceled: eligible for selection.
    pub fn is_pending(&self) -> bool {
        self.started_at.is_none() && !self.is_canceled()
    }
}

crate::builder! {
    pub struct RebootPlanBuilder => RebootPlan {
        into {
            uuid: PlanId = PlanId::from_string("plan-1"),
        }
        set {
            concurrency: u32 = 1,
            state: PlanState = PlanState::Created,
            single_step: bool = false,
            created_at: DateTime<Utc> = chrono::DateTime::<Utc>::MIN_UTC,
            updated_at: DateTime<Utc> = chrono::DateTime::<Utc>::MIN_UTC,
        }
    }
}

#[cfg(test)]
#[path = "plan_tests.rs"]
mod tests;
