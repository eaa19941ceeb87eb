// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! corral-engine: the control-plane brain.
//!
//! - [`registry`]: the authoritative server record (sysinfo ingest,
//!   boot params, admin updates)
//! - [`heartbeat`]: liveness ingest with periodic store reconciliation
//! - [`waitlist`]: per-(server, scope, id) ticket FIFO plus the expiry
//!   director
//! - [`tasks`]: asynchronous CN agent commands tracked as task records
//! - [`reboot`]: the rolling-reboot orchestrator
//! - [`workflow`]: the seam to the external workflow engine

pub mod heartbeat;
pub mod registry;
pub mod reboot;
pub mod tasks;
pub mod waitlist;
pub mod workflow;

pub use heartbeat::{Heartbeater, HeartbeatError};
pub use reboot::{NewPlan, PlanError, PlanView, RebootOrchestrator};
pub use registry::{
    BootParamsPatch, ListServers, RegistryConfig, RegistryError, ServerRegistry, ServerUpdate,
};
pub use tasks::{DispatchOptions, TaskDispatcher, TaskError, TaskWait};
pub use waitlist::{NewTicket, TicketWait, Waitlist, WaitlistError, EXPIRY_PERIOD};
pub use workflow::{JobOutcome, WorkflowAdapter, WorkflowError};

#[cfg(any(test, feature = "test-support"))]
pub use workflow::FakeWorkflowAdapter;
