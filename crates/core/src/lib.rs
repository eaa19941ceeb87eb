// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! corral-core: domain types for the Corral compute-node control plane.
//!
//! Everything the control plane persists or reasons about lives here:
//! the authoritative server record, waitlist tickets, CN agent tasks,
//! reboot plans, and the sysinfo document CNs report at boot.

pub mod macros;

pub mod bootparams;
pub mod clock;
pub mod id;
pub mod plan;
pub mod server;
pub mod sysinfo;
pub mod task;
pub mod ticket;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use bootparams::BootParams;
pub use clock::{epoch_ms_to_utc, iso8601_ms, parse_iso8601_ms, Clock, FakeClock, SystemClock};
pub use id::{short, JobId, PlanId, RebootId, RequestId, ServerId, TaskId, TicketId};
pub use plan::{PlanAction, PlanState, Reboot, RebootPlan, TransitionError};
pub use server::{
    Server, ServerStatus, VmEntry, DEFAULT_RESERVATION_RATIO, DEFAULT_SERVER_UUID,
    HEARTBEAT_LIFETIME_SECONDS, HEARTBEAT_RECONCILIATION_PERIOD_SECONDS,
};
pub use sysinfo::{Sysinfo, SysinfoError};
pub use task::{Task, TaskEvent, TaskStatus};
pub use ticket::{Ticket, TicketStatus};

#[cfg(any(test, feature = "test-support"))]
pub use plan::RebootPlanBuilder;
#[cfg(any(test, feature = "test-support"))]
pub use server::ServerBuilder;
#[cfg(any(test, feature = "test-support"))]
pub use ticket::TicketBuilder;
