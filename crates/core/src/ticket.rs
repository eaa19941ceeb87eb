// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Waitlist tickets: per-(server, scope, id) provisioning reservations.

use crate::id::{RequestId, ServerId, TicketId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ticket lifecycle.
///
/// `queued → active → finished` is the happy path; `expired` is reached
/// from queued or active when `expires_at` passes and is terminal; an
/// expired ticket never becomes active.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    #[default]
    Queued,
    Active,
    Expired,
    Finished,
}

crate::simple_display! {
    TicketStatus {
        Queued => "queued",
        Active => "active",
        Expired => "expired",
        Finished => "finished",
    }
}

/// A waitlist ticket serializing concurrent operations on one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub uuid: TicketId,
    pub server_uuid: ServerId,
    /// Resource scope, e.g. `"vm"`
    pub scope: String,
    /// Resource id within the scope
    pub id: String,
    pub action: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: TicketStatus,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub extra: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_id: Option<RequestId>,
}

impl Ticket {
    /// Queued or active: still occupies a place in the FIFO.
    pub fn is_open(&self) -> bool {
        matches!(self.status, TicketStatus::Queued | TicketStatus::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TicketStatus::Expired | TicketStatus::Finished)
    }

    /// The serialization key this ticket contends on.
    pub fn triple(&self) -> (ServerId, &str, &str) {
        (self.server_uuid, &self.scope, &self.id)
    }
}

crate::builder! {
    pub struct TicketBuilder => Ticket {
        into {
            uuid: TicketId = TicketId::from_string("ticket-1"),
            server_uuid: ServerId = ServerId::from_string("00000000-0000-0000-0000-000000000001"),
            scope: String = "vm",
            id: String = "111",
            action: String = "provision",
        }
        set {
            status: TicketStatus = TicketStatus::Queued,
            extra: Value = Value::Null,
            expires_at: DateTime<Utc> = chrono::DateTime::<Utc>::MAX_UTC,
            created_at: DateTime<Utc> = chrono::DateTime::<Utc>::MIN_UTC,
            updated_at: DateTime<Utc> = chrono::DateTime::<Utc>::MIN_UTC,
        }
        option {
            req_id: RequestId = None,
        }
    }
}

#[cfg(test)]
#[path = "ticket_tests.rs"]
mod tests;
