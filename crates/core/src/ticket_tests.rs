// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    queued = { TicketStatus::Queued, true, false },
    active = { TicketStatus::Active, true, false },
    expired = { TicketStatus::Expired, false, true },
    finished = { TicketStatus::Finished, false, true },
)]
fn open_and_terminal(status: TicketStatus, open: bool, terminal: bool) {
    let ticket = Ticket::builder().status(status).build();
    assert_eq!(ticket.is_open(), open);
    assert_eq!(ticket.is_terminal(), terminal);
}

#[test]
fn triple_keys_on_server_scope_id() {
    let ticket = Ticket::builder().scope("vm").id("111").build();
    let (server, scope, id) = ticket.triple();
    assert_eq!(server, ticket.server_uuid);
    assert_eq!(scope, "vm");
    assert_eq!(id, "111");
}

#[test]
fn status_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&TicketStatus::Active).unwrap(), "\"active\"");
    assert_eq!(TicketStatus::Expired.to_string(), "expired");
}
