// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Three tickets contend on one (server, scope, id) triple.

use corral_core::{epoch_ms_to_utc, Clock, FakeClock, ServerId, TicketStatus};
use corral_engine::{NewTicket, Waitlist};
use corral_store::MemoryStore;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const SRV: &str = "00000000-0000-0000-0000-000000000001";

fn ticket(clock: &FakeClock) -> NewTicket {
    NewTicket {
        server_uuid: ServerId::from_string(SRV),
        scope: "vm".to_string(),
        id: "111".to_string(),
        action: "provision".to_string(),
        expires_at: epoch_ms_to_utc(clock.epoch_ms() + 600_000),
        extra: json!(null),
        req_id: None,
    }
}

#[tokio::test]
async fn strict_fifo_through_releases() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(1_000_000_000);
    let waitlist = Waitlist::new(Arc::new(MemoryStore::new()), clock.clone());

    let (a, _) = waitlist.create_ticket(ticket(&clock)).await.unwrap();
    clock.advance(Duration::from_millis(5));
    let (b, _) = waitlist.create_ticket(ticket(&clock)).await.unwrap();
    clock.advance(Duration::from_millis(5));
    let (c, queue) = waitlist.create_ticket(ticket(&clock)).await.unwrap();

    // A active, B and C queued, in order.
    assert_eq!(a.status, TicketStatus::Active);
    assert_eq!(b.status, TicketStatus::Queued);
    assert_eq!(c.status, TicketStatus::Queued);
    let order: Vec<_> = queue.iter().map(|t| t.uuid).collect();
    assert_eq!(order, vec![a.uuid, b.uuid, c.uuid]);

    // Release A → B active, C still queued.
    waitlist.release(&a.uuid).await.unwrap();
    assert_eq!(waitlist.get(&b.uuid).await.unwrap().status, TicketStatus::Active);
    assert_eq!(waitlist.get(&c.uuid).await.unwrap().status, TicketStatus::Queued);

    // Release B → C active.
    waitlist.release(&b.uuid).await.unwrap();
    assert_eq!(waitlist.get(&c.uuid).await.unwrap().status, TicketStatus::Active);
}

#[tokio::test]
async fn wait_on_active_ticket_returns_within_a_second() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(1_000_000_000);
    let waitlist = Waitlist::new(Arc::new(MemoryStore::new()), clock.clone());

    let (a, _) = waitlist.create_ticket(ticket(&clock)).await.unwrap();
    assert_eq!(a.status, TicketStatus::Active);

    let started = std::time::Instant::now();
    let outcome = waitlist.wait(&a.uuid, Some(Duration::from_secs(30))).await.unwrap();
    assert!(!outcome.timed_out);
    assert_eq!(outcome.ticket.status, TicketStatus::Active);
    assert!(started.elapsed() < Duration::from_secs(1));
}
