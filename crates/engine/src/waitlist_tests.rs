// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use corral_core::FakeClock;
use corral_store::MemoryStore;
use serde_json::json;

const SRV: &str = "00000000-0000-0000-0000-000000000001";

fn waitlist() -> (Waitlist<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    clock.set_epoch_ms(1_000_000_000);
    (Waitlist::new(Arc::new(MemoryStore::new()), clock.clone()), clock)
}

fn new_ticket(id: &str, expires_in_secs: u64, clock: &FakeClock) -> NewTicket {
    NewTicket {
        server_uuid: ServerId::from_string(SRV),
        scope: "vm".to_string(),
        id: id.to_string(),
        action: "provision".to_string(),
        expires_at: corral_core::epoch_ms_to_utc(clock.epoch_ms() + expires_in_secs * 1000),
        extra: json!(null),
        req_id: None,
    }
}

#[tokio::test]
async fn first_ticket_activates_immediately() {
    let (wl, clock) = waitlist();
    let (ticket, queue) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();
    assert_eq!(ticket.status, TicketStatus::Active);
    assert_eq!(queue.len(), 1);
}

#[tokio::test]
async fn fifo_promotion_through_releases() {
    let (wl, clock) = waitlist();
    let (a, _) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();
    clock.advance(Duration::from_millis(10));
    let (b, _) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();
    clock.advance(Duration::from_millis(10));
    let (c, queue) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();

    assert_eq!(a.status, TicketStatus::Active);
    assert_eq!(b.status, TicketStatus::Queued);
    assert_eq!(c.status, TicketStatus::Queued);
    assert_eq!(queue.len(), 3);

    wl.release(&a.uuid).await.unwrap();
    assert_eq!(wl.get(&b.uuid).await.unwrap().status, TicketStatus::Active);
    assert_eq!(wl.get(&c.uuid).await.unwrap().status, TicketStatus::Queued);

    wl.release(&b.uuid).await.unwrap();
    assert_eq!(wl.get(&c.uuid).await.unwrap().status, TicketStatus::Active);
}

#[tokio::test]
async fn distinct_triples_do_not_contend() {
    let (wl, clock) = waitlist();
    let (a, _) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();
    let (b, _) = wl.create_ticket(new_ticket("222", 60, &clock)).await.unwrap();
    assert_eq!(a.status, TicketStatus::Active);
    assert_eq!(b.status, TicketStatus::Active);
}

#[tokio::test]
async fn wait_on_active_ticket_returns_promptly() {
    let (wl, clock) = waitlist();
    let (ticket, _) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();

    let start = std::time::Instant::now();
    let outcome = wl.wait(&ticket.uuid, Some(Duration::from_secs(30))).await.unwrap();
    assert!(!outcome.timed_out);
    assert_eq!(outcome.ticket.status, TicketStatus::Active);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn wait_resolves_on_promotion() {
    let (wl, clock) = waitlist();
    let (a, _) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();
    clock.advance(Duration::from_millis(10));
    let (b, _) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();

    let wl2 = wl.clone();
    let b_uuid = b.uuid;
    let waiter =
        tokio::spawn(async move { wl2.wait(&b_uuid, Some(Duration::from_secs(10))).await });

    // Let the waiter register before releasing.
    tokio::time::sleep(Duration::from_millis(50)).await;
    wl.release(&a.uuid).await.unwrap();

    let outcome = waiter.await.unwrap().unwrap();
    assert!(!outcome.timed_out);
    assert_eq!(outcome.ticket.status, TicketStatus::Active);
}

#[tokio::test]
async fn wait_timeout_reports_still_queued() {
    let (wl, clock) = waitlist();
    let (_a, _) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();
    clock.advance(Duration::from_millis(10));
    let (b, _) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();

    let outcome = wl.wait(&b.uuid, Some(Duration::from_millis(50))).await.unwrap();
    assert!(outcome.timed_out);
    assert_eq!(outcome.ticket.status, TicketStatus::Queued);
}

#[tokio::test]
async fn multiple_waiters_all_notified() {
    let (wl, clock) = waitlist();
    let (a, _) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();
    clock.advance(Duration::from_millis(10));
    let (b, _) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..3 {
        let wl2 = wl.clone();
        let b_uuid = b.uuid;
        handles.push(tokio::spawn(async move {
            wl2.wait(&b_uuid, Some(Duration::from_secs(10))).await
        }));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    wl.release(&a.uuid).await.unwrap();

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.ticket.status, TicketStatus::Active);
    }
}

#[tokio::test]
async fn expiry_promotes_successor_and_never_revives() {
    let (wl, clock) = waitlist();
    let (a, _) = wl.create_ticket(new_ticket("111", 5, &clock)).await.unwrap();
    clock.advance(Duration::from_millis(10));
    let (b, _) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();

    clock.advance(Duration::from_secs(6));
    let expired = wl.expire_sweep().await.unwrap();
    assert_eq!(expired, 1);

    assert_eq!(wl.get(&a.uuid).await.unwrap().status, TicketStatus::Expired);
    assert_eq!(wl.get(&b.uuid).await.unwrap().status, TicketStatus::Active);

    // Releasing the active ticket must not resurrect the expired one.
    wl.release(&b.uuid).await.unwrap();
    assert_eq!(wl.get(&a.uuid).await.unwrap().status, TicketStatus::Expired);
}

#[tokio::test]
async fn queued_tickets_expire_too() {
    let (wl, clock) = waitlist();
    let (a, _) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();
    clock.advance(Duration::from_millis(10));
    let (b, _) = wl.create_ticket(new_ticket("111", 2, &clock)).await.unwrap();

    clock.advance(Duration::from_secs(3));
    wl.expire_sweep().await.unwrap();

    assert_eq!(wl.get(&a.uuid).await.unwrap().status, TicketStatus::Active);
    assert_eq!(wl.get(&b.uuid).await.unwrap().status, TicketStatus::Expired);
}

#[tokio::test]
async fn release_queued_ticket_drops_it_from_the_queue() {
    let (wl, clock) = waitlist();
    let (a, _) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();
    clock.advance(Duration::from_millis(10));
    let (b, _) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();
    clock.advance(Duration::from_millis(10));
    let (c, _) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();

    wl.release(&b.uuid).await.unwrap();
    wl.release(&a.uuid).await.unwrap();
    // C skips straight past the released B.
    assert_eq!(wl.get(&c.uuid).await.unwrap().status, TicketStatus::Active);
}

#[tokio::test]
async fn create_then_release_leaves_queue_empty() {
    let (wl, clock) = waitlist();
    let (a, _) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();
    wl.release(&a.uuid).await.unwrap();
    let queue = wl.server_queue(&ServerId::from_string(SRV), Some("vm")).await.unwrap();
    assert!(queue.is_empty());
}

#[tokio::test]
async fn delete_promotes_successor() {
    let (wl, clock) = waitlist();
    let (a, _) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();
    clock.advance(Duration::from_millis(10));
    let (b, _) = wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();

    wl.delete(&a.uuid).await.unwrap();
    assert!(matches!(wl.get(&a.uuid).await, Err(WaitlistError::NotFound(_))));
    assert_eq!(wl.get(&b.uuid).await.unwrap().status, TicketStatus::Active);
}

#[tokio::test]
async fn flush_server_clears_everything() {
    let (wl, clock) = waitlist();
    wl.create_ticket(new_ticket("111", 60, &clock)).await.unwrap();
    wl.create_ticket(new_ticket("222", 60, &clock)).await.unwrap();

    let removed = wl.flush_server(&ServerId::from_string(SRV)).await.unwrap();
    assert_eq!(removed, 2);
    let queue = wl.server_queue(&ServerId::from_string(SRV), None).await.unwrap();
    assert!(queue.is_empty());
}
