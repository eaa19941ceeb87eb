// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-server waitlist: a strict FIFO of tickets per
//! (server, scope, id) triple.
//!
//! At most one ticket per triple is active at any instant; tickets
//! acquire active strictly in creation order; expired tickets never
//! revive. The director task owns expiry and is the only sweeper: one
//! instance per deployment (multi-node setups gate it behind external
//! leader election).

use corral_core::{Clock, RequestId, ServerId, Ticket, TicketId, TicketStatus};
use corral_store::{
    buckets, with_etag_retry, Filter, FindOptions, Modify, ObjectStore, StoreError,
    DEFAULT_ETAG_ATTEMPTS,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often the director sweeps for expired tickets.
pub const EXPIRY_PERIOD: Duration = Duration::from_secs(1);

/// Errors from waitlist operations
#[derive(Debug, Error)]
pub enum WaitlistError {
    #[error("ticket {0} not found")]
    NotFound(TicketId),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("malformed ticket record {uuid}: {message}")]
    BadRecord { uuid: String, message: String },
}

/// Parameters for a new ticket.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub server_uuid: ServerId,
    pub scope: String,
    pub id: String,
    pub action: String,
    pub expires_at: DateTime<Utc>,
    pub extra: Value,
    pub req_id: Option<RequestId>,
}

/// Outcome of a `wait`: the ticket's state, and whether we gave up
/// before it activated. A timed-out wait is not an error; the caller
/// is told the ticket is still queued.
#[derive(Debug, Clone)]
pub struct TicketWait {
    pub ticket: Ticket,
    pub timed_out: bool,
}

/// The waitlist over the object store.
#[derive(Clone)]
pub struct Waitlist<C: Clock> {
    clock: C,
    store: Arc<dyn ObjectStore>,
    waiters: Arc<Mutex<HashMap<TicketId, Vec<oneshot::Sender<Ticket>>>>>,
}

fn parse_ticket(key: &str, value: &Value) -> Result<Ticket, WaitlistError> {
    serde_json::from_value(value.clone())
        .map_err(|e| WaitlistError::BadRecord { uuid: key.to_string(), message: e.to_string() })
}

fn to_value(ticket: &Ticket) -> Result<Value, StoreError> {
    serde_json::to_value(ticket).map_err(|e| StoreError::Backend(e.to_string()))
}

impl<C: Clock> Waitlist<C> {
    pub fn new(store: Arc<dyn ObjectStore>, clock: C) -> Self {
        Self { clock, store, waiters: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Create a ticket; it becomes active immediately if nothing else
    /// holds its triple. Returns the ticket plus the current queue for
    /// the same server and scope.
    pub async fn create_ticket(
        &self,
        new: NewTicket,
    ) -> Result<(Ticket, Vec<Ticket>), WaitlistError> {
        let now = self.clock.now_utc();
        let ticket = Ticket {
            uuid: TicketId::new(),
            server_uuid: new.server_uuid,
            scope: new.scope,
            id: new.id,
            action: new.action,
            expires_at: new.expires_at,
            created_at: now,
            updated_at: now,
            status: TicketStatus::Queued,
            extra: new.extra,
            req_id: new.req_id,
        };

        self.store
            .put(
                buckets::WAITLIST_TICKETS,
                &ticket.uuid,
                to_value(&ticket)?,
                corral_store::PutOptions::must_not_exist(),
            )
            .await?;
        debug!(ticket = %ticket.uuid, server = %ticket.server_uuid, scope = %ticket.scope,
               id = %ticket.id, "ticket created");

        self.try_promote(&ticket.server_uuid, &ticket.scope, &ticket.id).await?;

        let ticket = self.get(&ticket.uuid).await?;
        let queue = self.server_queue(&ticket.server_uuid, Some(&ticket.scope)).await?;
        Ok((ticket, queue))
    }

    pub async fn get(&self, uuid: &TicketId) -> Result<Ticket, WaitlistError> {
        match self.store.get(buckets::WAITLIST_TICKETS, uuid).await {
            Ok(stored) => parse_ticket(uuid, &stored.value),
            Err(StoreError::NotFound { .. }) => Err(WaitlistError::NotFound(*uuid)),
            Err(e) => Err(e.into()),
        }
    }

    /// Every open ticket in the deployment (allocation reads these for
    /// in-flight reservation accounting).
    pub async fn open_tickets(&self) -> Result<Vec<Ticket>, WaitlistError> {
        let found = self
            .store
            .find(buckets::WAITLIST_TICKETS, &open_status_filter(), FindOptions::default())
            .await?;
        let mut tickets = found
            .iter()
            .map(|obj| parse_ticket(&obj.key, &obj.value))
            .collect::<Result<Vec<_>, _>>()?;
        sort_fifo(&mut tickets);
        Ok(tickets)
    }

    /// Open tickets for a server, FIFO-ordered, optionally one scope.
    pub async fn server_queue(
        &self,
        server_uuid: &ServerId,
        scope: Option<&str>,
    ) -> Result<Vec<Ticket>, WaitlistError> {
        let mut clauses = vec![
            Filter::eq("server_uuid", server_uuid.as_str()),
            open_status_filter(),
        ];
        if let Some(scope) = scope {
            clauses.push(Filter::eq("scope", scope));
        }
        let found = self
            .store
            .find(buckets::WAITLIST_TICKETS, &Filter::and(clauses), FindOptions::default())
            .await?;

        let mut tickets = found
            .iter()
            .map(|obj| parse_ticket(&obj.key, &obj.value))
            .collect::<Result<Vec<_>, _>>()?;
        sort_fifo(&mut tickets);
        Ok(tickets)
    }

    /// Block until the ticket is active or terminal, or until `timeout`.
    pub async fn wait(
        &self,
        uuid: &TicketId,
        timeout: Option<Duration>,
    ) -> Result<TicketWait, WaitlistError> {
        let ticket = self.get(uuid).await?;
        if ticket.status != TicketStatus::Queued {
            return Ok(TicketWait { ticket, timed_out: false });
        }

        let rx = {
            let (tx, rx) = oneshot::channel();
            let mut waiters = self.waiters.lock();
            let entry = waiters.entry(*uuid).or_default();
            entry.retain(|w| !w.is_closed());
            entry.push(tx);
            rx
        };

        // The ticket may have transitioned between the read and the
        // registration; a second read closes the race.
        let ticket = self.get(uuid).await?;
        if ticket.status != TicketStatus::Queued {
            self.notify(&ticket);
            return Ok(TicketWait { ticket, timed_out: false });
        }

        let outcome = match timeout {
            Some(limit) => tokio::time::timeout(limit, rx).await,
            None => Ok(rx.await),
        };

        match outcome {
            Ok(Ok(ticket)) => Ok(TicketWait { ticket, timed_out: false }),
            // Sender dropped without firing; read the current state.
            Ok(Err(_)) => Ok(TicketWait { ticket: self.get(uuid).await?, timed_out: false }),
            Err(_) => {
                // Timed out: dropping rx closed our sender; the next
                // registration or notify purges it.
                Ok(TicketWait { ticket: self.get(uuid).await?, timed_out: true })
            }
        }
    }

    /// Finish a ticket and promote its successor. Releasing a queued
    /// ticket is legal and simply drops it from the queue.
    pub async fn release(&self, uuid: &TicketId) -> Result<Ticket, WaitlistError> {
        let ticket = self
            .transition(uuid, TicketStatus::Finished, |status| {
                matches!(status, TicketStatus::Queued | TicketStatus::Active)
            })
            .await?;
        info!(ticket = %uuid, "ticket released");
        self.notify(&ticket);
        self.try_promote(&ticket.server_uuid, &ticket.scope, &ticket.id).await?;
        Ok(ticket)
    }

    /// Remove a ticket record entirely, promoting its successor.
    pub async fn delete(&self, uuid: &TicketId) -> Result<(), WaitlistError> {
        let ticket = self.get(uuid).await?;
        match self.store.delete(buckets::WAITLIST_TICKETS, uuid).await {
            Ok(()) => {}
            Err(StoreError::NotFound { .. }) => return Err(WaitlistError::NotFound(*uuid)),
            Err(e) => return Err(e.into()),
        }
        self.notify(&ticket);
        self.try_promote(&ticket.server_uuid, &ticket.scope, &ticket.id).await?;
        Ok(())
    }

    /// Drop every ticket for a server (operator escape hatch).
    pub async fn flush_server(&self, server_uuid: &ServerId) -> Result<usize, WaitlistError> {
        let found = self
            .store
            .find(
                buckets::WAITLIST_TICKETS,
                &Filter::eq("server_uuid", server_uuid.as_str()),
                FindOptions::default(),
            )
            .await?;
        let mut removed = 0;
        for obj in &found {
            if self.store.delete(buckets::WAITLIST_TICKETS, &obj.key).await.is_ok() {
                removed += 1;
            }
            if let Ok(ticket) = parse_ticket(&obj.key, &obj.value) {
                self.notify(&ticket);
            }
        }
        Ok(removed)
    }

    /// One director pass: expire overdue tickets and promote successors.
    pub async fn expire_sweep(&self) -> Result<usize, WaitlistError> {
        let now = self.clock.now_utc();
        let found = self
            .store
            .find(buckets::WAITLIST_TICKETS, &open_status_filter(), FindOptions::default())
            .await?;

        let mut expired = 0;
        let mut triples: HashSet<(ServerId, String, String)> = HashSet::new();
        for obj in &found {
            let ticket = parse_ticket(&obj.key, &obj.value)?;
            if ticket.expires_at > now {
                continue;
            }
            let ticket = self
                .transition(&ticket.uuid, TicketStatus::Expired, |status| {
                    matches!(status, TicketStatus::Queued | TicketStatus::Active)
                })
                .await?;
            warn!(ticket = %ticket.uuid, action = %ticket.action, "ticket expired");
            self.notify(&ticket);
            triples.insert((ticket.server_uuid, ticket.scope.clone(), ticket.id.clone()));
            expired += 1;
        }

        for (server, scope, id) in triples {
            self.try_promote(&server, &scope, &id).await?;
        }
        Ok(expired)
    }

    /// The director loop. One instance per deployment.
    pub async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(EXPIRY_PERIOD) => {}
            }
            if let Err(e) = self.expire_sweep().await {
                warn!(error = %e, "waitlist expiry sweep failed");
            }
        }
    }

    /// Activate the FIFO head of a triple if nothing is active there.
    async fn try_promote(
        &self,
        server_uuid: &ServerId,
        scope: &str,
        id: &str,
    ) -> Result<(), WaitlistError> {
        let found = self
            .store
            .find(
                buckets::WAITLIST_TICKETS,
                &Filter::and([
                    Filter::eq("server_uuid", server_uuid.as_str()),
                    Filter::eq("scope", scope),
                    Filter::eq("id", id),
                    open_status_filter(),
                ]),
                FindOptions::default(),
            )
            .await?;

        let mut open = found
            .iter()
            .map(|obj| parse_ticket(&obj.key, &obj.value))
            .collect::<Result<Vec<_>, _>>()?;
        sort_fifo(&mut open);

        if open.iter().any(|t| t.status == TicketStatus::Active) {
            return Ok(());
        }
        let Some(head) = open.first() else {
            return Ok(());
        };

        let activated = self
            .transition(&head.uuid, TicketStatus::Active, |status| {
                status == TicketStatus::Queued
            })
            .await?;
        if activated.status == TicketStatus::Active {
            debug!(ticket = %activated.uuid, "ticket activated");
            self.notify(&activated);
        }
        Ok(())
    }

    /// Guarded status transition through the ETag retry protocol.
    /// Returns the (possibly unchanged) ticket.
    async fn transition(
        &self,
        uuid: &TicketId,
        to: TicketStatus,
        allowed_from: impl Fn(TicketStatus) -> bool,
    ) -> Result<Ticket, WaitlistError> {
        let now = self.clock.now_utc();
        let result = with_etag_retry(
            self.store.as_ref(),
            buckets::WAITLIST_TICKETS,
            uuid,
            DEFAULT_ETAG_ATTEMPTS,
            |current| {
                let value = current.ok_or_else(|| StoreError::NotFound {
                    bucket: buckets::WAITLIST_TICKETS.to_string(),
                    key: uuid.to_string(),
                })?;
                let mut ticket = parse_ticket(uuid, value)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                if !allowed_from(ticket.status) {
                    return Ok(Modify::Skip);
                }
                ticket.status = to;
                ticket.updated_at = now;
                Ok(Modify::Write(to_value(&ticket)?))
            },
        )
        .await;

        match result {
            Ok(_) => self.get(uuid).await,
            Err(StoreError::NotFound { .. }) => Err(WaitlistError::NotFound(*uuid)),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve every waiter registered for this ticket, exactly once
    /// each: senders are drained and consumed.
    fn notify(&self, ticket: &Ticket) {
        let senders = self.waiters.lock().remove(&ticket.uuid).unwrap_or_default();
        for tx in senders {
            let _ = tx.send(ticket.clone());
        }
    }
}

fn open_status_filter() -> Filter {
    Filter::or([
        Filter::eq("status", "queued"),
        Filter::eq("status", "active"),
    ])
}

/// Strict FIFO order: created_at, ties broken by uuid.
fn sort_fifo(tickets: &mut [Ticket]) {
    tickets.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.uuid.as_str().cmp(b.uuid.as_str()))
    });
}

#[cfg(test)]
#[path = "waitlist_tests.rs"]
mod tests;
