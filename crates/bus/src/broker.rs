// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The TCP broker: the server side of the frame protocol.
//!
//! Accepts connections and applies their frames to a shared [`Router`].
//! Each connection gets a writer task; subscriptions spawn forwarder
//! tasks that turn router deliveries into `Deliver` frames. Exclusive
//! queues die with their connection.
//!
//! Production deployments can point [`crate::TcpBus`] at any broker
//! speaking this protocol; this one backs integration tests and
//! single-box `corrald --embedded-broker` setups.

use crate::bus::QueueOptions;
use crate::frame::Frame;
use crate::router::Router;
use crate::wire::{read_frame, write_frame, ProtocolError};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// A running broker.
pub struct Broker {
    router: Arc<Mutex<Router>>,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
}

impl Broker {
    /// Bind and start accepting. `addr` may use port 0 for an ephemeral
    /// port; read it back with [`Broker::local_addr`].
    pub async fn bind(addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let router = Arc::new(Mutex::new(Router::default()));
        let shutdown = CancellationToken::new();

        let accept_router = Arc::clone(&router);
        let accept_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let conn_seq = AtomicU64::new(1);
            loop {
                tokio::select! {
                    () = accept_shutdown.cancelled() => break,
                    result = listener.accept() => match result {
                        Ok((stream, peer)) => {
                            debug!(%peer, "broker connection");
                            let conn_id = conn_seq.fetch_add(1, Ordering::Relaxed);
                            let router = Arc::clone(&accept_router);
                            let shutdown = accept_shutdown.clone();
                            tokio::spawn(async move {
                                handle_connection(stream, conn_id, router, shutdown).await;
                            });
                        }
                        Err(e) => error!(error = %e, "broker accept error"),
                    }
                }
            }
        });

        Ok(Self { router, local_addr, shutdown })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and tear down connection tasks.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Queues currently known to the router (diagnostics).
    pub fn queue_count(&self) -> usize {
        self.router.lock().queue_count()
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_connection(
    stream: TcpStream,
    conn_id: u64,
    router: Arc<Mutex<Router>>,
    shutdown: CancellationToken,
) {
    let (mut reader, mut writer) = stream.into_split();

    // All outbound frames for this connection funnel through one writer task.
    let (out_tx, mut out_rx) = mpsc::channel::<Frame>(crate::router::SUBSCRIBER_DEPTH);
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if let Err(e) = write_frame(&mut writer, &frame).await {
                debug!(error = %e, "broker writer stopped");
                break;
            }
        }
    });

    loop {
        let frame = tokio::select! {
            () = shutdown.cancelled() => break,
            frame = read_frame(&mut reader) => frame,
        };

        match frame {
            Ok(Frame::Publish { routing_key, payload, .. }) => {
                router.lock().publish(&routing_key, payload);
            }
            Ok(Frame::Declare { queue, exclusive, auto_delete }) => {
                router.lock().declare(
                    &queue,
                    QueueOptions { exclusive, auto_delete },
                    Some(conn_id),
                );
            }
            Ok(Frame::Bind { queue, pattern }) => {
                if let Err(e) = router.lock().bind(&queue, &pattern) {
                    debug!(error = %e, %queue, "bind to undeclared queue");
                }
            }
            Ok(Frame::Subscribe { queue }) => {
                let sub = router.lock().subscribe(&queue);
                match sub {
                    Ok(mut rx) => {
                        let out = out_tx.clone();
                        let queue_name = queue.clone();
                        tokio::spawn(async move {
                            while let Some(delivery) = rx.recv().await {
                                let frame = Frame::Deliver {
                                    queue: queue_name.clone(),
                                    routing_key: delivery.routing_key,
                                    payload: delivery.payload,
                                };
                                if out.send(frame).await.is_err() {
                                    break;
                                }
                            }
                        });
                    }
                    Err(e) => debug!(error = %e, %queue, "subscribe to undeclared queue"),
                }
            }
            Ok(Frame::Unsubscribe { queue }) => {
                router.lock().unsubscribe(&queue);
            }
            Ok(Frame::Delete { queue }) => {
                router.lock().delete(&queue);
            }
            Ok(Frame::Deliver { .. }) => {
                debug!("client sent deliver frame, ignoring");
            }
            Err(ProtocolError::ConnectionClosed) => break,
            Err(e) => {
                debug!(error = %e, "broker read error");
                break;
            }
        }
    }

    router.lock().drop_owner(conn_id);
    writer_task.abort();
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
