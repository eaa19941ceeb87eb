// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent TCP bus client with durable reconnection.
//!
//! The client keeps a desired-state table of every queue, binding, and
//! subscription it has been asked for. Whenever the connection drops it
//! retries with jittered exponential backoff, indefinitely, and replays
//! the whole table on reconnect so consumers never have to re-declare.
//!
//! Publishing while disconnected fails with `NotConnected`; subscribers
//! simply see a delivery gap (the bus is at-least-once, not exactly-once).

use crate::bus::{Bus, BusError, Delivery, QueueOptions};
use crate::frame::Frame;
use crate::router::SUBSCRIBER_DEPTH;
use crate::wire::{read_frame, write_frame};
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Backoff parameters for the reconnect loop.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { initial: Duration::from_millis(100), max: Duration::from_secs(30) }
    }
}

impl ReconnectPolicy {
    /// Next delay: doubled, capped, with ±50% jitter so a fleet of
    /// clients does not reconnect in lockstep.
    fn next_delay(&self, current: Duration) -> (Duration, Duration) {
        let base = (current * 2).min(self.max);
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        (current.mul_f64(jitter), base)
    }
}

#[derive(Default)]
struct DesiredState {
    /// Declaration order is replay order: queues before their bindings.
    queues: Vec<(String, QueueOptions)>,
    bindings: Vec<(String, String)>,
    subscribed: Vec<String>,
    /// Local fan-out: queue → senders feeding `subscribe()` receivers.
    consumers: HashMap<String, Vec<mpsc::Sender<Delivery>>>,
}

impl DesiredState {
    fn forget_queue(&mut self, queue: &str) {
        self.queues.retain(|(name, _)| name != queue);
        self.bindings.retain(|(name, _)| name != queue);
        self.subscribed.retain(|name| name != queue);
        self.consumers.remove(queue);
    }

    /// Frames to replay after (re)connecting.
    fn replay_frames(&self) -> Vec<Frame> {
        let mut frames = Vec::new();
        for (queue, opts) in &self.queues {
            frames.push(Frame::Declare {
                queue: queue.clone(),
                exclusive: opts.exclusive,
                auto_delete: opts.auto_delete,
            });
        }
        for (queue, pattern) in &self.bindings {
            frames.push(Frame::Bind { queue: queue.clone(), pattern: pattern.clone() });
        }
        for queue in &self.subscribed {
            frames.push(Frame::Subscribe { queue: queue.clone() });
        }
        frames
    }
}

struct Shared {
    addr: String,
    policy: ReconnectPolicy,
    connected: AtomicBool,
    desired: Mutex<DesiredState>,
    /// Writer handle for the live connection, if any.
    out: Mutex<Option<mpsc::Sender<Frame>>>,
    shutdown: CancellationToken,
}

/// A bus client over a framed TCP connection to a broker.
#[derive(Clone)]
pub struct TcpBus {
    shared: Arc<Shared>,
}

impl TcpBus {
    /// Start the connection task. Returns immediately; the first
    /// connection attempt happens in the background.
    pub fn connect(addr: impl Into<String>) -> Self {
        Self::connect_with_policy(addr, ReconnectPolicy::default())
    }

    pub fn connect_with_policy(addr: impl Into<String>, policy: ReconnectPolicy) -> Self {
        let shared = Arc::new(Shared {
            addr: addr.into(),
            policy,
            connected: AtomicBool::new(false),
            desired: Mutex::new(DesiredState::default()),
            out: Mutex::new(None),
            shutdown: CancellationToken::new(),
        });

        let task_shared = Arc::clone(&shared);
        tokio::spawn(async move { run(task_shared).await });

        Self { shared }
    }

    /// Stop reconnecting and drop the connection.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    /// Wait until connected, up to `timeout`.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while !self.is_connected() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    async fn send(&self, frame: Frame) -> Result<(), BusError> {
        let tx = self.shared.out.lock().clone();
        match tx {
            Some(tx) => tx.send(frame).await.map_err(|_| BusError::NotConnected),
            None => Err(BusError::NotConnected),
        }
    }

    /// Best-effort send for state that will be replayed on reconnect.
    async fn send_or_defer(&self, frame: Frame) {
        if self.send(frame).await.is_err() {
            debug!("bus disconnected, deferring frame to reconnect replay");
        }
    }
}

/// The connection loop: dial, replay desired state, pump frames,
/// back off, repeat.
async fn run(shared: Arc<Shared>) {
    let mut delay = shared.policy.initial;

    loop {
        if shared.shutdown.is_cancelled() {
            return;
        }

        match TcpStream::connect(&shared.addr).await {
            Ok(stream) => {
                info!(addr = %shared.addr, "bus connected");
                delay = shared.policy.initial;
                serve_connection(&shared, stream).await;
                shared.connected.store(false, Ordering::SeqCst);
                *shared.out.lock() = None;
                warn!(addr = %shared.addr, "bus disconnected");
            }
            Err(e) => {
                debug!(addr = %shared.addr, error = %e, "bus connect failed");
            }
        }

        let (sleep_for, next) = shared.policy.next_delay(delay);
        delay = next;
        tokio::select! {
            () = shared.shutdown.cancelled() => return,
            () = tokio::time::sleep(sleep_for) => {}
        }
    }
}

async fn serve_connection(shared: &Arc<Shared>, stream: TcpStream) {
    let (mut reader, mut writer) = stream.into_split();

    let (out_tx, mut out_rx) = mpsc::channel::<Frame>(SUBSCRIBER_DEPTH);

    // Replay desired state before exposing the writer, so queues and
    // bindings exist before anything is published on this connection.
    let replay = shared.desired.lock().replay_frames();
    for frame in replay {
        if write_frame(&mut writer, &frame).await.is_err() {
            return;
        }
    }

    *shared.out.lock() = Some(out_tx);
    shared.connected.store(true, Ordering::SeqCst);

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if write_frame(&mut writer, &frame).await.is_err() {
                break;
            }
        }
    });

    loop {
        let frame = tokio::select! {
            () = shared.shutdown.cancelled() => break,
            frame = read_frame(&mut reader) => frame,
        };

        match frame {
            Ok(Frame::Deliver { queue, routing_key, payload }) => {
                let consumers = {
                    let mut desired = shared.desired.lock();
                    if let Some(txs) = desired.consumers.get_mut(&queue) {
                        txs.retain(|tx| !tx.is_closed());
                        txs.clone()
                    } else {
                        Vec::new()
                    }
                };
                for tx in consumers {
                    let delivery =
                        Delivery { routing_key: routing_key.clone(), payload: payload.clone() };
                    if tx.try_send(delivery).is_err() {
                        warn!(%queue, "slow local consumer, dropping delivery");
                    }
                }
            }
            Ok(other) => debug!(?other, "unexpected frame from broker"),
            Err(e) => {
                debug!(error = %e, "bus read error");
                break;
            }
        }
    }

    writer_task.abort();
}

#[async_trait]
impl Bus for TcpBus {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: Value,
    ) -> Result<(), BusError> {
        if !self.is_connected() {
            return Err(BusError::NotConnected);
        }
        self.send(Frame::Publish {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload,
        })
        .await
    }

    async fn declare_queue(&self, name: &str, opts: QueueOptions) -> Result<(), BusError> {
        {
            let mut desired = self.shared.desired.lock();
            desired.queues.retain(|(q, _)| q != name);
            desired.queues.push((name.to_string(), opts));
        }
        self.send_or_defer(Frame::Declare {
            queue: name.to_string(),
            exclusive: opts.exclusive,
            auto_delete: opts.auto_delete,
        })
        .await;
        Ok(())
    }

    async fn bind(&self, queue: &str, pattern: &str) -> Result<(), BusError> {
        {
            let mut desired = self.shared.desired.lock();
            let entry = (queue.to_string(), pattern.to_string());
            if !desired.bindings.contains(&entry) {
                desired.bindings.push(entry);
            }
        }
        self.send_or_defer(Frame::Bind {
            queue: queue.to_string(),
            pattern: pattern.to_string(),
        })
        .await;
        Ok(())
    }

    async fn subscribe(&self, queue: &str) -> Result<mpsc::Receiver<Delivery>, BusError> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_DEPTH);
        let first = {
            let mut desired = self.shared.desired.lock();
            desired.consumers.entry(queue.to_string()).or_default().push(tx);
            if desired.subscribed.iter().any(|q| q == queue) {
                false
            } else {
                desired.subscribed.push(queue.to_string());
                true
            }
        };
        if first {
            self.send_or_defer(Frame::Subscribe { queue: queue.to_string() }).await;
        }
        Ok(rx)
    }

    async fn delete_queue(&self, queue: &str) -> Result<(), BusError> {
        self.shared.desired.lock().forget_queue(queue);
        self.send_or_defer(Frame::Delete { queue: queue.to_string() }).await;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}
