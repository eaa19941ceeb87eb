// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup, background tasks, shutdown.

use crate::app::AppState;
use crate::env;
use crate::workflow_http::{DisconnectedWorkflow, HttpWorkflowAdapter};
use corral_allocator::Allocator;
use corral_bus::{Broker, Bus, QueueOptions, TcpBus, Ur};
use corral_core::{ServerId, SystemClock};
use corral_engine::{
    Heartbeater, RebootOrchestrator, RegistryConfig, ServerRegistry, TaskDispatcher, Waitlist,
    WorkflowAdapter,
};
use corral_store::{MemoryStore, ObjectStore, Snapshot};
use fs2::FileExt;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Identifies this control plane in task-event routing keys.
const CLIENT_ID: &str = "cnapi";

/// Errors during daemon startup/shutdown
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot determine state directory (HOME unset)")]
    NoStateDir,

    #[error("another corrald already holds {0}")]
    AlreadyRunning(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Snapshot(#[from] corral_store::SnapshotError),

    #[error("startup failed: {0}")]
    Startup(String),
}

/// Daemon configuration, resolved from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub state_dir: PathBuf,
    pub http_addr: String,
    pub bus_addr: String,
    pub embedded_broker: bool,
    pub workflow_url: Option<String>,
    pub datacenter: String,
    pub rabbitmq: String,
    pub rabbitmq_dns: String,
    pub checkpoint_period: Duration,
}

impl Config {
    pub fn load() -> Result<Self, LifecycleError> {
        Ok(Self {
            state_dir: env::state_dir()?,
            http_addr: env::http_addr(),
            bus_addr: env::bus_addr(),
            embedded_broker: env::embedded_broker(),
            workflow_url: env::workflow_url(),
            datacenter: env::datacenter(),
            rabbitmq: env::rabbitmq(),
            rabbitmq_dns: env::rabbitmq_dns(),
            checkpoint_period: env::checkpoint_period(),
        })
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("corrald.pid")
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir.join("store.snapshot")
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join("corrald.log")
    }
}

/// A running daemon: shared state plus the handles shutdown needs.
pub struct Daemon {
    pub state: AppState,
    pub cancel: CancellationToken,
    pub config: Config,
    // NOTE(lifetime): held to maintain the exclusive pidfile lock
    #[allow(dead_code)]
    lock_file: File,
    store: MemoryStore,
    broker: Option<Broker>,
    bus_client: TcpBus,
}

/// Bring the control plane up: lock, restore, connect, spawn.
pub async fn startup(config: Config) -> Result<Daemon, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    let lock_file = acquire_pidfile(&config)?;

    // Restore the store from the last snapshot, if any.
    let snapshot_path = config.snapshot_path();
    let store = if snapshot_path.exists() {
        let restored = Snapshot::load(&snapshot_path)?.restore()?;
        info!(path = %snapshot_path.display(), "store restored from snapshot");
        restored
    } else {
        MemoryStore::new()
    };
    let store_dyn: Arc<dyn ObjectStore> = Arc::new(store.clone());

    // Embedded broker for single-box deployments; otherwise we dial
    // whatever broker the fleet runs.
    let broker = if config.embedded_broker {
        let broker = Broker::bind(&config.bus_addr)
            .await
            .map_err(|e| LifecycleError::Startup(format!("broker bind: {e}")))?;
        info!(addr = %broker.local_addr(), "embedded broker listening");
        Some(broker)
    } else {
        None
    };
    let bus_client = TcpBus::connect(&config.bus_addr);
    let bus: Arc<dyn Bus> = Arc::new(bus_client.clone());

    let clock = SystemClock;
    let registry = Arc::new(ServerRegistry::new(
        Arc::clone(&store_dyn),
        clock.clone(),
        RegistryConfig {
            datacenter: config.datacenter.clone(),
            rabbitmq: config.rabbitmq.clone(),
            rabbitmq_dns: config.rabbitmq_dns.clone(),
        },
    ));
    registry
        .ensure_default()
        .await
        .map_err(|e| LifecycleError::Startup(format!("default record: {e}")))?;

    let heartbeat = Arc::new(Heartbeater::new(Arc::clone(&store_dyn), clock.clone()));
    let waitlist = Arc::new(Waitlist::new(Arc::clone(&store_dyn), clock.clone()));
    let tasks = Arc::new(TaskDispatcher::new(
        Arc::clone(&store_dyn),
        Arc::clone(&bus),
        clock.clone(),
        CLIENT_ID,
    ));

    let workflow: Arc<dyn WorkflowAdapter> = match &config.workflow_url {
        Some(url) => Arc::new(HttpWorkflowAdapter::new(url.clone())),
        None => {
            warn!("no workflow engine configured; reboots and provisions will 503");
            Arc::new(DisconnectedWorkflow)
        }
    };

    let orchestrator = Arc::new(RebootOrchestrator::new(
        Arc::clone(&store_dyn),
        Arc::clone(&registry),
        Arc::clone(&workflow),
        clock.clone(),
    ));

    let state = AppState {
        registry: Arc::clone(&registry),
        heartbeat: Arc::clone(&heartbeat),
        waitlist: Arc::clone(&waitlist),
        tasks: Arc::clone(&tasks),
        orchestrator: Arc::clone(&orchestrator),
        allocator: Arc::new(Allocator::default()),
        ur: Ur::new(Arc::clone(&bus)),
        bus: Arc::clone(&bus),
        store: store_dyn,
        workflow,
    };

    let cancel = CancellationToken::new();
    spawn_background(&state, &store, &config, &cancel);

    info!(http = %config.http_addr, bus = %config.bus_addr, "corral control plane up");
    Ok(Daemon { state, cancel, config, lock_file, store, broker, bus_client })
}

fn acquire_pidfile(config: &Config) -> Result<File, LifecycleError> {
    let path = config.lock_path();
    let mut file = File::options().create(true).truncate(false).write(true).open(&path)?;
    if file.try_lock_exclusive().is_err() {
        return Err(LifecycleError::AlreadyRunning(path));
    }
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

/// Spawn the long-lived loops: director, reconciler, orchestrator,
/// bus listeners, checkpointer.
fn spawn_background(
    state: &AppState,
    store: &MemoryStore,
    config: &Config,
    cancel: &CancellationToken,
) {
    {
        let heartbeat = Arc::clone(&state.heartbeat);
        let cancel = cancel.clone();
        tokio::spawn(async move { heartbeat.run(cancel).await });
    }
    {
        let waitlist = Arc::clone(&state.waitlist);
        let cancel = cancel.clone();
        tokio::spawn(async move { waitlist.run(cancel).await });
    }
    {
        let orchestrator = Arc::clone(&state.orchestrator);
        let cancel = cancel.clone();
        tokio::spawn(async move { orchestrator.run(cancel).await });
    }
    {
        let tasks = Arc::clone(&state.tasks);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tasks.run_event_listener(cancel).await {
                error!(error = %e, "task event listener exited");
            }
        });
    }

    // Sysinfo announcements from booting CNs.
    {
        let ur = state.ur.clone();
        let registry = Arc::clone(&state.registry);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut rx = match ur.subscribe_sysinfo().await {
                Ok(rx) => rx,
                Err(e) => {
                    error!(error = %e, "cannot subscribe to sysinfo announcements");
                    return;
                }
            };
            loop {
                let msg = tokio::select! {
                    () = cancel.cancelled() => return,
                    msg = rx.recv() => match msg { Some(m) => m, None => return },
                };
                if let Err(e) = registry.upsert_from_sysinfo(msg.sysinfo).await {
                    warn!(server = %msg.server_uuid, error = %e, "sysinfo ingest failed");
                }
            }
        });
    }

    // Heartbeats.
    {
        let bus = Arc::clone(&state.bus);
        let heartbeat = Arc::clone(&state.heartbeat);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let queue = "corral.heartbeats";
            let ready = async {
                bus.declare_queue(queue, QueueOptions::default()).await?;
                bus.bind(queue, "heartbeat.#").await?;
                bus.subscribe(queue).await
            };
            let mut rx = match ready.await {
                Ok(rx) => rx,
                Err(e) => {
                    error!(error = %e, "cannot subscribe to heartbeats");
                    return;
                }
            };
            loop {
                let delivery = tokio::select! {
                    () = cancel.cancelled() => return,
                    d = rx.recv() => match d { Some(d) => d, None => return },
                };
                let Some(uuid) = corral_bus::topic::segment(&delivery.routing_key, 1) else {
                    continue;
                };
                let uuid = ServerId::from_string(uuid);
                if let Err(e) = heartbeat.ingest(uuid, &delivery.payload) {
                    warn!(server = %uuid, error = %e, "heartbeat ingest failed");
                }
            }
        });
    }

    // Store checkpointer.
    {
        let store = store.clone();
        let path = config.snapshot_path();
        let period = config.checkpoint_period;
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = cancel.cancelled() => return,
                    () = tokio::time::sleep(period) => {}
                }
                if let Err(e) = Snapshot::capture(&store).save(&path) {
                    warn!(error = %e, "store checkpoint failed");
                }
            }
        });
    }
}

impl Daemon {
    /// Graceful shutdown: stop loops, drop the bus, take a final
    /// snapshot.
    pub async fn shutdown(self) -> Result<(), LifecycleError> {
        info!("shutting down");
        self.cancel.cancel();
        self.bus_client.shutdown();
        if let Some(broker) = &self.broker {
            broker.shutdown();
        }
        Snapshot::capture(&self.store).save(&self.config.snapshot_path())?;
        Ok(())
    }
}
