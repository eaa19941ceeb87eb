// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The authoritative server registry.
//!
//! Sysinfo ingest is the only path that creates server records; admin
//! updates and boot-param edits mutate them. Every write goes through
//! the store's ETag retry protocol; the registry never holds locks.

use corral_core::{
    epoch_ms_to_utc, BootParams, Clock, Server, ServerId, ServerStatus, Sysinfo, SysinfoError,
    DEFAULT_SERVER_UUID,
};
use corral_store::{
    buckets, with_etag_retry, Filter, FindOptions, Modify, ObjectStore, SortOrder, StoreError,
    DEFAULT_ETAG_ATTEMPTS,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("server {0} not found")]
    NotFound(ServerId),

    #[error("sysinfo UUID {sysinfo_uuid} does not match server {server_uuid}")]
    UuidMismatch { server_uuid: ServerId, sysinfo_uuid: ServerId },

    #[error(transparent)]
    Sysinfo(#[from] SysinfoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("malformed server record {uuid}: {message}")]
    BadRecord { uuid: String, message: String },
}

/// Registry configuration injected into boot params.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Datacenter this control plane owns.
    pub datacenter: String,
    /// `user:pass:host:port` the CN agents should dial.
    pub rabbitmq: String,
    pub rabbitmq_dns: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            datacenter: "dc0".to_string(),
            rabbitmq: "guest:guest:localhost:5672".to_string(),
            rabbitmq_dns: "guest:guest:rabbitmq.local:5672".to_string(),
        }
    }
}

/// Server list filters.
#[derive(Debug, Clone, Default)]
pub struct ListServers {
    pub setup: Option<bool>,
    pub headnode: Option<bool>,
    pub hostname: Option<String>,
    /// Restrict to these uuids (empty = all).
    pub uuids: Vec<ServerId>,
}

/// Admin-owned field updates (`POST /servers/:uuid`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reservation_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_console: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traits: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overprovision_ratios: Option<HashMap<String, f64>>,
    /// `Some(None)` clears a scheduled reboot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_reboot: Option<Option<chrono::DateTime<chrono::Utc>>>,
}

/// Boot-parameter edits. `set` replaces; `update` deep-merges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootParamsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_args: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_flags: Option<HashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_modules: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_console: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
}

/// The registry over the object store.
pub struct ServerRegistry<C: Clock> {
    store: Arc<dyn ObjectStore>,
    clock: C,
    config: RegistryConfig,
}

fn fingerprint(value: &Value) -> String {
    let bytes = serde_json::to_vec(value).unwrap_or_default();
    format!("{:x}", Sha256::digest(&bytes))
}

fn parse_server(uuid: &str, value: &Value) -> Result<Server, RegistryError> {
    serde_json::from_value(value.clone())
        .map_err(|e| RegistryError::BadRecord { uuid: uuid.to_string(), message: e.to_string() })
}

fn to_value(server: &Server) -> Result<Value, StoreError> {
    serde_json::to_value(server).map_err(|e| StoreError::Backend(e.to_string()))
}

impl<C: Clock> ServerRegistry<C> {
    pub fn new(store: Arc<dyn ObjectStore>, clock: C, config: RegistryConfig) -> Self {
        Self { store, clock, config }
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        Arc::clone(&self.store)
    }

    /// Fetch one server record, status recomputed against the clock.
    pub async fn get(&self, uuid: &ServerId) -> Result<Server, RegistryError> {
        let stored = match self.store.get(buckets::SERVERS, uuid).await {
            Ok(s) => s,
            Err(StoreError::NotFound { .. }) => return Err(RegistryError::NotFound(*uuid)),
            Err(e) => return Err(e.into()),
        };
        let mut server = parse_server(uuid, &stored.value)?;
        server.etag = Some(stored.etag);
        if !server.is_default_record() {
            server.status = server.status_at(self.clock.epoch_ms());
        }
        Ok(server)
    }

    /// List server records, excluding the default sentinel.
    pub async fn list(&self, opts: &ListServers) -> Result<Vec<Server>, RegistryError> {
        let mut clauses = vec![Filter::ne("uuid", DEFAULT_SERVER_UUID)];
        if let Some(setup) = opts.setup {
            clauses.push(Filter::eq("setup", setup));
        }
        if let Some(headnode) = opts.headnode {
            clauses.push(Filter::eq("headnode", headnode));
        }
        if let Some(hostname) = &opts.hostname {
            clauses.push(Filter::eq("hostname", hostname.clone()));
        }
        if !opts.uuids.is_empty() {
            clauses.push(Filter::or(
                opts.uuids.iter().map(|u| Filter::eq("uuid", u.as_str())),
            ));
        }

        let found = self
            .store
            .find(
                buckets::SERVERS,
                &Filter::and(clauses),
                FindOptions::sorted_by("hostname", SortOrder::Ascending),
            )
            .await?;

        let now_ms = self.clock.epoch_ms();
        let mut servers = Vec::with_capacity(found.len());
        for obj in found {
            let mut server = parse_server(&obj.key, &obj.value)?;
            server.etag = Some(obj.etag);
            server.status = server.status_at(now_ms);
            servers.push(server);
        }
        Ok(servers)
    }

    /// Create or refresh a server record from a sysinfo document.
    ///
    /// Hardware fields come from sysinfo; administratively-owned fields
    /// survive. A byte-identical repeat is a no-op (no store write).
    pub async fn upsert_from_sysinfo(&self, sysinfo: Sysinfo) -> Result<Server, RegistryError> {
        let uuid = sysinfo.uuid()?;
        let boot_ms = sysinfo.boot_time_secs()? * 1000;
        let incoming_print = fingerprint(sysinfo.as_value());

        // Default record seeds boot params for servers we meet for the
        // first time. Absence is fine (fresh deployment).
        let default = self.get_default().await.ok();

        let datacenter = self.config.datacenter.clone();
        let mut mismatch: Option<RegistryError> = None;

        let written = with_etag_retry(
            self.store.as_ref(),
            buckets::SERVERS,
            &uuid,
            DEFAULT_ETAG_ATTEMPTS,
            |current| {
                let mut server = match current {
                    Some(value) => {
                        let server = parse_server(&uuid, value)
                            .map_err(|e| StoreError::Backend(e.to_string()))?;
                        if server.uuid != uuid {
                            mismatch = Some(RegistryError::UuidMismatch {
                                server_uuid: server.uuid,
                                sysinfo_uuid: uuid,
                            });
                            return Err(StoreError::Backend("uuid mismatch".to_string()));
                        }
                        if fingerprint(server.sysinfo.as_value()) == incoming_print {
                            debug!(%uuid, "sysinfo unchanged, skipping write");
                            return Ok(Modify::Skip);
                        }
                        server
                    }
                    None => materialize(uuid, &sysinfo, default.as_ref(), &datacenter),
                };

                refresh_from_sysinfo(&mut server, &sysinfo, boot_ms);
                Ok(Modify::Write(to_value(&server)?))
            },
        )
        .await;

        match written {
            Ok(_) => {}
            Err(e) => match mismatch.take() {
                Some(mismatch) => return Err(mismatch),
                None => return Err(e.into()),
            },
        }

        info!(%uuid, fingerprint = %corral_core::short(&incoming_print, 12), "sysinfo ingested");
        self.get(&uuid).await
    }

    /// Update administratively-owned fields.
    pub async fn update(
        &self,
        uuid: &ServerId,
        update: &ServerUpdate,
    ) -> Result<Server, RegistryError> {
        self.modify_existing(uuid, |server| {
            if let Some(reserved) = update.reserved {
                server.reserved = reserved;
            }
            if let Some(ratio) = update.reservation_ratio {
                server.reservation_ratio = ratio;
            }
            if let Some(platform) = &update.boot_platform {
                server.boot_platform = platform.clone();
            }
            if let Some(console) = &update.default_console {
                server.default_console = console.clone();
            }
            if let Some(serial) = &update.serial {
                server.serial = serial.clone();
            }
            if let Some(traits) = &update.traits {
                server.traits = traits.clone();
            }
            if let Some(ratios) = &update.overprovision_ratios {
                server.overprovision_ratios = ratios.clone();
            }
            if let Some(next_reboot) = &update.next_reboot {
                server.next_reboot = *next_reboot;
            }
        })
        .await
    }

    /// Remove a server record.
    pub async fn delete(&self, uuid: &ServerId) -> Result<(), RegistryError> {
        match self.store.delete(buckets::SERVERS, uuid).await {
            Ok(()) => Ok(()),
            Err(StoreError::NotFound { .. }) => Err(RegistryError::NotFound(*uuid)),
            Err(e) => Err(e.into()),
        }
    }

    /// Return a server to the unsetup pool. The one legal `setup`
    /// regression.
    pub async fn factory_reset(&self, uuid: &ServerId) -> Result<Server, RegistryError> {
        self.modify_existing(uuid, |server| {
            server.setup = false;
            server.reserved = false;
            server.vms.clear();
        })
        .await
    }

    /// Flag a server as rebooting until its next heartbeat.
    pub async fn mark_rebooting(&self, uuid: &ServerId) -> Result<(), RegistryError> {
        self.modify_existing(uuid, |server| {
            server.status = ServerStatus::Rebooting;
        })
        .await
        .map(|_| ())
    }

    fn default_id() -> ServerId {
        ServerId::from_string(DEFAULT_SERVER_UUID)
    }

    pub async fn get_default(&self) -> Result<Server, RegistryError> {
        self.get(&Self::default_id()).await
    }

    /// Seed the default record if this deployment has none yet.
    pub async fn ensure_default(&self) -> Result<(), RegistryError> {
        match self.get_default().await {
            Ok(_) => Ok(()),
            Err(RegistryError::NotFound(_)) => {
                let mut server = Server::empty(Self::default_id());
                server.reserved = true;
                server
                    .boot_params
                    .insert("console".to_string(), server.default_console.clone());
                let value = serde_json::to_value(&server)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                match self
                    .store
                    .put(
                        buckets::SERVERS,
                        DEFAULT_SERVER_UUID,
                        value,
                        corral_store::PutOptions::must_not_exist(),
                    )
                    .await
                {
                    Ok(_) => {
                        info!("seeded default server record");
                        Ok(())
                    }
                    // Another writer seeded it first.
                    Err(e) if e.is_conflict() => Ok(()),
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Boot parameters a netbooting CN should use: the server's
    /// `boot_params` over the default record's, plus the mandatory
    /// injected keys.
    pub async fn get_boot_params(&self, uuid: &ServerId) -> Result<BootParams, RegistryError> {
        let server = self.get(uuid).await?;
        let default = if server.is_default_record() {
            None
        } else {
            self.get_default().await.ok()
        };

        let empty = HashMap::new();
        let base = default.as_ref().map(|d| &d.boot_params).unwrap_or(&empty);
        let mut kernel_args = BootParams::merge_args(base, &server.boot_params);

        kernel_args.insert("rabbitmq".to_string(), self.config.rabbitmq.clone());
        kernel_args.insert("rabbitmq_dns".to_string(), self.config.rabbitmq_dns.clone());
        kernel_args.insert("hostname".to_string(), server.hostname.clone());

        let mut kernel_flags = default.as_ref().map(|d| d.kernel_flags.clone()).unwrap_or_default();
        kernel_flags.extend(server.kernel_flags.clone());

        let boot_modules = if server.boot_modules.is_empty() {
            default.map(|d| d.boot_modules).unwrap_or_default()
        } else {
            server.boot_modules.clone()
        };

        Ok(BootParams {
            platform: server.boot_platform.clone(),
            kernel_args,
            kernel_flags,
            boot_modules,
            default_console: server.default_console.clone(),
            serial: server.serial.clone(),
        })
    }

    /// Replace boot parameters wholesale (`PUT /boot/:uuid`).
    pub async fn set_boot_params(
        &self,
        uuid: &ServerId,
        patch: &BootParamsPatch,
    ) -> Result<Server, RegistryError> {
        self.modify_existing(uuid, |server| {
            if let Some(platform) = &patch.platform {
                server.boot_platform = platform.clone();
            }
            server.boot_params = patch.kernel_args.clone().unwrap_or_default();
            server.kernel_flags = patch.kernel_flags.clone().unwrap_or_default();
            server.boot_modules = patch.boot_modules.clone().unwrap_or_default();
            server.default_console =
                patch.default_console.clone().unwrap_or_else(|| "serial".to_string());
            server.serial = patch.serial.clone().unwrap_or_else(|| "ttyb".to_string());
        })
        .await
    }

    /// Merge boot parameters key-by-key (`POST /boot/:uuid`).
    pub async fn update_boot_params(
        &self,
        uuid: &ServerId,
        patch: &BootParamsPatch,
    ) -> Result<Server, RegistryError> {
        self.modify_existing(uuid, |server| {
            if let Some(platform) = &patch.platform {
                server.boot_platform = platform.clone();
            }
            if let Some(args) = &patch.kernel_args {
                for (k, v) in args {
                    server.boot_params.insert(k.clone(), v.clone());
                }
            }
            if let Some(flags) = &patch.kernel_flags {
                for (k, v) in flags {
                    server.kernel_flags.insert(k.clone(), v.clone());
                }
            }
            if let Some(modules) = &patch.boot_modules {
                server.boot_modules = modules.clone();
            }
            if let Some(console) = &patch.default_console {
                server.default_console = console.clone();
            }
            if let Some(serial) = &patch.serial {
                server.serial = serial.clone();
            }
        })
        .await
    }

    /// Every platform stamp known across the fleet.
    pub async fn platforms(&self) -> Result<BTreeSet<String>, RegistryError> {
        let servers = self.list(&ListServers::default()).await?;
        let mut platforms = BTreeSet::new();
        for server in servers {
            if !server.current_platform.is_empty() {
                platforms.insert(server.current_platform);
            }
            if !server.boot_platform.is_empty() {
                platforms.insert(server.boot_platform);
            }
        }
        Ok(platforms)
    }

    /// ETag-retried read-modify-write on an existing record.
    async fn modify_existing(
        &self,
        uuid: &ServerId,
        mut apply: impl FnMut(&mut Server),
    ) -> Result<Server, RegistryError> {
        let result = with_etag_retry(
            self.store.as_ref(),
            buckets::SERVERS,
            uuid,
            DEFAULT_ETAG_ATTEMPTS,
            |current| {
                let value = current.ok_or_else(|| StoreError::NotFound {
                    bucket: buckets::SERVERS.to_string(),
                    key: uuid.to_string(),
                })?;
                let mut server =
                    parse_server(uuid, value).map_err(|e| StoreError::Backend(e.to_string()))?;
                apply(&mut server);
                server.etag = None;
                Ok(Modify::Write(to_value(&server)?))
            },
        )
        .await;

        match result {
            Ok(_) => self.get(uuid).await,
            Err(StoreError::NotFound { .. }) => Err(RegistryError::NotFound(*uuid)),
            Err(e) => Err(e.into()),
        }
    }
}

/// First sight of a CN: seed a record from sysinfo plus the default
/// record's boot configuration.
fn materialize(
    uuid: ServerId,
    sysinfo: &Sysinfo,
    default: Option<&Server>,
    datacenter: &str,
) -> Server {
    let mut server = Server::empty(uuid);
    server.datacenter = sysinfo.datacenter_name().unwrap_or(datacenter).to_string();
    server.boot_platform = sysinfo.live_image().unwrap_or_default().to_string();

    if let Some(default) = default {
        server.boot_params = default.boot_params.clone();
        server.kernel_flags = default.kernel_flags.clone();
        server.boot_modules = default.boot_modules.clone();
        server.default_console = default.default_console.clone();
        server.serial = default.serial.clone();
    }

    server
}

/// Refresh the hardware-owned slice of a record from sysinfo.
///
/// Administratively-owned fields are deliberately untouched here.
fn refresh_from_sysinfo(server: &mut Server, sysinfo: &Sysinfo, boot_ms: u64) {
    if let Some(hostname) = sysinfo.hostname() {
        server.hostname = hostname.to_string();
    }
    if let Some(platform) = sysinfo.live_image() {
        server.current_platform = platform.to_string();
        if server.boot_platform.is_empty() {
            server.boot_platform = platform.to_string();
        }
    }
    // setup is monotone: once true, only factory reset clears it.
    server.setup = server.setup || sysinfo.setup().unwrap_or(false);
    server.headnode = server.headnode || sysinfo.headnode();

    let reported = epoch_ms_to_utc(boot_ms);
    // Accept any CN-reported boot time; never invent regressions.
    if server.last_boot != Some(reported) {
        server.last_boot = Some(reported);
    }

    server.sysinfo = sysinfo.clone();
    server.etag = None;
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
