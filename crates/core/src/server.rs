// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The authoritative compute-node record.

use crate::clock::epoch_ms_to_utc;
use crate::id::ServerId;
use crate::sysinfo::Sysinfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Key of the sentinel record seeding boot params for new servers.
pub const DEFAULT_SERVER_UUID: &str = "default";

/// How long after the last heartbeat a server still counts as running.
pub const HEARTBEAT_LIFETIME_SECONDS: u64 = 11;

/// How often in-memory heartbeat state is reconciled to the store.
pub const HEARTBEAT_RECONCILIATION_PERIOD_SECONDS: u64 = 5;

/// Default reservation ratio for newly set-up servers.
pub const DEFAULT_RESERVATION_RATIO: f64 = 0.15;

/// Liveness status of a server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Running,
    #[default]
    Unknown,
    Rebooting,
}

crate::simple_display! {
    ServerStatus {
        Running => "running",
        Unknown => "unknown",
        Rebooting => "rebooting",
    }
}

/// A VM slice of the server record, reported by heartbeats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmEntry {
    pub uuid: String,
    pub owner_uuid: String,
    /// RAM cap in MiB
    pub max_physical_memory: u64,
    /// Disk quota in GiB
    pub quota: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cap: Option<u64>,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// The authoritative record for one compute node.
///
/// Hardware-derived fields are refreshed from sysinfo on every ingest;
/// the administratively-owned fields (`boot_params`, `kernel_flags`,
/// `boot_modules`, `default_console`, `serial`, `reservation_ratio`,
/// `traits`, `overprovision_ratios`, `next_reboot`) are preserved across
/// sysinfo updates and only change through the admin API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub uuid: ServerId,
    pub hostname: String,
    #[serde(default)]
    pub datacenter: String,
    #[serde(default)]
    pub setup: bool,
    #[serde(default)]
    pub headnode: bool,
    #[serde(default)]
    pub reserved: bool,
    #[serde(default = "default_reservation_ratio")]
    pub reservation_ratio: f64,
    #[serde(default)]
    pub sysinfo: Sysinfo,
    #[serde(
        default,
        with = "crate::clock::iso_millis_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_heartbeat: Option<DateTime<Utc>>,
    #[serde(
        default,
        with = "crate::clock::iso_millis_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_boot: Option<DateTime<Utc>>,
    #[serde(default)]
    pub current_platform: String,
    #[serde(default)]
    pub boot_platform: String,
    #[serde(default)]
    pub boot_params: HashMap<String, String>,
    #[serde(default)]
    pub kernel_flags: HashMap<String, Value>,
    #[serde(default)]
    pub boot_modules: Vec<Value>,
    #[serde(default = "default_console")]
    pub default_console: String,
    #[serde(default = "default_serial")]
    pub serial: String,
    #[serde(default)]
    pub traits: HashMap<String, Value>,
    #[serde(default)]
    pub overprovision_ratios: HashMap<String, f64>,
    #[serde(
        default,
        with = "crate::clock::iso_millis_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_reboot: Option<DateTime<Utc>>,
    /// vm uuid → slice, from heartbeat inventory
    #[serde(default)]
    pub vms: HashMap<String, VmEntry>,
    #[serde(default)]
    pub status: ServerStatus,
    /// Store version token; absent until first persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

fn default_reservation_ratio() -> f64 {
    DEFAULT_RESERVATION_RATIO
}

fn default_console() -> String {
    "serial".to_string()
}

fn default_serial() -> String {
    "ttyb".to_string()
}

impl Server {
    /// A bare record with nothing but an identity. Registry ingest fills
    /// the rest from sysinfo and the default record.
    pub fn empty(uuid: ServerId) -> Self {
        Self {
            uuid,
            hostname: String::new(),
            datacenter: String::new(),
            setup: false,
            headnode: false,
            reserved: false,
            reservation_ratio: DEFAULT_RESERVATION_RATIO,
            sysinfo: Sysinfo::default(),
            last_heartbeat: None,
            last_boot: None,
            current_platform: String::new(),
            boot_platform: String::new(),
            boot_params: HashMap::new(),
            kernel_flags: HashMap::new(),
            boot_modules: Vec::new(),
            default_console: default_console(),
            serial: default_serial(),
            traits: HashMap::new(),
            overprovision_ratios: HashMap::new(),
            next_reboot: None,
            vms: HashMap::new(),
            status: ServerStatus::Unknown,
            etag: None,
        }
    }

    /// Status implied by the last heartbeat at time `now_ms`.
    ///
    /// Running iff the last heartbeat is within the liveness window;
    /// a server already marked rebooting stays rebooting until it
    /// heartbeats again.
    pub fn status_at(&self, now_ms: u64) -> ServerStatus {
        match self.last_heartbeat {
            Some(hb) => {
                let now = epoch_ms_to_utc(now_ms);
                let age = now.signed_duration_since(hb);
                if age.num_seconds() >= 0 && (age.num_seconds() as u64) <= HEARTBEAT_LIFETIME_SECONDS
                {
                    ServerStatus::Running
                } else if self.status == ServerStatus::Rebooting {
                    ServerStatus::Rebooting
                } else {
                    ServerStatus::Unknown
                }
            }
            None if self.status == ServerStatus::Rebooting => ServerStatus::Rebooting,
            None => ServerStatus::Unknown,
        }
    }

    pub fn is_default_record(&self) -> bool {
        self.uuid == DEFAULT_SERVER_UUID
    }

    /// Total RAM reported by sysinfo, MiB.
    pub fn ram_total_mib(&self) -> u64 {
        self.sysinfo.mib_of_memory().unwrap_or(0)
    }

    /// Total disk pool reported by sysinfo, MiB.
    pub fn disk_total_mib(&self) -> u64 {
        self.sysinfo.zpool_size_gib().unwrap_or(0) * 1024
    }

    pub fn cpu_total_cores(&self) -> u64 {
        self.sysinfo.cpu_total_cores().unwrap_or(0)
    }
}

crate::builder! {
    pub struct ServerBuilder => Server {
        into {
            uuid: ServerId = ServerId::from_string("00000000-0000-0000-0000-000000000001"),
            hostname: String = "cn0",
            datacenter: String = "dc0",
            current_platform: String = "20180101T000000Z",
            boot_platform: String = "20180101T000000Z",
            default_console: String = "serial",
            serial: String = "ttyb",
        }
        set {
            setup: bool = true,
            headnode: bool = false,
            reserved: bool = false,
            reservation_ratio: f64 = DEFAULT_RESERVATION_RATIO,
            sysinfo: Sysinfo = Sysinfo::default(),
            boot_params: HashMap<String, String> = HashMap::new(),
            kernel_flags: HashMap<String, Value> = HashMap::new(),
            boot_modules: Vec<Value> = Vec::new(),
            traits: HashMap<String, Value> = HashMap::new(),
            overprovision_ratios: HashMap<String, f64> = HashMap::new(),
            vms: HashMap<String, VmEntry> = HashMap::new(),
            status: ServerStatus = ServerStatus::Running,
        }
        option {
            last_heartbeat: DateTime<Utc> = None,
            last_boot: DateTime<Utc> = None,
            next_reboot: DateTime<Utc> = None,
            etag: String = None,
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
