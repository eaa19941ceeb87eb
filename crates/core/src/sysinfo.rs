// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The sysinfo document a CN reports at boot and on demand.
//!
//! Sysinfo is an opaque structured document owned by the CN agent; the
//! control plane stores it verbatim and reads a handful of well-known
//! keys through typed accessors. Numeric values arrive as either JSON
//! numbers or decimal strings depending on agent vintage, so every
//! accessor tolerates both.

use crate::id::ServerId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use thiserror::Error;

/// Errors raised while interpreting a sysinfo document.
#[derive(Debug, Error)]
pub enum SysinfoError {
    #[error("sysinfo is missing required key {0:?}")]
    MissingKey(&'static str),

    #[error("sysinfo key {key:?} has unusable value: {value}")]
    BadValue { key: &'static str, value: Value },
}

/// A CN sysinfo document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sysinfo(pub Value);

impl Sysinfo {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    fn str_key(&self, key: &'static str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Read a value that may be a JSON number or a decimal string.
    fn num_key(&self, key: &'static str) -> Option<u64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Read a value that may be a JSON bool or a "true"/"false" string.
    fn bool_key(&self, key: &'static str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// The CN's UUID. Required; must match the server record's uuid.
    pub fn uuid(&self) -> Result<ServerId, SysinfoError> {
        self.str_key("UUID")
            .map(ServerId::from_string)
            .ok_or(SysinfoError::MissingKey("UUID"))
    }

    pub fn hostname(&self) -> Option<&str> {
        self.str_key("Hostname")
    }

    pub fn datacenter_name(&self) -> Option<&str> {
        self.str_key("Datacenter Name")
    }

    /// Boot time in epoch seconds. Agents report it as a decimal string.
    pub fn boot_time_secs(&self) -> Result<u64, SysinfoError> {
        self.num_key("Boot Time").ok_or(SysinfoError::MissingKey("Boot Time"))
    }

    /// The running platform image stamp, e.g. `20180125T023116Z`.
    pub fn live_image(&self) -> Option<&str> {
        self.str_key("Live Image")
    }

    pub fn setup(&self) -> Option<bool> {
        self.bool_key("Setup")
    }

    pub fn system_type(&self) -> Option<&str> {
        self.str_key("System Type")
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.str_key("Serial Number")
    }

    pub fn mib_of_memory(&self) -> Option<u64> {
        self.num_key("MiB of Memory")
    }

    pub fn zpool_size_gib(&self) -> Option<u64> {
        self.num_key("Zpool Size in GiB")
    }

    pub fn cpu_total_cores(&self) -> Option<u64> {
        self.num_key("CPU Total Cores")
    }

    /// Boot parameters the CN was booted with, as string pairs.
    pub fn boot_params(&self) -> HashMap<String, String> {
        let mut out = HashMap::new();
        if let Some(obj) = self.0.get("Boot Parameters").and_then(Value::as_object) {
            for (k, v) in obj {
                match v {
                    Value::String(s) => {
                        out.insert(k.clone(), s.clone());
                    }
                    other => {
                        out.insert(k.clone(), other.to_string());
                    }
                }
            }
        }
        out
    }

    /// Whether the CN booted as the headnode (from boot parameters).
    pub fn headnode(&self) -> bool {
        self.boot_params().get("headnode").map(|v| v == "true").unwrap_or(false)
    }

    /// The set of NIC tags present on any physical or virtual interface.
    ///
    /// Physical NICs carry a `"NIC Names"` tag list; virtual interfaces
    /// inherit placement from their host interface, so their own names
    /// count as tags too.
    pub fn nic_tags(&self) -> BTreeSet<String> {
        let mut tags = BTreeSet::new();

        if let Some(nics) = self.0.get("Network Interfaces").and_then(Value::as_object) {
            for nic in nics.values() {
                if let Some(names) = nic.get("NIC Names").and_then(Value::as_array) {
                    for name in names.iter().filter_map(Value::as_str) {
                        tags.insert(name.to_string());
                    }
                }
            }
        }

        if let Some(vnics) = self.0.get("Virtual Network Interfaces").and_then(Value::as_object) {
            for (name, _) in vnics {
                tags.insert(name.clone());
            }
        }

        tags
    }
}

#[cfg(test)]
#[path = "sysinfo_tests.rs"]
mod tests;
