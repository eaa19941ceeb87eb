// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for tests in this crate and downstream crates.

use crate::sysinfo::Sysinfo;
use serde_json::json;

/// A representative sysinfo document for a set-up compute node.
///
/// Shape matches what CN agents actually send: numeric values as
/// strings, NIC tag lists under `"NIC Names"`, boot parameters flat.
pub fn sample_sysinfo(uuid: &str) -> Sysinfo {
    Sysinfo::new(json!({
        "UUID": uuid,
        "Hostname": format!("cn-{}", crate::id::short(uuid, 8)),
        "Datacenter Name": "dc0",
        "Live Image": "20180125T023116Z",
        "Boot Time": "1517295064",
        "System Type": "SunOS",
        "Setup": "true",
        "Serial Number": "4GZ2T72",
        "MiB of Memory": "65422",
        "Zpool Size in GiB": 3582,
        "CPU Total Cores": 32,
        "Boot Parameters": {
            "console": "ttyb",
            "boot_args": "",
            "bootargs": ""
        },
        "Network Interfaces": {
            "igb0": {
                "MAC Address": "00:25:90:94:35:ac",
                "ip4addr": "10.99.99.7",
                "Link Status": "up",
                "NIC Names": ["admin"]
            },
            "ixgbe0": {
                "MAC Address": "90:e2:ba:2a:bb:e8",
                "ip4addr": "",
                "Link Status": "up",
                "NIC Names": ["external", "internal"]
            }
        },
        "Virtual Network Interfaces": {
            "external0": {
                "MAC Address": "90:e2:ba:2a:bb:e9",
                "ip4addr": "10.88.88.7",
                "Link Status": "up",
                "Host Interface": "ixgbe0"
            }
        }
    }))
}

/// Same document with the headnode boot parameter set.
pub fn sample_headnode_sysinfo(uuid: &str) -> Sysinfo {
    let mut si = sample_sysinfo(uuid);
    if let Some(params) = si.0.get_mut("Boot Parameters").and_then(|v| v.as_object_mut()) {
        params.insert("headnode".to_string(), json!("true"));
    }
    si
}
