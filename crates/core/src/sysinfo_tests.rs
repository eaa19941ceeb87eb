// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::sample_sysinfo;
use serde_json::json;
use yare::parameterized;

#[test]
fn uuid_required() {
    let si = Sysinfo::new(json!({ "Hostname": "cn0" }));
    assert!(matches!(si.uuid(), Err(SysinfoError::MissingKey("UUID"))));
}

#[test]
fn uuid_reads() {
    let si = sample_sysinfo("372bdb58-7b64-4c3c-9046-5a1a0a1b0d5e");
    assert_eq!(si.uuid().unwrap(), "372bdb58-7b64-4c3c-9046-5a1a0a1b0d5e");
}

#[parameterized(
    string_form = { json!("1517295064"), 1_517_295_064 },
    number_form = { json!(1517295064), 1_517_295_064 },
)]
fn boot_time_tolerates_both_forms(raw: serde_json::Value, expected: u64) {
    let si = Sysinfo::new(json!({ "UUID": "x", "Boot Time": raw }));
    assert_eq!(si.boot_time_secs().unwrap(), expected);
}

#[parameterized(
    bool_true = { json!(true), Some(true) },
    string_true = { json!("true"), Some(true) },
    string_false = { json!("false"), Some(false) },
    garbage = { json!("yes"), None },
)]
fn setup_tolerates_both_forms(raw: serde_json::Value, expected: Option<bool>) {
    let si = Sysinfo::new(json!({ "Setup": raw }));
    assert_eq!(si.setup(), expected);
}

#[test]
fn nic_tags_union_physical_and_virtual() {
    let si = Sysinfo::new(json!({
        "Network Interfaces": {
            "igb0": { "NIC Names": ["admin", "internal"], "MAC Address": "00:00:00:00:00:01" },
            "igb1": { "NIC Names": ["external"] }
        },
        "Virtual Network Interfaces": {
            "external0": { "Host Interface": "igb1" }
        }
    }));
    let tags = si.nic_tags();
    for tag in ["admin", "internal", "external", "external0"] {
        assert!(tags.contains(tag), "missing {tag}");
    }
}

#[test]
fn headnode_from_boot_params() {
    let si = Sysinfo::new(json!({ "Boot Parameters": { "headnode": "true" } }));
    assert!(si.headnode());

    let si = Sysinfo::new(json!({ "Boot Parameters": {} }));
    assert!(!si.headnode());
}

#[test]
fn sample_fixture_is_complete() {
    let si = sample_sysinfo("00000000-0000-0000-0000-000000000001");
    assert!(si.hostname().is_some());
    assert!(si.live_image().is_some());
    assert!(si.mib_of_memory().is_some());
    assert!(si.zpool_size_gib().is_some());
    assert!(si.cpu_total_cores().is_some());
    assert_eq!(si.setup(), Some(true));
    assert!(!si.nic_tags().is_empty());
}
