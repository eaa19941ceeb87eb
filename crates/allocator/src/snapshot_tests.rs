// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::payload::{Package, VmPayload};
use corral_core::test_support::sample_sysinfo;
use corral_core::{Server, Ticket, TicketStatus, VmEntry};
use serde_json::json;

fn server(uuid: &str) -> Server {
    Server::builder()
        .uuid(uuid)
        .sysinfo(sample_sysinfo(uuid))
        .reservation_ratio(0.0)
        .build()
}

fn request_with(servers: Vec<Server>) -> AllocationRequest {
    AllocationRequest {
        payload: VmPayload { ram: 512, owner_uuid: "owner-1".to_string(), ..Default::default() },
        servers,
        ..Default::default()
    }
}

#[test]
fn empty_server_has_full_capacity() {
    let request = request_with(vec![server("00000000-0000-0000-0000-000000000001")]);
    let candidates = build(&AllocatorConfig::default(), &request);
    assert_eq!(candidates.len(), 1);
    // sample sysinfo: 65422 MiB RAM, 3582 GiB zpool, 32 cores.
    assert!((candidates[0].unreserved_ram - 65_422.0).abs() < 1.0);
    assert!((candidates[0].unreserved_disk - (3_582.0 * 1024.0)).abs() < 1.0);
    assert!((candidates[0].unreserved_cpu - 3_200.0).abs() < 1.0);
}

#[test]
fn reservation_ratio_shaves_ram() {
    let mut s = server("00000000-0000-0000-0000-000000000001");
    s.reservation_ratio = 0.15;
    let request = request_with(vec![s]);
    let candidates = build(&AllocatorConfig::default(), &request);
    assert!((candidates[0].unreserved_ram - 65_422.0 * 0.85).abs() < 1.0);
}

#[test]
fn resident_vms_consume_resources() {
    let mut s = server("00000000-0000-0000-0000-000000000001");
    s.vms.insert(
        "vm-1".to_string(),
        VmEntry {
            uuid: "vm-1".to_string(),
            owner_uuid: "owner-1".to_string(),
            max_physical_memory: 4_096,
            quota: 100,
            cpu_cap: Some(400),
            state: "running".to_string(),
            last_modified: None,
        },
    );
    s.vms.insert(
        "vm-dead".to_string(),
        VmEntry {
            uuid: "vm-dead".to_string(),
            owner_uuid: "owner-2".to_string(),
            max_physical_memory: 8_192,
            quota: 100,
            cpu_cap: None,
            state: "destroyed".to_string(),
            last_modified: None,
        },
    );

    let request = request_with(vec![s]);
    let candidates = build(&AllocatorConfig::default(), &request);
    // Destroyed VM is ignored; cpu divided by the default 4.0 ratio.
    assert!((candidates[0].unreserved_ram - (65_422.0 - 4_096.0)).abs() < 1.0);
    assert!((candidates[0].unreserved_cpu - (3_200.0 - 100.0)).abs() < 1.0);
    assert_eq!(candidates[0].num_owner_vms, 1);
}

#[test]
fn open_provision_tickets_reserve_resources() {
    let s = server("00000000-0000-0000-0000-000000000001");
    let mut request = request_with(vec![s]);
    request.open_tickets = vec![Ticket::builder()
        .server_uuid("00000000-0000-0000-0000-000000000001")
        .status(TicketStatus::Active)
        .extra(json!({"ram": 2048, "quota": 50}))
        .build()];

    let candidates = build(&AllocatorConfig::default(), &request);
    assert!((candidates[0].unreserved_ram - (65_422.0 - 2_048.0)).abs() < 1.0);
    assert!((candidates[0].unreserved_disk - (3_582.0 * 1024.0 - 50.0 * 1024.0)).abs() < 1.0);
}

#[test]
fn package_overprovision_beats_server_and_default() {
    let mut s = server("00000000-0000-0000-0000-000000000001");
    s.overprovision_ratios.insert("ram".to_string(), 2.0);
    s.vms.insert(
        "vm-1".to_string(),
        VmEntry {
            uuid: "vm-1".to_string(),
            owner_uuid: "owner-2".to_string(),
            max_physical_memory: 4_096,
            quota: 0,
            cpu_cap: None,
            state: "running".to_string(),
            last_modified: None,
        },
    );

    let mut request = request_with(vec![s]);
    // Server ratio 2.0 halves the VM's accounted RAM.
    let candidates = build(&AllocatorConfig::default(), &request);
    assert!((candidates[0].unreserved_ram - (65_422.0 - 2_048.0)).abs() < 1.0);

    // Package ratio 4.0 takes precedence.
    request.package = Some(Package {
        overprovision_ratios: HashMap::from([("ram".to_string(), 4.0)]),
        ..Default::default()
    });
    let candidates = build(&AllocatorConfig::default(), &request);
    assert!((candidates[0].unreserved_ram - (65_422.0 - 1_024.0)).abs() < 1.0);
}

#[test]
fn vm_hosts_maps_vms_to_servers() {
    let mut s = server("00000000-0000-0000-0000-000000000001");
    s.vms.insert(
        "vm-1".to_string(),
        VmEntry {
            uuid: "vm-1".to_string(),
            owner_uuid: "owner-1".to_string(),
            max_physical_memory: 256,
            quota: 10,
            cpu_cap: None,
            state: "running".to_string(),
            last_modified: None,
        },
    );
    let hosts = vm_hosts(&[s]);
    assert_eq!(
        hosts.get("vm-1").map(|id| id.as_str()),
        Some("00000000-0000-0000-0000-000000000001")
    );
}
