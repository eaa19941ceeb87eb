// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The derived per-server view one allocation run works over.

use crate::config::AllocatorConfig;
use crate::payload::AllocationRequest;
use corral_core::{Server, ServerId};
use serde::Serialize;
use std::collections::HashMap;

/// A candidate server with its derived spare resources.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub server: Server,
    /// Spare RAM in MiB after reservation ratio, resident VMs,
    /// overprovisioning, and open-ticket reservations.
    pub unreserved_ram: f64,
    /// Spare CPU in percent-of-core units (100 per core).
    pub unreserved_cpu: f64,
    /// Spare disk in MiB.
    pub unreserved_disk: f64,
    /// Resident VMs owned by the requesting owner.
    pub num_owner_vms: usize,
}

/// Spare room per server, as `POST /capacity` reports it.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapacity {
    pub uuid: ServerId,
    pub ram_mib: u64,
    pub disk_mib: u64,
    pub cpu: u64,
}

/// Overprovision ratio for one resource, by precedence:
/// package > image > server > cluster default.
pub(crate) fn overprovision(
    resource: &str,
    cluster_default: f64,
    request: &AllocationRequest,
    server: &Server,
) -> f64 {
    if let Some(package) = &request.package {
        if let Some(ratio) = package.overprovision_ratios.get(resource) {
            return *ratio;
        }
    }
    if let Some(ratio) = request.image.overprovision_ratios.get(resource) {
        return *ratio;
    }
    if let Some(ratio) = server.overprovision_ratios.get(resource) {
        return *ratio;
    }
    cluster_default
}

/// Build the candidate snapshot for one run.
pub fn build(config: &AllocatorConfig, request: &AllocationRequest) -> Vec<Candidate> {
    request.servers.iter().map(|server| candidate(config, request, server)).collect()
}

fn candidate(config: &AllocatorConfig, request: &AllocationRequest, server: &Server) -> Candidate {
    let ratio_ram = overprovision("ram", config.overprovision_ratio_ram, request, server);
    let ratio_cpu = overprovision("cpu", config.overprovision_ratio_cpu, request, server);
    let ratio_disk = overprovision("disk", config.overprovision_ratio_disk, request, server);

    let mut used_ram = 0.0;
    let mut used_cpu = 0.0;
    let mut used_disk = 0.0;
    let mut num_owner_vms = 0;
    for vm in server.vms.values() {
        if vm.state == "failed" || vm.state == "destroyed" {
            continue;
        }
        used_ram += vm.max_physical_memory as f64 / ratio_ram;
        if let Some(cap) = vm.cpu_cap {
            used_cpu += cap as f64 / ratio_cpu;
        }
        used_disk += (vm.quota * 1024) as f64 / ratio_disk;
        if vm.owner_uuid == request.payload.owner_uuid {
            num_owner_vms += 1;
        }
    }

    // In-flight provisions hold resources before the VM shows up in
    // heartbeats; their tickets carry the payload in `extra`.
    for ticket in &request.open_tickets {
        if ticket.server_uuid != server.uuid || ticket.scope != "vm" {
            continue;
        }
        if ticket.action != "provision" {
            continue;
        }
        if let Some(ram) = ticket.extra.get("ram").and_then(serde_json::Value::as_u64) {
            used_ram += ram as f64 / ratio_ram;
        }
        if let Some(quota) = ticket.extra.get("quota").and_then(serde_json::Value::as_u64) {
            used_disk += (quota * 1024) as f64 / ratio_disk;
        }
        if let Some(cap) = ticket.extra.get("cpu_cap").and_then(serde_json::Value::as_u64) {
            used_cpu += cap as f64 / ratio_cpu;
        }
    }

    let total_ram = server.ram_total_mib() as f64 * (1.0 - server.reservation_ratio);
    let total_cpu = (server.cpu_total_cores() * 100) as f64;
    let total_disk = server.disk_total_mib() as f64;

    Candidate {
        server: server.clone(),
        unreserved_ram: total_ram - used_ram,
        unreserved_cpu: total_cpu - used_cpu,
        unreserved_disk: total_disk - used_disk,
        num_owner_vms,
    }
}

/// vm uuid → hosting server uuid, for the volumes-from stage.
pub fn vm_hosts(servers: &[Server]) -> HashMap<String, ServerId> {
    let mut hosts = HashMap::new();
    for server in servers {
        for vm_uuid in server.vms.keys() {
            hosts.insert(vm_uuid.clone(), server.uuid);
        }
    }
    hosts
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
