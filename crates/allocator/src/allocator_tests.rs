// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::config::ScoringWeights;
use corral_core::test_support::{sample_headnode_sysinfo, sample_sysinfo};
use corral_core::VmEntry;

const S1: &str = "00000000-0000-0000-0000-000000000001";
const HEADNODE: &str = "00000000-0000-0000-0000-00000000head";

fn server(uuid: &str) -> Server {
    Server::builder()
        .uuid(uuid)
        .sysinfo(sample_sysinfo(uuid))
        .reservation_ratio(0.0)
        .build()
}

fn allocator() -> Allocator {
    Allocator::new(AllocatorConfig {
        weights: ScoringWeights { uniform_random: 0.0, ..Default::default() },
        ..Default::default()
    })
}

fn request(servers: Vec<Server>) -> AllocationRequest {
    AllocationRequest {
        payload: VmPayload { ram: 512, owner_uuid: "owner-1".to_string(), ..Default::default() },
        servers,
        ..Default::default()
    }
}

#[test]
fn allocates_the_only_healthy_server() {
    let allocation = allocator().allocate(&request(vec![server(S1)])).unwrap();
    assert_eq!(allocation.server.uuid, S1);
    assert!(!allocation.steps.is_empty());
}

#[test]
fn chosen_server_is_always_a_candidate_and_eligible() {
    let servers = vec![server(S1), server("00000000-0000-0000-0000-000000000002")];
    let uuids: Vec<String> = servers.iter().map(|s| s.uuid.to_string()).collect();
    let allocation = allocator().allocate(&request(servers)).unwrap();
    assert!(uuids.contains(&allocation.server.uuid.to_string()));
    assert!(allocation.server.setup);
    assert!(!allocation.server.reserved);
}

#[test]
fn headnode_only_candidate_set_is_unallocatable() {
    let mut headnode = Server::builder()
        .uuid(HEADNODE)
        .sysinfo(sample_headnode_sysinfo(HEADNODE))
        .reservation_ratio(0.0)
        .build();
    headnode.headnode = true;

    let err = allocator().allocate(&request(vec![headnode])).unwrap_err();
    let AllocatorError::NoAllocatableServers { steps } = err else {
        panic!("expected NoAllocatableServers");
    };

    // The first step saw the headnode; a later step removed it with the
    // literal reason "headnode".
    assert_eq!(steps[0].remaining, vec![HEADNODE.to_string()]);
    let headnode_step = steps.iter().find(|s| s.step == "filter-headnode").unwrap();
    assert_eq!(headnode_step.reasons[HEADNODE], "headnode");
}

#[test]
fn volumes_from_wipeout_is_its_own_error() {
    let host = server(S1);
    // The volumes-from VM lives nowhere in the candidate set.
    let mut req = request(vec![host]);
    req.payload.volumes_from = vec!["missing-vm".to_string()];

    let err = allocator().allocate(&req).unwrap_err();
    assert!(matches!(err, AllocatorError::VolumeServerNoResources { .. }));
}

#[test]
fn invalid_payload_reports_fields() {
    let mut req = request(vec![server(S1)]);
    req.payload.ram = 0;
    req.payload.owner_uuid.clear();

    let err = allocator().allocate(&req).unwrap_err();
    let AllocatorError::InvalidParameters { errors } = err else {
        panic!("expected InvalidParameters");
    };
    assert_eq!(errors.len(), 2);
}

#[test]
fn chunked_allocation_finds_a_winner_past_the_first_chunk() {
    // 60 unallocatable servers followed by one good one; the pipeline
    // must keep trying chunks until it lands.
    let mut servers = Vec::new();
    for i in 0..60 {
        let uuid = format!("00000000-0000-0000-0000-0000000{i:05}");
        let mut s = server(&uuid);
        s.setup = false;
        servers.push(s);
    }
    let good = server("ffffffff-0000-0000-0000-000000000001");
    servers.push(good);

    let allocation = allocator().allocate(&request(servers)).unwrap();
    assert_eq!(allocation.server.uuid, "ffffffff-0000-0000-0000-000000000001");
}

#[test]
fn capacity_reports_spare_room() {
    let mut busy = server(S1);
    busy.vms.insert(
        "vm-1".to_string(),
        VmEntry {
            uuid: "vm-1".to_string(),
            owner_uuid: "owner-2".to_string(),
            max_physical_memory: 22_000,
            quota: 500,
            cpu_cap: None,
            state: "running".to_string(),
            last_modified: None,
        },
    );

    let capacities = allocator().capacity(&request(vec![busy]));
    assert_eq!(capacities.len(), 1);
    assert_eq!(capacities[0].ram_mib, 65_422 - 22_000);
    assert_eq!(capacities[0].disk_mib, 3_582 * 1024 - 500 * 1024);
    assert_eq!(capacities[0].cpu, 3_200);
}

#[test]
fn capacity_runs_the_eligibility_filters() {
    let healthy = server(S1);
    let mut reserved = server("00000000-0000-0000-0000-000000000002");
    reserved.reserved = true;
    let mut headnode = server("00000000-0000-0000-0000-000000000003");
    headnode.headnode = true;
    let mut down = server("00000000-0000-0000-0000-000000000004");
    down.status = corral_core::ServerStatus::Unknown;

    let capacities = allocator().capacity(&request(vec![healthy, reserved, headnode, down]));
    // Only the eligible server reports spare room.
    assert_eq!(capacities.len(), 1);
    assert_eq!(capacities[0].uuid, S1);
}
