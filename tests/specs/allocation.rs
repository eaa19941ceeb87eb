// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Placement over a candidate set containing only a headnode.

use corral_allocator::{
    AllocationRequest, Allocator, AllocatorConfig, AllocatorError, VmPayload,
};
use corral_core::test_support::{sample_headnode_sysinfo, sample_sysinfo};
use corral_core::Server;

const HEADNODE: &str = "00000000-0000-0000-0000-00000000aaaa";
const CN: &str = "00000000-0000-0000-0000-000000000001";

fn payload() -> VmPayload {
    VmPayload {
        ram: 512,
        owner_uuid: "00000000-0000-0000-0000-00000000beef".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn headnode_only_candidate_set_is_refused_with_reasons() {
    let mut headnode = Server::builder()
        .uuid(HEADNODE)
        .sysinfo(sample_headnode_sysinfo(HEADNODE))
        .build();
    headnode.headnode = true;

    let request = AllocationRequest {
        payload: payload(),
        servers: vec![headnode],
        ..Default::default()
    };

    let err = Allocator::default().allocate(&request).unwrap_err();
    let AllocatorError::NoAllocatableServers { steps } = err else {
        panic!("expected NoAllocatableServers");
    };

    // The first step saw exactly the headnode; a later step removed it
    // with the literal reason "headnode".
    assert_eq!(steps[0].remaining, vec![HEADNODE.to_string()]);
    let removal = steps
        .iter()
        .find_map(|s| s.reasons.get(HEADNODE))
        .expect("some step must explain the removal");
    assert_eq!(removal, "headnode");
}

#[tokio::test]
async fn chosen_server_satisfies_the_basic_invariants() {
    let good = Server::builder().uuid(CN).sysinfo(sample_sysinfo(CN)).build();
    let mut reserved = Server::builder()
        .uuid("00000000-0000-0000-0000-000000000002")
        .sysinfo(sample_sysinfo("00000000-0000-0000-0000-000000000002"))
        .build();
    reserved.reserved = true;

    let request = AllocationRequest {
        payload: payload(),
        servers: vec![reserved, good],
        ..Default::default()
    };

    let allocation = Allocator::new(AllocatorConfig::default()).allocate(&request).unwrap();
    assert_eq!(allocation.server.uuid, CN);
    assert!(allocation.server.setup);
    assert!(!allocation.server.reserved);
}
