// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Allocator tuning knobs.

use serde::{Deserialize, Serialize};

/// Floors a server must clear before it is considered at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MinResources {
    pub free_ram_mib: u64,
    pub free_disk_mib: u64,
}

impl Default for MinResources {
    fn default() -> Self {
        Self { free_ram_mib: 256, free_disk_mib: 5_120 }
    }
}

/// Weights for the scoring stage. Zero disables a scorer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub current_platform: f64,
    pub next_reboot: f64,
    pub num_owner_zones: f64,
    pub uniform_random: f64,
    pub unreserved_disk: f64,
    pub unreserved_ram: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            current_platform: 1.0,
            next_reboot: 0.5,
            num_owner_zones: 0.0,
            uniform_random: 0.5,
            unreserved_disk: 1.0,
            unreserved_ram: 2.0,
        }
    }
}

/// Allocator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatorConfig {
    /// Exclude headnodes from placement.
    pub filter_headnode: bool,
    /// Enforce the [`MinResources`] floors.
    pub filter_min_resources: bool,
    /// Keep tiny VMs off very large servers.
    pub filter_large_servers: bool,
    /// Minimum platform for docker-flagged payloads, when set.
    pub filter_docker_min_platform: Option<String>,
    /// Maximum VMs per server, when set.
    pub filter_vm_limit: Option<usize>,
    /// Spread an owner's VMs across servers, when set.
    pub filter_owner_server: bool,

    /// Cluster-default overprovision ratios (the lowest precedence).
    pub overprovision_ratio_ram: f64,
    pub overprovision_ratio_cpu: f64,
    pub overprovision_ratio_disk: f64,

    pub minimum: MinResources,
    pub weights: ScoringWeights,

    /// Servers at or above this RAM count as "large".
    pub large_server_ram_mib: u64,
    /// VMs at or below this RAM count as "tiny" for the large-server
    /// filter.
    pub small_vm_ram_mib: u64,
    /// Pipeline runs in chunks beyond this many candidates.
    pub chunk_size: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            filter_headnode: true,
            filter_min_resources: true,
            filter_large_servers: true,
            filter_docker_min_platform: None,
            filter_vm_limit: None,
            filter_owner_server: false,
            overprovision_ratio_ram: 1.0,
            overprovision_ratio_cpu: 4.0,
            overprovision_ratio_disk: 1.0,
            minimum: MinResources::default(),
            weights: ScoringWeights::default(),
            large_server_ram_mib: 256 * 1024,
            small_vm_ram_mib: 512,
            chunk_size: 50,
        }
    }
}
