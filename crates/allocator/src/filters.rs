// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The filter stages, in pipeline order.

use crate::config::AllocatorConfig;
use crate::payload::AllocationRequest;
use crate::pipeline::FilterStep;
use crate::snapshot::{self, Candidate};
use corral_core::ServerStatus;
use serde_json::Value;
use std::collections::HashMap;

pub(crate) const VOLUMES_FROM_STEP: &str = "filter-volumes-from";

/// Default spec version a CN reports when sysinfo omits one.
const DEFAULT_SPEC_VERSION: &str = "7.0";

/// The stages ahead of the capacity computation. The capacity report
/// runs exactly these and stops.
pub(crate) fn capacity_preamble() -> Vec<Box<dyn FilterStep>> {
    vec![
        Box::new(FilterSetup),
        Box::new(FilterHeadnode),
        Box::new(FilterMinResources),
        Box::new(FilterRunning),
        Box::new(FilterMinPlatform),
        Box::new(FilterNicTags),
        Box::new(FilterTraits),
    ]
}

/// Every stage, in the order they run.
pub(crate) fn all() -> Vec<Box<dyn FilterStep>> {
    let mut steps = capacity_preamble();
    steps.extend([
        Box::new(FilterCapacity) as Box<dyn FilterStep>,
        Box::new(FilterLargeServers),
        Box::new(FilterOwnerServer),
        Box::new(FilterVmLimit),
        Box::new(FilterDockerMinPlatform),
        Box::new(FilterVolumesFrom),
    ]);
    steps
}

/// Split candidates by a predicate, collecting a reason per reject.
fn split(
    candidates: Vec<Candidate>,
    mut keep: impl FnMut(&Candidate) -> Result<(), String>,
) -> (Vec<Candidate>, HashMap<String, String>) {
    let mut kept = Vec::with_capacity(candidates.len());
    let mut reasons = HashMap::new();
    for candidate in candidates {
        match keep(&candidate) {
            Ok(()) => kept.push(candidate),
            Err(reason) => {
                reasons.insert(candidate.server.uuid.to_string(), reason);
            }
        }
    }
    (kept, reasons)
}

struct FilterSetup;

impl FilterStep for FilterSetup {
    fn name(&self) -> &'static str {
        "filter-setup"
    }

    fn apply(
        &self,
        _config: &AllocatorConfig,
        _request: &AllocationRequest,
        candidates: Vec<Candidate>,
    ) -> (Vec<Candidate>, HashMap<String, String>) {
        split(candidates, |c| {
            if !c.server.setup {
                Err("server is not setup".to_string())
            } else if c.server.reserved {
                Err("server is reserved".to_string())
            } else {
                Ok(())
            }
        })
    }
}

struct FilterHeadnode;

impl FilterStep for FilterHeadnode {
    fn name(&self) -> &'static str {
        "filter-headnode"
    }

    fn enabled(&self, config: &AllocatorConfig, _request: &AllocationRequest) -> bool {
        config.filter_headnode
    }

    fn apply(
        &self,
        _config: &AllocatorConfig,
        _request: &AllocationRequest,
        candidates: Vec<Candidate>,
    ) -> (Vec<Candidate>, HashMap<String, String>) {
        split(candidates, |c| {
            if c.server.headnode {
                Err("headnode".to_string())
            } else {
                Ok(())
            }
        })
    }
}

struct FilterMinResources;

impl FilterStep for FilterMinResources {
    fn name(&self) -> &'static str {
        "filter-min-resources"
    }

    fn enabled(&self, config: &AllocatorConfig, _request: &AllocationRequest) -> bool {
        config.filter_min_resources
    }

    fn apply(
        &self,
        config: &AllocatorConfig,
        _request: &AllocationRequest,
        candidates: Vec<Candidate>,
    ) -> (Vec<Candidate>, HashMap<String, String>) {
        let min = config.minimum;
        split(candidates, |c| {
            if c.unreserved_ram < min.free_ram_mib as f64 {
                Err(format!(
                    "server has {:.0} MiB unreserved RAM, below the {} MiB floor",
                    c.unreserved_ram, min.free_ram_mib
                ))
            } else if c.unreserved_disk < min.free_disk_mib as f64 {
                Err(format!(
                    "server has {:.0} MiB unreserved disk, below the {} MiB floor",
                    c.unreserved_disk, min.free_disk_mib
                ))
            } else {
                Ok(())
            }
        })
    }
}

struct FilterRunning;

impl FilterStep for FilterRunning {
    fn name(&self) -> &'static str {
        "filter-running"
    }

    fn apply(
        &self,
        _config: &AllocatorConfig,
        _request: &AllocationRequest,
        candidates: Vec<Candidate>,
    ) -> (Vec<Candidate>, HashMap<String, String>) {
        split(candidates, |c| {
            if c.server.status == ServerStatus::Running {
                Ok(())
            } else {
                Err(format!("server status is {}", c.server.status))
            }
        })
    }
}

struct FilterMinPlatform;

impl FilterStep for FilterMinPlatform {
    fn name(&self) -> &'static str {
        "filter-min-platform"
    }

    fn apply(
        &self,
        _config: &AllocatorConfig,
        request: &AllocationRequest,
        candidates: Vec<Candidate>,
    ) -> (Vec<Candidate>, HashMap<String, String>) {
        let required = request.min_platforms();
        if required.is_empty() {
            return (candidates, HashMap::new());
        }

        split(candidates, |c| {
            let version = c
                .server
                .sysinfo
                .as_value()
                .get("SDC Version")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_SPEC_VERSION);
            match required.get(version) {
                // Platform stamps compare lexicographically.
                Some(min) if c.server.current_platform.as_str() < min.as_str() => Err(format!(
                    "platform {} is older than required {}",
                    c.server.current_platform, min
                )),
                _ => Ok(()),
            }
        })
    }
}

struct FilterNicTags;

impl FilterStep for FilterNicTags {
    fn name(&self) -> &'static str {
        "filter-nic-tags"
    }

    fn enabled(&self, _config: &AllocatorConfig, request: &AllocationRequest) -> bool {
        !request.payload.nic_tag_requirements.is_empty()
    }

    fn apply(
        &self,
        _config: &AllocatorConfig,
        request: &AllocationRequest,
        candidates: Vec<Candidate>,
    ) -> (Vec<Candidate>, HashMap<String, String>) {
        let alternatives = &request.payload.nic_tag_requirements;
        split(candidates, |c| {
            let tags = c.server.sysinfo.nic_tags();
            let satisfied = alternatives
                .iter()
                .any(|set| set.iter().all(|tag| tags.contains(tag.as_str())));
            if satisfied {
                Ok(())
            } else {
                Err(format!("server NICs carry none of the required tag sets {alternatives:?}"))
            }
        })
    }
}

struct FilterTraits;

impl FilterStep for FilterTraits {
    fn name(&self) -> &'static str {
        "filter-traits"
    }

    fn apply(
        &self,
        _config: &AllocatorConfig,
        request: &AllocationRequest,
        candidates: Vec<Candidate>,
    ) -> (Vec<Candidate>, HashMap<String, String>) {
        let required = request.required_traits();
        if required.is_empty() {
            return (candidates, HashMap::new());
        }

        split(candidates, |c| {
            for (key, want) in &required {
                match c.server.traits.get(key) {
                    Some(have) if trait_matches(have, want) => {}
                    Some(have) => {
                        return Err(format!("trait {key:?} is {have} but {want} is required"));
                    }
                    None => return Err(format!("server lacks required trait {key:?}")),
                }
            }
            Ok(())
        })
    }
}

/// Trait comparison: bool equality, string equality, or membership when
/// either side is a list.
fn trait_matches(have: &Value, want: &Value) -> bool {
    match (have, want) {
        (Value::Array(haves), Value::Array(wants)) => {
            wants.iter().any(|w| haves.iter().any(|h| h == w))
        }
        (Value::Array(haves), w) => haves.iter().any(|h| h == w),
        (h, Value::Array(wants)) => wants.iter().any(|w| w == h),
        (h, w) => h == w,
    }
}

struct FilterCapacity;

impl FilterStep for FilterCapacity {
    fn name(&self) -> &'static str {
        "filter-capacity"
    }

    fn apply(
        &self,
        config: &AllocatorConfig,
        request: &AllocationRequest,
        candidates: Vec<Candidate>,
    ) -> (Vec<Candidate>, HashMap<String, String>) {
        split(candidates, |c| {
            let ratio_ram =
                snapshot::overprovision("ram", config.overprovision_ratio_ram, request, &c.server);
            let ratio_cpu =
                snapshot::overprovision("cpu", config.overprovision_ratio_cpu, request, &c.server);
            let ratio_disk = snapshot::overprovision(
                "disk",
                config.overprovision_ratio_disk,
                request,
                &c.server,
            );

            let ram_needed = request.payload.ram as f64 / ratio_ram;
            if c.unreserved_ram < ram_needed {
                return Err(format!(
                    "VM needs {:.0} MiB RAM but server has {:.0} MiB unreserved",
                    ram_needed, c.unreserved_ram
                ));
            }

            let disk_needed = (request.payload.quota * 1024) as f64 / ratio_disk;
            if c.unreserved_disk < disk_needed {
                return Err(format!(
                    "VM needs {:.0} MiB disk but server has {:.0} MiB unreserved",
                    disk_needed, c.unreserved_disk
                ));
            }

            if let Some(cap) = request.cpu_cap() {
                let cpu_needed = cap as f64 / ratio_cpu;
                if c.unreserved_cpu < cpu_needed {
                    return Err(format!(
                        "VM needs {:.0} CPU but server has {:.0} unreserved",
                        cpu_needed, c.unreserved_cpu
                    ));
                }
            }
            Ok(())
        })
    }
}

/// Soft filter: tiny VMs stay off very large servers, unless that
/// would empty the candidate set.
struct FilterLargeServers;

impl FilterStep for FilterLargeServers {
    fn name(&self) -> &'static str {
        "filter-large-servers"
    }

    fn enabled(&self, config: &AllocatorConfig, request: &AllocationRequest) -> bool {
        config.filter_large_servers && request.payload.ram <= config.small_vm_ram_mib
    }

    fn apply(
        &self,
        config: &AllocatorConfig,
        _request: &AllocationRequest,
        candidates: Vec<Candidate>,
    ) -> (Vec<Candidate>, HashMap<String, String>) {
        let original = candidates.clone();
        let (kept, reasons) = split(candidates, |c| {
            if c.server.ram_total_mib() >= config.large_server_ram_mib {
                Err("large server held back for large VMs".to_string())
            } else {
                Ok(())
            }
        });
        if kept.is_empty() {
            return (original, HashMap::new());
        }
        (kept, reasons)
    }
}

/// Soft filter: spread an owner's VMs across servers.
struct FilterOwnerServer;

impl FilterStep for FilterOwnerServer {
    fn name(&self) -> &'static str {
        "filter-owner-server"
    }

    fn enabled(&self, config: &AllocatorConfig, _request: &AllocationRequest) -> bool {
        config.filter_owner_server
    }

    fn apply(
        &self,
        _config: &AllocatorConfig,
        _request: &AllocationRequest,
        candidates: Vec<Candidate>,
    ) -> (Vec<Candidate>, HashMap<String, String>) {
        let original = candidates.clone();
        let (kept, reasons) = split(candidates, |c| {
            if c.num_owner_vms > 0 {
                Err(format!("server already hosts {} of the owner's VMs", c.num_owner_vms))
            } else {
                Ok(())
            }
        });
        if kept.is_empty() {
            return (original, HashMap::new());
        }
        (kept, reasons)
    }
}

struct FilterVmLimit;

impl FilterStep for FilterVmLimit {
    fn name(&self) -> &'static str {
        "filter-vm-limit"
    }

    fn enabled(&self, config: &AllocatorConfig, _request: &AllocationRequest) -> bool {
        config.filter_vm_limit.is_some()
    }

    fn apply(
        &self,
        config: &AllocatorConfig,
        _request: &AllocationRequest,
        candidates: Vec<Candidate>,
    ) -> (Vec<Candidate>, HashMap<String, String>) {
        let limit = config.filter_vm_limit.unwrap_or(usize::MAX);
        split(candidates, |c| {
            if c.server.vms.len() >= limit {
                Err(format!("server is at the {limit}-VM limit"))
            } else {
                Ok(())
            }
        })
    }
}

struct FilterDockerMinPlatform;

impl FilterStep for FilterDockerMinPlatform {
    fn name(&self) -> &'static str {
        "filter-docker-min-platform"
    }

    fn enabled(&self, config: &AllocatorConfig, request: &AllocationRequest) -> bool {
        request.payload.docker && config.filter_docker_min_platform.is_some()
    }

    fn apply(
        &self,
        config: &AllocatorConfig,
        _request: &AllocationRequest,
        candidates: Vec<Candidate>,
    ) -> (Vec<Candidate>, HashMap<String, String>) {
        let min = config.filter_docker_min_platform.clone().unwrap_or_default();
        split(candidates, |c| {
            if c.server.current_platform.as_str() < min.as_str() {
                Err(format!(
                    "docker VMs need platform {} or newer, server runs {}",
                    min, c.server.current_platform
                ))
            } else {
                Ok(())
            }
        })
    }
}

/// Restrict placement to the server hosting every volumes-from VM.
struct FilterVolumesFrom;

impl FilterStep for FilterVolumesFrom {
    fn name(&self) -> &'static str {
        VOLUMES_FROM_STEP
    }

    fn enabled(&self, _config: &AllocatorConfig, request: &AllocationRequest) -> bool {
        !request.payload.volumes_from.is_empty()
    }

    fn apply(
        &self,
        _config: &AllocatorConfig,
        request: &AllocationRequest,
        candidates: Vec<Candidate>,
    ) -> (Vec<Candidate>, HashMap<String, String>) {
        let hosts = snapshot::vm_hosts(&request.servers);
        let mut allowed: Option<corral_core::ServerId> = None;
        let mut consistent = true;
        for vm_uuid in &request.payload.volumes_from {
            match (hosts.get(vm_uuid), allowed) {
                (Some(host), None) => allowed = Some(*host),
                (Some(host), Some(prev)) if *host != prev => consistent = false,
                (None, _) => consistent = false,
                _ => {}
            }
        }

        split(candidates, |c| {
            if !consistent {
                return Err("volumes-from VMs are not co-resident on any server".to_string());
            }
            match allowed {
                Some(host) if c.server.uuid == host => Ok(()),
                _ => Err("server does not host the volumes-from VMs".to_string()),
            }
        })
    }
}

#[cfg(test)]
#[path = "filters_tests.rs"]
mod tests;
