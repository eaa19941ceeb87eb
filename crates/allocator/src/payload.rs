// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Allocation request inputs.

use corral_core::{Server, Ticket};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A per-field validation failure, as surfaced in the error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl FieldError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), code: "Invalid".to_string(), message: message.into() }
    }
}

/// The VM being placed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VmPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_uuid: Option<String>,
    /// RAM in MiB
    pub ram: u64,
    /// Disk quota in GiB
    #[serde(default)]
    pub quota: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cap: Option<u64>,
    pub owner_uuid: String,
    /// Alternative tag sets; one set fully present on a server's NICs
    /// satisfies the requirement.
    #[serde(default)]
    pub nic_tag_requirements: Vec<Vec<String>>,
    /// VMs whose volumes this VM mounts; restricts placement to their
    /// host server.
    #[serde(default)]
    pub volumes_from: Vec<String>,
    /// Docker payloads may be pinned to a minimum platform.
    #[serde(default)]
    pub docker: bool,
}

/// Image manifest slice the allocator cares about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Image {
    /// Keyed by spec version (`"7.0"` etc).
    #[serde(default)]
    pub min_platform: HashMap<String, String>,
    #[serde(default)]
    pub traits: HashMap<String, Value>,
    #[serde(default)]
    pub overprovision_ratios: HashMap<String, f64>,
}

/// Package slice the allocator cares about.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Package {
    #[serde(default)]
    pub min_platform: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cap: Option<u64>,
    #[serde(default)]
    pub traits: HashMap<String, Value>,
    #[serde(default)]
    pub overprovision_ratios: HashMap<String, f64>,
}

/// Everything one allocation run observes.
///
/// The snapshot is taken by the caller at request start; the allocator
/// itself holds no shared state, so concurrent runs are independent.
#[derive(Debug, Clone, Default)]
pub struct AllocationRequest {
    pub payload: VmPayload,
    pub image: Image,
    pub package: Option<Package>,
    /// Candidate servers (already restricted to any requested uuids).
    pub servers: Vec<Server>,
    /// Open provisioning tickets, for in-flight reservation accounting.
    pub open_tickets: Vec<Ticket>,
}

impl AllocationRequest {
    /// Structural validation; shape errors surface as 409
    /// InvalidParameters with one entry per offending field.
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        if self.payload.ram == 0 {
            errors.push(FieldError::invalid("ram", "ram must be a positive number of MiB"));
        }
        if self.payload.owner_uuid.is_empty() {
            errors.push(FieldError::invalid("owner_uuid", "owner_uuid is required"));
        }
        for (i, alternatives) in self.payload.nic_tag_requirements.iter().enumerate() {
            if alternatives.is_empty() {
                errors.push(FieldError::invalid(
                    format!("nic_tag_requirements[{i}]"),
                    "tag set must not be empty",
                ));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// The effective minimum platform per spec version: a server must
    /// clear both the image and the package floor, so the stricter
    /// (per-key maximum) stamp binds. Stamps compare lexicographically.
    pub fn min_platforms(&self) -> HashMap<String, String> {
        let mut merged = self.image.min_platform.clone();
        if let Some(package) = &self.package {
            for (k, v) in &package.min_platform {
                match merged.get(k) {
                    Some(existing) if existing.as_str() >= v.as_str() => {}
                    _ => {
                        merged.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        merged
    }

    /// The effective trait requirements: package wins over image per key.
    pub fn required_traits(&self) -> HashMap<String, Value> {
        let mut merged = self.image.traits.clone();
        if let Some(package) = &self.package {
            for (k, v) in &package.traits {
                merged.insert(k.clone(), v.clone());
            }
        }
        merged
    }

    /// Effective CPU cap: payload beats package.
    pub fn cpu_cap(&self) -> Option<u64> {
        self.payload.cpu_cap.or_else(|| self.package.as_ref().and_then(|p| p.cpu_cap))
    }
}

#[cfg(test)]
#[path = "payload_tests.rs"]
mod tests;
