// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! corral-allocator: picks a compute node for a new VM.
//!
//! A staged pipeline: filter stages run in a fixed order, each taking
//! the remaining candidate set and emitting a smaller one plus a
//! per-server reason map; survivors are scored by weighted heuristics
//! and the highest score wins (ties break to the lowest uuid). Large
//! candidate sets run in chunks until a chunk produces a winner.

mod config;
mod filters;
mod payload;
mod pipeline;
mod scorers;
mod snapshot;

pub use config::{AllocatorConfig, MinResources, ScoringWeights};
pub use payload::{AllocationRequest, FieldError, Image, Package, VmPayload};
pub use pipeline::StepSummary;
pub use snapshot::{Candidate, ServerCapacity};

use corral_core::Server;
use thiserror::Error;
use tracing::{debug, info};

/// Why no server was chosen.
#[derive(Debug, Error)]
pub enum AllocatorError {
    #[error("no allocatable servers found")]
    NoAllocatableServers { steps: Vec<StepSummary> },

    #[error("no volume servers with enough resources")]
    VolumeServerNoResources { steps: Vec<StepSummary> },

    #[error("invalid allocation parameters")]
    InvalidParameters { errors: Vec<FieldError> },
}

/// A successful placement.
#[derive(Debug, Clone)]
pub struct Allocation {
    pub server: Server,
    pub steps: Vec<StepSummary>,
}

/// The allocator. Stateless between runs; each run observes the
/// candidate snapshot passed in.
#[derive(Debug, Clone, Default)]
pub struct Allocator {
    config: AllocatorConfig,
}

impl Allocator {
    pub fn new(config: AllocatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Choose a server for the requested VM.
    pub fn allocate(&self, request: &AllocationRequest) -> Result<Allocation, AllocatorError> {
        request.validate().map_err(|errors| AllocatorError::InvalidParameters { errors })?;

        let candidates = snapshot::build(&self.config, request);
        let total = candidates.len();

        if total > self.config.chunk_size {
            return self.allocate_chunked(request, candidates);
        }
        self.allocate_one(request, candidates)
    }

    fn allocate_one(
        &self,
        request: &AllocationRequest,
        candidates: Vec<Candidate>,
    ) -> Result<Allocation, AllocatorError> {
        let (survivors, steps) = pipeline::run_filters(&self.config, request, candidates);

        if survivors.is_empty() {
            // A volumes-from wipeout is its own failure mode.
            let volumes_last = steps
                .last()
                .map(|s| s.step == filters::VOLUMES_FROM_STEP && !s.reasons.is_empty())
                .unwrap_or(false);
            debug!(steps = steps.len(), "allocation failed, no survivors");
            if volumes_last {
                return Err(AllocatorError::VolumeServerNoResources { steps });
            }
            return Err(AllocatorError::NoAllocatableServers { steps });
        }

        let (winner, score_steps) = scorers::pick(&self.config, request, survivors);
        let mut steps = steps;
        steps.extend(score_steps);

        info!(server = %winner.server.uuid, hostname = %winner.server.hostname,
              "allocated");
        Ok(Allocation { server: winner.server, steps })
    }

    /// Run the pipeline over chunks until one yields a winner.
    fn allocate_chunked(
        &self,
        request: &AllocationRequest,
        mut candidates: Vec<Candidate>,
    ) -> Result<Allocation, AllocatorError> {
        debug!(total = candidates.len(), chunk = self.config.chunk_size, "chunked allocation");
        let mut last_failure: Option<AllocatorError> = None;

        while !candidates.is_empty() {
            let rest = candidates.split_off(candidates.len().min(self.config.chunk_size));
            let chunk = std::mem::replace(&mut candidates, rest);

            match self.allocate_one(request, chunk) {
                Ok(allocation) => return Ok(allocation),
                Err(e) => last_failure = Some(e),
            }
        }

        Err(last_failure.unwrap_or(AllocatorError::NoAllocatableServers { steps: Vec::new() }))
    }

    /// Spare room per server: the same pipeline up to the capacity
    /// computation, reported instead of filtered.
    pub fn capacity(&self, request: &AllocationRequest) -> Vec<ServerCapacity> {
        let candidates = snapshot::build(&self.config, request);
        let (survivors, _) =
            pipeline::run_steps(&self.config, request, filters::capacity_preamble(), candidates);
        survivors
            .into_iter()
            .map(|c| ServerCapacity {
                uuid: c.server.uuid,
                ram_mib: c.unreserved_ram.max(0.0).round() as u64,
                disk_mib: c.unreserved_disk.max(0.0).round() as u64,
                cpu: c.unreserved_cpu.max(0.0).round() as u64,
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "allocator_tests.rs"]
mod tests;
