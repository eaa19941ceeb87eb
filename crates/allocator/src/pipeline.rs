// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The staged filter pipeline.

use crate::config::AllocatorConfig;
use crate::filters;
use crate::payload::AllocationRequest;
use crate::snapshot::Candidate;
use serde::Serialize;
use std::collections::HashMap;

/// One pipeline stage's outcome: who was still in when it ran, and why
/// each removed server fell out.
#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub step: String,
    /// Uuids the stage received.
    pub remaining: Vec<String>,
    /// uuid → removal reason, for servers this stage dropped.
    pub reasons: HashMap<String, String>,
}

/// A filter stage: keep some candidates, give reasons for the rest.
pub(crate) trait FilterStep {
    fn name(&self) -> &'static str;

    fn enabled(&self, _config: &AllocatorConfig, _request: &AllocationRequest) -> bool {
        true
    }

    fn apply(
        &self,
        config: &AllocatorConfig,
        request: &AllocationRequest,
        candidates: Vec<Candidate>,
    ) -> (Vec<Candidate>, HashMap<String, String>);
}

/// Run every enabled filter in order, accumulating step summaries.
pub(crate) fn run_filters(
    config: &AllocatorConfig,
    request: &AllocationRequest,
    candidates: Vec<Candidate>,
) -> (Vec<Candidate>, Vec<StepSummary>) {
    run_steps(config, request, filters::all(), candidates)
}

/// Run a given stage table; the capacity report uses a truncated one.
pub(crate) fn run_steps(
    config: &AllocatorConfig,
    request: &AllocationRequest,
    stages: Vec<Box<dyn FilterStep>>,
    mut candidates: Vec<Candidate>,
) -> (Vec<Candidate>, Vec<StepSummary>) {
    let mut steps = Vec::new();

    for filter in stages {
        if !filter.enabled(config, request) {
            continue;
        }
        let remaining: Vec<String> =
            candidates.iter().map(|c| c.server.uuid.to_string()).collect();
        let (kept, reasons) = filter.apply(config, request, candidates);

        tracing::debug!(step = filter.name(), before = remaining.len(), after = kept.len(),
                        "allocator filter");
        steps.push(StepSummary { step: filter.name().to_string(), remaining, reasons });

        candidates = kept;
        if candidates.is_empty() {
            break;
        }
    }

    (candidates, steps)
}
