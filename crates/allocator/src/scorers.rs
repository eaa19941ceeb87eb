// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Weighted scoring over filter survivors.
//!
//! Each scorer adds `weight * normalized` to a candidate's score; the
//! highest total wins, exact ties going to the lowest uuid so runs are
//! deterministic whenever the uniform-random weight is zero.

use crate::config::AllocatorConfig;
use crate::payload::AllocationRequest;
use crate::pipeline::StepSummary;
use crate::snapshot::Candidate;
use chrono::Utc;
use rand::Rng;
use std::collections::HashMap;

/// Window over which an imminent `next_reboot` hurts a server's score.
const NEXT_REBOOT_WINDOW_SECS: i64 = 7 * 24 * 3600;

struct Scored {
    candidate: Candidate,
    score: f64,
}

/// Score survivors and pick the winner. Emits one step summary per
/// active scorer, mirroring the filter stages.
pub(crate) fn pick(
    config: &AllocatorConfig,
    request: &AllocationRequest,
    survivors: Vec<Candidate>,
) -> (Candidate, Vec<StepSummary>) {
    let weights = &config.weights;
    let uuids: Vec<String> = survivors.iter().map(|c| c.server.uuid.to_string()).collect();

    let mut scored: Vec<Scored> =
        survivors.into_iter().map(|candidate| Scored { candidate, score: 0.0 }).collect();
    let mut steps = Vec::new();

    let scorers: [(&str, f64, fn(&AllocationRequest, &[Scored]) -> Vec<f64>); 6] = [
        ("score-unreserved-ram", weights.unreserved_ram, normalized_ram),
        ("score-unreserved-disk", weights.unreserved_disk, normalized_disk),
        ("score-current-platform", weights.current_platform, normalized_platform),
        ("score-next-reboot", weights.next_reboot, normalized_next_reboot),
        ("score-num-owner-zones", weights.num_owner_zones, normalized_owner_zones),
        ("score-uniform-random", weights.uniform_random, uniform_random),
    ];

    for (name, weight, normalize) in scorers {
        if weight == 0.0 {
            continue;
        }
        let deltas = normalize(request, &scored);
        let mut reasons = HashMap::new();
        for (entry, delta) in scored.iter_mut().zip(&deltas) {
            let contribution = weight * delta;
            entry.score += contribution;
            reasons.insert(
                entry.candidate.server.uuid.to_string(),
                format!("increased score by {contribution:.2} to {:.2}", entry.score),
            );
        }
        steps.push(StepSummary { step: name.to_string(), remaining: uuids.clone(), reasons });
    }

    // Highest score first; ties resolve to the lowest uuid.
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.candidate.server.uuid.as_str().cmp(b.candidate.server.uuid.as_str()))
    });

    let winner = match scored.into_iter().next() {
        Some(s) => s.candidate,
        // run_filters guarantees survivors is non-empty.
        None => unreachable!("pick called with no survivors"),
    };
    (winner, steps)
}

/// Normalize a per-candidate metric into [0, 1] of the maximum.
fn normalize(values: Vec<f64>) -> Vec<f64> {
    let max = values.iter().cloned().fold(0.0_f64, f64::max);
    if max <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.into_iter().map(|v| (v / max).max(0.0)).collect()
}

fn normalized_ram(_request: &AllocationRequest, scored: &[Scored]) -> Vec<f64> {
    normalize(scored.iter().map(|s| s.candidate.unreserved_ram).collect())
}

fn normalized_disk(_request: &AllocationRequest, scored: &[Scored]) -> Vec<f64> {
    normalize(scored.iter().map(|s| s.candidate.unreserved_disk).collect())
}

/// Newer platforms rank higher: position in the sorted set of distinct
/// platform stamps.
fn normalized_platform(_request: &AllocationRequest, scored: &[Scored]) -> Vec<f64> {
    let mut platforms: Vec<&str> =
        scored.iter().map(|s| s.candidate.server.current_platform.as_str()).collect();
    platforms.sort_unstable();
    platforms.dedup();
    if platforms.len() <= 1 {
        return vec![1.0; scored.len()];
    }
    let denom = (platforms.len() - 1) as f64;
    scored
        .iter()
        .map(|s| {
            let pos = platforms
                .iter()
                .position(|p| *p == s.candidate.server.current_platform.as_str())
                .unwrap_or(0);
            pos as f64 / denom
        })
        .collect()
}

/// Servers with no scheduled reboot score full; an imminent one scores
/// toward zero.
fn normalized_next_reboot(_request: &AllocationRequest, scored: &[Scored]) -> Vec<f64> {
    let now = Utc::now();
    scored
        .iter()
        .map(|s| match s.candidate.server.next_reboot {
            None => 1.0,
            Some(at) => {
                let until = at.signed_duration_since(now).num_seconds();
                (until.clamp(0, NEXT_REBOOT_WINDOW_SECS) as f64) / NEXT_REBOOT_WINDOW_SECS as f64
            }
        })
        .collect()
}

/// Fewer of the owner's VMs on the server scores higher.
fn normalized_owner_zones(_request: &AllocationRequest, scored: &[Scored]) -> Vec<f64> {
    let max = scored.iter().map(|s| s.candidate.num_owner_vms).max().unwrap_or(0);
    if max == 0 {
        return vec![1.0; scored.len()];
    }
    scored
        .iter()
        .map(|s| 1.0 - (s.candidate.num_owner_vms as f64 / max as f64))
        .collect()
}

fn uniform_random(_request: &AllocationRequest, scored: &[Scored]) -> Vec<f64> {
    let mut rng = rand::thread_rng();
    scored.iter().map(|_| rng.gen_range(0.0..1.0)).collect()
}

#[cfg(test)]
#[path = "scorers_tests.rs"]
mod tests;
