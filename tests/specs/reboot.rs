// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A rolling reboot over three servers with concurrency two.

use corral_core::test_support::sample_sysinfo;
use corral_core::{FakeClock, PlanAction, PlanState, ServerId};
use corral_engine::{
    FakeWorkflowAdapter, NewPlan, RebootOrchestrator, RegistryConfig, ServerRegistry,
};
use corral_store::{MemoryStore, ObjectStore};
use std::sync::Arc;

const S1: &str = "00000000-0000-0000-0000-000000000001";
const S2: &str = "00000000-0000-0000-0000-000000000002";
const S3: &str = "00000000-0000-0000-0000-000000000003";

#[tokio::test]
async fn bounded_concurrency_and_cancel() {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let clock = FakeClock::new();
    clock.set_epoch_ms(1_517_295_100_000);
    let registry = Arc::new(ServerRegistry::new(
        Arc::clone(&store),
        clock.clone(),
        RegistryConfig::default(),
    ));
    for uuid in [S1, S2, S3] {
        registry.upsert_from_sysinfo(sample_sysinfo(uuid)).await.unwrap();
    }

    let workflow = FakeWorkflowAdapter::new();
    let orchestrator = RebootOrchestrator::new(
        store,
        Arc::clone(&registry),
        Arc::new(workflow.clone()),
        clock.clone(),
    );

    let view = orchestrator
        .create_plan(NewPlan {
            servers: vec![
                ServerId::from_string(S1),
                ServerId::from_string(S2),
                ServerId::from_string(S3),
            ],
            concurrency: 2,
            single_step: false,
        })
        .await
        .unwrap();
    let plan = view.plan.uuid;

    orchestrator.apply_action(&plan, PlanAction::Run).await.unwrap();
    orchestrator.step().await.unwrap();

    // At most two in flight, non-headnodes in uuid order.
    let created = workflow.created();
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].params["server_uuid"], S1);
    assert_eq!(created[1].params["server_uuid"], S2);

    // Another pass without progress starts nothing new.
    orchestrator.step().await.unwrap();
    assert_eq!(workflow.created().len(), 2);

    // Cancel stamps canceled_at on every not-yet-operational reboot
    // within one director cycle.
    let view = orchestrator.apply_action(&plan, PlanAction::Cancel).await.unwrap();
    assert_eq!(view.plan.state, PlanState::Canceled);
    assert!(view.reboots.iter().all(|r| r.canceled_at.is_some()));

    orchestrator.step().await.unwrap();
    assert_eq!(workflow.created().len(), 2);
}
