// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::registry::{ListServers, RegistryConfig};
use crate::workflow::FakeWorkflowAdapter;
use corral_core::test_support::sample_sysinfo;
use corral_core::FakeClock;
use corral_store::MemoryStore;

const S1: &str = "00000000-0000-0000-0000-000000000001";
const S2: &str = "00000000-0000-0000-0000-000000000002";
const S3: &str = "00000000-0000-0000-0000-000000000003";

struct Fixture {
    orchestrator: RebootOrchestrator<FakeClock>,
    registry: Arc<ServerRegistry<FakeClock>>,
    workflow: FakeWorkflowAdapter,
    clock: FakeClock,
}

async fn fixture(servers: &[&str]) -> Fixture {
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
    let clock = FakeClock::new();
    clock.set_epoch_ms(1_517_295_100_000);
    let registry = Arc::new(ServerRegistry::new(
        Arc::clone(&store),
        clock.clone(),
        RegistryConfig::default(),
    ));
    for uuid in servers {
        registry.upsert_from_sysinfo(sample_sysinfo(uuid)).await.unwrap();
    }
    let workflow = FakeWorkflowAdapter::new();
    let orchestrator = RebootOrchestrator::new(
        store,
        Arc::clone(&registry),
        Arc::new(workflow.clone()),
        clock.clone(),
    );
    Fixture { orchestrator, registry, workflow, clock }
}

fn new_plan(servers: &[&str], concurrency: u32) -> NewPlan {
    NewPlan {
        servers: servers.iter().map(|s| ServerId::from_string(s)).collect(),
        concurrency,
        single_step: false,
    }
}

/// Make a server look operational again: fresh heartbeat, current
/// platform equal to boot platform.
async fn make_operational(fx: &Fixture, uuid: &str) {
    let server = fx.registry.get(&ServerId::from_string(uuid)).await.unwrap();
    let store = fx.registry.store();
    let stored = store.get(corral_store::buckets::SERVERS, uuid).await.unwrap();
    let mut value = stored.value;
    value["current_platform"] = json!(server.boot_platform);
    value["last_heartbeat"] = json!(corral_core::epoch_ms_to_utc(fx.clock.epoch_ms()));
    store
        .put(
            corral_store::buckets::SERVERS,
            uuid,
            value,
            corral_store::PutOptions::must_match(stored.etag),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn create_plan_snapshots_servers() {
    let fx = fixture(&[S1, S2]).await;
    let view = fx.orchestrator.create_plan(new_plan(&[S1, S2], 2)).await.unwrap();

    assert_eq!(view.plan.state, PlanState::Created);
    assert_eq!(view.reboots.len(), 2);
    assert!(view.reboots.iter().all(|r| r.is_pending()));
    assert_eq!(view.reboots[0].current_platform, "20180125T023116Z");
}

#[tokio::test]
async fn create_plan_rejects_unknown_server() {
    let fx = fixture(&[S1]).await;
    let err = fx.orchestrator.create_plan(new_plan(&[S1, S2], 1)).await.unwrap_err();
    assert!(matches!(err, PlanError::Registry(RegistryError::NotFound(_))));
}

#[tokio::test]
async fn create_plan_rejects_server_in_pending_plan() {
    let fx = fixture(&[S1, S2]).await;
    fx.orchestrator.create_plan(new_plan(&[S1], 1)).await.unwrap();

    let err = fx.orchestrator.create_plan(new_plan(&[S1, S2], 1)).await.unwrap_err();
    assert!(matches!(err, PlanError::ServerBusy(uuid) if uuid == S1));
}

#[tokio::test]
async fn create_plan_rejects_zero_concurrency() {
    let fx = fixture(&[S1]).await;
    let err = fx.orchestrator.create_plan(new_plan(&[S1], 0)).await.unwrap_err();
    assert!(matches!(err, PlanError::BadConcurrency));
}

#[tokio::test]
async fn concurrency_bounds_in_flight_reboots() {
    let fx = fixture(&[S1, S2, S3]).await;
    let view = fx.orchestrator.create_plan(new_plan(&[S1, S2, S3], 2)).await.unwrap();
    fx.orchestrator.apply_action(&view.plan.uuid, PlanAction::Run).await.unwrap();

    fx.orchestrator.step().await.unwrap();

    // Two jobs only, lowest uuids first.
    let created = fx.workflow.created();
    assert_eq!(created.len(), 2);
    assert_eq!(created[0].params["server_uuid"], S1);
    assert_eq!(created[1].params["server_uuid"], S2);

    // Job completion alone does not free a slot; the server must come
    // back operational.
    fx.workflow.finish(created[0].uuid, JobOutcome::Succeeded);
    tokio::time::sleep(Duration::from_millis(50)).await;
    fx.orchestrator.step().await.unwrap();
    assert_eq!(fx.workflow.created().len(), 2);

    // S1 heartbeats on its boot platform: slot frees, S3 starts.
    make_operational(&fx, S1).await;
    fx.orchestrator.step().await.unwrap();
    let created = fx.workflow.created();
    assert_eq!(created.len(), 3);
    assert_eq!(created[2].params["server_uuid"], S3);
}

#[tokio::test]
async fn headnodes_reboot_last() {
    let fx = fixture(&[S1, S2]).await;
    // Make S1 a headnode; S2 must go first despite the higher uuid.
    fx.registry
        .store()
        .put(
            corral_store::buckets::SERVERS,
            S1,
            {
                let stored =
                    fx.registry.store().get(corral_store::buckets::SERVERS, S1).await.unwrap();
                let mut v = stored.value;
                v["headnode"] = json!(true);
                v
            },
            corral_store::PutOptions::default(),
        )
        .await
        .unwrap();

    let view = fx.orchestrator.create_plan(new_plan(&[S1, S2], 1)).await.unwrap();
    fx.orchestrator.apply_action(&view.plan.uuid, PlanAction::Run).await.unwrap();
    fx.orchestrator.step().await.unwrap();

    let created = fx.workflow.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].params["server_uuid"], S2);
}

#[tokio::test]
async fn plan_completes_when_all_operational() {
    let fx = fixture(&[S1]).await;
    let view = fx.orchestrator.create_plan(new_plan(&[S1], 1)).await.unwrap();
    let plan_uuid = view.plan.uuid;
    fx.orchestrator.apply_action(&plan_uuid, PlanAction::Run).await.unwrap();
    fx.orchestrator.step().await.unwrap();

    let job = fx.workflow.created()[0].uuid;
    fx.workflow.finish(job, JobOutcome::Succeeded);
    tokio::time::sleep(Duration::from_millis(50)).await;
    make_operational(&fx, S1).await;

    fx.orchestrator.step().await.unwrap();
    // One more pass so the freshly stamped operational_at is observed.
    fx.orchestrator.step().await.unwrap();

    let view = fx.orchestrator.get_plan(&plan_uuid).await.unwrap();
    assert_eq!(view.plan.state, PlanState::Complete);
    assert!(view.reboots[0].is_operational());
    assert!(view.reboots[0].finished_at.is_some());
}

#[tokio::test]
async fn cancel_stamps_unfinished_reboots() {
    let fx = fixture(&[S1, S2, S3]).await;
    let view = fx.orchestrator.create_plan(new_plan(&[S1, S2, S3], 1)).await.unwrap();
    let plan_uuid = view.plan.uuid;
    fx.orchestrator.apply_action(&plan_uuid, PlanAction::Run).await.unwrap();
    fx.orchestrator.step().await.unwrap();
    assert_eq!(fx.workflow.created().len(), 1);

    let view = fx.orchestrator.apply_action(&plan_uuid, PlanAction::Cancel).await.unwrap();
    assert_eq!(view.plan.state, PlanState::Canceled);
    assert!(view.reboots.iter().all(|r| r.is_canceled()));

    // No further starts after cancel.
    fx.orchestrator.step().await.unwrap();
    assert_eq!(fx.workflow.created().len(), 1);
}

#[tokio::test]
async fn stop_and_continue_round_trip() {
    let fx = fixture(&[S1, S2]).await;
    let view = fx.orchestrator.create_plan(new_plan(&[S1, S2], 1)).await.unwrap();
    let plan_uuid = view.plan.uuid;

    fx.orchestrator.apply_action(&plan_uuid, PlanAction::Run).await.unwrap();
    let view = fx.orchestrator.apply_action(&plan_uuid, PlanAction::Stop).await.unwrap();
    assert_eq!(view.plan.state, PlanState::Stopped);

    let view = fx.orchestrator.apply_action(&plan_uuid, PlanAction::Continue).await.unwrap();
    assert_eq!(view.plan.state, PlanState::Running);

    // Guarded transitions reject nonsense.
    let err = fx.orchestrator.apply_action(&plan_uuid, PlanAction::Continue).await.unwrap_err();
    assert!(matches!(err, PlanError::Transition(_)));
}

#[tokio::test]
async fn delete_requires_terminal_state() {
    let fx = fixture(&[S1]).await;
    let view = fx.orchestrator.create_plan(new_plan(&[S1], 1)).await.unwrap();
    let plan_uuid = view.plan.uuid;

    let err = fx.orchestrator.delete_plan(&plan_uuid).await.unwrap_err();
    assert!(matches!(err, PlanError::NotTerminal(PlanState::Created)));

    fx.orchestrator.apply_action(&plan_uuid, PlanAction::Cancel).await.unwrap();
    fx.orchestrator.delete_plan(&plan_uuid).await.unwrap();
    assert!(matches!(
        fx.orchestrator.get_plan(&plan_uuid).await,
        Err(PlanError::NotFound(_))
    ));
}

#[tokio::test]
async fn single_step_plan_stops_after_first_reboot() {
    let fx = fixture(&[S1, S2]).await;
    let view = fx
        .orchestrator
        .create_plan(NewPlan {
            servers: vec![ServerId::from_string(S1), ServerId::from_string(S2)],
            concurrency: 2,
            single_step: true,
        })
        .await
        .unwrap();
    let plan_uuid = view.plan.uuid;
    fx.orchestrator.apply_action(&plan_uuid, PlanAction::Run).await.unwrap();
    fx.orchestrator.step().await.unwrap();

    // single_step caps effective concurrency at 1.
    assert_eq!(fx.workflow.created().len(), 1);

    let job = fx.workflow.created()[0].uuid;
    fx.workflow.finish(job, JobOutcome::Succeeded);
    tokio::time::sleep(Duration::from_millis(50)).await;
    make_operational(&fx, S1).await;
    fx.orchestrator.step().await.unwrap();

    let view = fx.orchestrator.get_plan(&plan_uuid).await.unwrap();
    assert_eq!(view.plan.state, PlanState::Stopped);
    assert_eq!(fx.workflow.created().len(), 1);
}

#[tokio::test]
async fn reboot_server_creates_job_and_marks_rebooting() {
    let fx = fixture(&[S1]).await;
    let job = fx.orchestrator.reboot_server(&ServerId::from_string(S1)).await.unwrap();

    let created = fx.workflow.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].uuid, job);
    assert_eq!(created[0].workflow, REBOOT_WORKFLOW);

    let servers = fx.registry.list(&ListServers::default()).await.unwrap();
    assert_eq!(servers[0].status, corral_core::ServerStatus::Rebooting);
}
