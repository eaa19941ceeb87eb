// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote execution against a CN that never answers.

use corral_bus::{Bus, MemoryBus, Ur, UrError, QueueOptions};
use corral_core::ServerId;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[tokio::test]
async fn execute_times_out_and_tears_down_the_reply_queue() {
    let bus = MemoryBus::new();
    let ur = Ur::new(Arc::new(bus.clone())).with_grace(Duration::from_millis(10));
    let target = ServerId::from_string("00000000-0000-0000-0000-00000000dead");

    let started = Instant::now();
    let err = ur.execute(target, json!({"script": "echo hi"}), Duration::from_secs(1)).await;
    let elapsed = started.elapsed();

    let Err(UrError::CommandTimeout { reqid, .. }) = err else {
        panic!("expected CommandTimeout");
    };
    assert!(elapsed >= Duration::from_millis(900), "timed out early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "timed out late: {elapsed:?}");

    // The reply queue is destroyed: a late reply is routed nowhere and
    // no continuation can ever fire again.
    bus.publish(
        "ur",
        &format!("ur.execute-reply.{target}.{reqid}"),
        json!({"exit_status": 0, "stdout": "", "stderr": ""}),
    )
    .await
    .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn execute_round_trips_against_a_responder() {
    let bus = MemoryBus::new();
    let target = ServerId::from_string("00000000-0000-0000-0000-0000000000c1");

    // A CN agent answering executes for this uuid.
    bus.declare_queue("agent", QueueOptions::default()).await.unwrap();
    bus.bind("agent", &format!("ur.execute.{target}.*")).await.unwrap();
    let mut rx = bus.subscribe("agent").await.unwrap();
    let agent_bus = bus.clone();
    let agent_target = target;
    tokio::spawn(async move {
        while let Some(delivery) = rx.recv().await {
            let reqid = delivery.routing_key.split('.').nth(3).unwrap().to_string();
            agent_bus
                .publish(
                    "ur",
                    &format!("ur.execute-reply.{agent_target}.{reqid}"),
                    json!({"exit_status": 0, "stdout": "hi\n", "stderr": ""}),
                )
                .await
                .unwrap();
        }
    });

    let ur = Ur::new(Arc::new(bus)).with_grace(Duration::from_millis(10));
    let result = ur
        .execute(target, json!({"script": "echo hi"}), Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(result.exit_status, 0);
    assert_eq!(result.stdout, "hi\n");
}
