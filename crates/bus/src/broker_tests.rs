// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Broker + TcpBus integration: real sockets on an ephemeral port.

use super::*;
use crate::bus::{Bus, QueueOptions};
use crate::client::TcpBus;
use serde_json::json;
use std::time::Duration;

async fn start_broker() -> (Broker, String) {
    let broker = Broker::bind("127.0.0.1:0").await.unwrap();
    let addr = broker.local_addr().to_string();
    (broker, addr)
}

#[tokio::test]
async fn publish_subscribe_over_tcp() {
    let (_broker, addr) = start_broker().await;
    let bus = TcpBus::connect(&addr);
    assert!(bus.wait_connected(Duration::from_secs(5)).await);

    bus.declare_queue("q", QueueOptions::default()).await.unwrap();
    bus.bind("q", "heartbeat.#").await.unwrap();
    let mut rx = bus.subscribe("q").await.unwrap();

    bus.publish("amq.topic", "heartbeat.cn1", json!({"vms": {}})).await.unwrap();

    let delivery = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.routing_key, "heartbeat.cn1");
    bus.shutdown();
}

#[tokio::test]
async fn two_clients_route_through_broker() {
    let (_broker, addr) = start_broker().await;
    let producer = TcpBus::connect(&addr);
    let consumer = TcpBus::connect(&addr);
    assert!(producer.wait_connected(Duration::from_secs(5)).await);
    assert!(consumer.wait_connected(Duration::from_secs(5)).await);

    consumer.declare_queue("inbox", QueueOptions::default()).await.unwrap();
    consumer.bind("inbox", "ur.sysinfo.#").await.unwrap();
    let mut rx = consumer.subscribe("inbox").await.unwrap();

    // Give the broker a beat to apply the consumer's frames.
    tokio::time::sleep(Duration::from_millis(50)).await;
    producer.publish("amq.topic", "ur.sysinfo.cn1", json!({"UUID": "cn1"})).await.unwrap();

    let delivery = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.payload["UUID"], "cn1");
    producer.shutdown();
    consumer.shutdown();
}

#[tokio::test]
async fn publish_while_disconnected_is_not_connected() {
    // Nothing listening on this port.
    let bus = TcpBus::connect("127.0.0.1:1");
    let err = bus.publish("amq.topic", "x.y", json!(null)).await.unwrap_err();
    assert!(matches!(err, crate::bus::BusError::NotConnected));
    bus.shutdown();
}

#[tokio::test]
async fn client_reconnects_and_replays_bindings() {
    let (broker, addr) = start_broker().await;
    let port = broker.local_addr().port();

    let bus = TcpBus::connect(&addr);
    assert!(bus.wait_connected(Duration::from_secs(5)).await);
    bus.declare_queue("q", QueueOptions::default()).await.unwrap();
    bus.bind("q", "x.#").await.unwrap();
    let mut rx = bus.subscribe("q").await.unwrap();

    // Kill the broker; the client should notice and start retrying.
    broker.shutdown();
    drop(broker);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Bring a fresh broker up on the same port.
    let broker2 = Broker::bind(&format!("127.0.0.1:{port}")).await.unwrap();
    assert!(bus.wait_connected(Duration::from_secs(10)).await);

    // The replayed declaration + binding must route this.
    tokio::time::sleep(Duration::from_millis(50)).await;
    bus.publish("amq.topic", "x.after-reconnect", json!(1)).await.unwrap();

    let delivery = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivery.routing_key, "x.after-reconnect");
    assert!(broker2.queue_count() >= 1);
    bus.shutdown();
}
