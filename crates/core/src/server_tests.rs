// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clock::epoch_ms_to_utc;

const NOW_MS: u64 = 1_517_295_064_000;

#[test]
fn status_running_within_window() {
    let server = Server::builder()
        .last_heartbeat(epoch_ms_to_utc(NOW_MS - 3_000))
        .build();
    assert_eq!(server.status_at(NOW_MS), ServerStatus::Running);
}

#[test]
fn status_running_at_window_edge() {
    let server = Server::builder()
        .last_heartbeat(epoch_ms_to_utc(NOW_MS - HEARTBEAT_LIFETIME_SECONDS * 1000))
        .build();
    assert_eq!(server.status_at(NOW_MS), ServerStatus::Running);
}

#[test]
fn status_unknown_past_window() {
    let server = Server::builder()
        .last_heartbeat(epoch_ms_to_utc(NOW_MS - 12_000))
        .build();
    assert_eq!(server.status_at(NOW_MS), ServerStatus::Unknown);
}

#[test]
fn status_unknown_without_heartbeat() {
    let mut server = Server::builder().build();
    server.status = ServerStatus::Unknown;
    assert_eq!(server.status_at(NOW_MS), ServerStatus::Unknown);
}

#[test]
fn rebooting_sticks_until_heartbeat() {
    let mut server = Server::builder()
        .last_heartbeat(epoch_ms_to_utc(NOW_MS - 60_000))
        .build();
    server.status = ServerStatus::Rebooting;
    assert_eq!(server.status_at(NOW_MS), ServerStatus::Rebooting);

    // Fresh heartbeat flips back to running.
    server.last_heartbeat = Some(epoch_ms_to_utc(NOW_MS - 1_000));
    assert_eq!(server.status_at(NOW_MS), ServerStatus::Running);
}

#[test]
fn empty_record_has_defaults() {
    let server = Server::empty(ServerId::from_string("x"));
    assert!(!server.setup);
    assert_eq!(server.default_console, "serial");
    assert_eq!(server.serial, "ttyb");
    assert!((server.reservation_ratio - DEFAULT_RESERVATION_RATIO).abs() < f64::EPSILON);
}

#[test]
fn default_record_sentinel() {
    let server = Server::empty(ServerId::from_string(DEFAULT_SERVER_UUID));
    assert!(server.is_default_record());
    assert!(!Server::builder().build().is_default_record());
}

#[test]
fn serde_round_trip_preserves_admin_fields() {
    let mut server = Server::builder().build();
    server.boot_params.insert("rabbitmq".into(), "guest:guest:localhost:5672".into());
    server.traits.insert("ssd".into(), serde_json::json!(true));

    let json = serde_json::to_value(&server).unwrap();
    let back: Server = serde_json::from_value(json).unwrap();
    assert_eq!(back, server);
}

#[test]
fn totals_derive_from_sysinfo() {
    let server = Server::builder()
        .sysinfo(crate::test_support::sample_sysinfo("00000000-0000-0000-0000-000000000001"))
        .build();
    assert_eq!(server.ram_total_mib(), 65_422);
    assert_eq!(server.disk_total_mib(), 3_582 * 1024);
    assert_eq!(server.cpu_total_cores(), 32);
}
