// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Protocol version (from Cargo.toml)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolve state directory: CORRAL_STATE_DIR > XDG_STATE_HOME/corral >
/// ~/.local/state/corral
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("CORRAL_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("corral"));
    }
    let home = std::env::var("HOME").map_err(|_| LifecycleError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/corral"))
}

/// HTTP listen address (default 0.0.0.0:80 is the original's; we keep
/// an unprivileged default).
pub fn http_addr() -> String {
    std::env::var("CORRAL_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string())
}

/// Broker address the bus client dials.
pub fn bus_addr() -> String {
    std::env::var("CORRAL_BUS_ADDR").unwrap_or_else(|_| "127.0.0.1:5673".to_string())
}

/// Run the bundled broker in-process and dial it locally.
pub fn embedded_broker() -> bool {
    std::env::var("CORRAL_EMBEDDED_BROKER").map(|v| v == "1" || v == "true").unwrap_or(false)
}

/// Workflow engine base URL, when deployed.
pub fn workflow_url() -> Option<String> {
    std::env::var("CORRAL_WORKFLOW_URL").ok().filter(|s| !s.is_empty())
}

/// Datacenter name stamped on new server records.
pub fn datacenter() -> String {
    std::env::var("CORRAL_DATACENTER").unwrap_or_else(|_| "dc0".to_string())
}

/// Connection string CN agents get injected as the `rabbitmq` boot param.
pub fn rabbitmq() -> String {
    std::env::var("CORRAL_RABBITMQ").unwrap_or_else(|_| "guest:guest:localhost:5672".to_string())
}

pub fn rabbitmq_dns() -> String {
    std::env::var("CORRAL_RABBITMQ_DNS").ok().unwrap_or_else(rabbitmq)
}

/// Per-request deadline (default 1 hour, matching long task waits).
pub fn request_deadline() -> Duration {
    std::env::var("CORRAL_REQUEST_DEADLINE_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(3600))
}

/// Store snapshot cadence.
pub fn checkpoint_period() -> Duration {
    std::env::var("CORRAL_CHECKPOINT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(30))
}
