// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Boot parameters served to netbooting CNs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// What a CN needs to netboot: a platform image plus kernel arguments.
///
/// `kernel_args` is the server-specific `boot_params` merged over the
/// default record's, with the mandatory `rabbitmq`, `rabbitmq_dns`, and
/// `hostname` keys injected by the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BootParams {
    pub platform: String,
    pub kernel_args: HashMap<String, String>,
    pub kernel_flags: HashMap<String, Value>,
    pub boot_modules: Vec<Value>,
    pub default_console: String,
    pub serial: String,
}

impl BootParams {
    /// Merge `overlay` on top of `base`, overlay winning per key.
    pub fn merge_args(
        base: &HashMap<String, String>,
        overlay: &HashMap<String, String>,
    ) -> HashMap<String, String> {
        let mut merged = base.clone();
        for (k, v) in overlay {
            merged.insert(k.clone(), v.clone());
        }
        merged
    }
}

#[cfg(test)]
#[path = "bootparams_tests.rs"]
mod tests;
