// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frames exchanged between bus clients and the broker.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One protocol frame.
///
/// Serializes with `{"op": "publish", ...fields}` format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Frame {
    // -- client → broker --
    Publish {
        exchange: String,
        routing_key: String,
        payload: Value,
    },
    Declare {
        queue: String,
        #[serde(default)]
        exclusive: bool,
        #[serde(default)]
        auto_delete: bool,
    },
    Bind {
        queue: String,
        pattern: String,
    },
    Subscribe {
        queue: String,
    },
    Unsubscribe {
        queue: String,
    },
    Delete {
        queue: String,
    },

    // -- broker → client --
    Deliver {
        queue: String,
        routing_key: String,
        payload: Value,
    },
}
