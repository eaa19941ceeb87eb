// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! corral-bus: the topic-routed message bus between the control plane
//! and CN agents, plus the Ur request/reply layer on top of it.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.
//!
//! Three `Bus` implementations share one routing core: [`MemoryBus`]
//! (in-process), [`TcpBus`] (persistent client with backoff reconnect),
//! and [`Broker`] (the TCP server side, for tests and single-box
//! deployments).

mod bus;
mod broker;
mod client;
mod frame;
mod memory;
mod router;
pub mod topic;
pub mod ur;
mod wire;

pub use bus::{Bus, BusError, Delivery, QueueOptions};
pub use broker::Broker;
pub use client::{ReconnectPolicy, TcpBus};
pub use frame::Frame;
pub use memory::MemoryBus;
pub use ur::{ExecResult, SysinfoMessage, Ur, UrError};
pub use wire::{decode, encode, read_frame, write_frame, ProtocolError, MAX_FRAME_BYTES};
