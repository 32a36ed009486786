// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane protocol for host <-> runner <-> client communication.
//!
//! Three surfaces:
//! - JSON DTOs for the HTTP control plane ([`messages`])
//! - terminal WebSocket messages ([`terminal`])
//! - the SSH-multiplex channel: 4-byte length prefix (big-endian) framing
//!   with a JSON hello followed by binary frames ([`frame`])

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod frame;
mod messages;
mod terminal;

pub use frame::{
    read_frame, read_hello, read_message, write_frame, write_hello, write_message, ChannelFlag,
    Frame, FrameError, ProxyHello, MAX_FRAME_PAYLOAD,
};
pub use messages::{
    Ack, AggregateHealth, ControlRequest, FailedTarget, HealthResponse, HealthSample,
    HeartbeatPayload, KilledTask, NodeHealth, NodeStatusEntry, RegisterRequest, StatusUpdate,
    SubmitRequest, SubmitResponse, TaskSpec, VpsCreateResponse, VpsSpec,
};
pub use terminal::{TermClientMessage, TermServerMessage};
