// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent wire protocol.
//!
//! Wire format: one JSON object per WebSocket text frame, tagged by `type`.
//! The orchestrator validates every inbound frame by typed deserialization
//! and drops frames that do not parse.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod codec;
mod inbound;
mod outbound;

pub use codec::{decode_auth, decode_inbound, encode, ProtocolError, MAX_FRAME_BYTES};
pub use inbound::{AgentAuth, CommandResultMsg, Inbound, LogStreamState, StatusReport};
pub use outbound::{CommandEnvelope, Outbound};
