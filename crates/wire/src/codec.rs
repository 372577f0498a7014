// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame codec: serde-backed encode/decode with a size guard.

use serde::Serialize;
use thiserror::Error;

use crate::inbound::{AgentAuth, Inbound};

/// Upper bound on a single frame. Log lines and metrics blobs fit with
/// plenty of room; anything larger is a misbehaving agent.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame of {0} bytes exceeds limit")]
    FrameTooLarge(usize),

    #[error("invalid frame: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Serialize an outbound message to a text frame.
pub fn encode<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(msg)?)
}

/// Parse and validate an inbound agent frame.
///
/// Unknown `type` tags and malformed payloads both surface as `Invalid`;
/// the session logs and drops them.
pub fn decode_inbound(frame: &str) -> Result<Inbound, ProtocolError> {
    if frame.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge(frame.len()));
    }
    Ok(serde_json::from_str(frame)?)
}

/// Parse the authentication frame that opens every agent connection.
pub fn decode_auth(frame: &str) -> Result<AgentAuth, ProtocolError> {
    if frame.len() > MAX_FRAME_BYTES {
        return Err(ProtocolError::FrameTooLarge(frame.len()));
    }
    Ok(serde_json::from_str(frame)?)
}

#[cfg(test)]
#[path = "codec_tests.rs"]
mod tests;
