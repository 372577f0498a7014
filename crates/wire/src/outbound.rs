// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use fleet_core::{CommandAction, CommandId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Orchestrator→agent messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Outbound {
    /// Heartbeat probe; the agent answers with `pong`.
    #[serde(rename = "ping")]
    Ping,

    /// Ask for an immediate status snapshot.
    #[serde(rename = "request_status")]
    RequestStatus,

    /// Execute a command.
    #[serde(rename = "command")]
    Command(CommandEnvelope),

    /// Advisory broadcast that the orchestrator is going down.
    #[serde(rename = "server:shutdown")]
    Shutdown { timestamp: u64 },
}

/// The command payload an agent executes.
///
/// App lifecycle commands carry `app_name`; mount and keepalived commands
/// carry everything they need in `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandEnvelope {
    pub id: CommandId,
    pub action: CommandAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

#[cfg(test)]
#[path = "outbound_tests.rs"]
mod tests;
