// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use fleet_core::{AppReport, CommandId, ResultKind, ServerId, StreamId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The first frame an agent must send after the transport handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAuth {
    pub server_id: ServerId,
    /// Absent for the core server, which is locally trusted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Agent→orchestrator messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Inbound {
    /// Heartbeat answer.
    #[serde(rename = "pong")]
    Pong,

    /// Periodic (or requested) snapshot of the server and its apps.
    #[serde(rename = "status")]
    Status(StatusReport),

    /// The agent received a command and started working on it.
    #[serde(rename = "command:ack")]
    #[serde(rename_all = "camelCase")]
    CommandAck {
        command_id: CommandId,
        #[serde(default)]
        received_at: Option<u64>,
    },

    /// Terminal outcome of a command.
    #[serde(rename = "command:result")]
    CommandResult(CommandResultMsg),

    /// Answer to a one-shot `getLogs` command.
    #[serde(rename = "logs:result")]
    #[serde(rename_all = "camelCase")]
    LogsResult {
        command_id: CommandId,
        status: ResultKind,
        #[serde(default)]
        logs: Vec<Value>,
    },

    /// One line of a live log stream.
    #[serde(rename = "logs:stream:line")]
    #[serde(rename_all = "camelCase")]
    LogStreamLine { stream_id: StreamId, line: String, timestamp: u64 },

    /// Stream lifecycle notification.
    #[serde(rename = "logs:stream:status")]
    #[serde(rename_all = "camelCase")]
    LogStreamStatus {
        stream_id: StreamId,
        status: LogStreamState,
        #[serde(default)]
        message: Option<String>,
    },
}

/// Status snapshot sent by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub timestamp: u64,
    pub metrics: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_info: Option<Value>,
    #[serde(default)]
    pub apps: Vec<AppReport>,
}

/// Terminal command outcome as reported by the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResultMsg {
    pub command_id: CommandId,
    pub status: ResultKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStreamState {
    Started,
    Stopped,
    Error,
}

fleet_core::simple_display! {
    LogStreamState {
        Started => "started",
        Stopped => "stopped",
        Error => "error",
    }
}

#[cfg(test)]
#[path = "inbound_tests.rs"]
mod tests;
