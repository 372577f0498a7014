// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command vocabulary and the persisted command log.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::deployment::DeploymentId;
use crate::server::ServerId;

crate::define_id! {
    /// Identifier of a dispatched command.
    pub struct CommandId("cmd-");
}

/// Every command an agent can execute. Serialized in camelCase on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CommandAction {
    Install,
    Configure,
    Start,
    Stop,
    Restart,
    Uninstall,
    GetLogs,
    StreamLogs,
    StopStreamLogs,
    MountStorage,
    UnmountStorage,
    CheckMount,
    ConfigureKeepalived,
    CheckKeepalived,
}

/// Every command must be acknowledged within this window.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(10);

impl CommandAction {
    /// How long the agent gets between ack and completion.
    pub fn completion_timeout(self) -> Duration {
        match self {
            Self::Install => Duration::from_secs(10 * 60),
            Self::Configure
            | Self::Restart
            | Self::MountStorage
            | Self::ConfigureKeepalived => Duration::from_secs(60),
            Self::Start | Self::Stop | Self::UnmountStorage => Duration::from_secs(30),
            Self::Uninstall => Duration::from_secs(2 * 60),
            Self::CheckMount | Self::CheckKeepalived => Duration::from_secs(10),
            Self::GetLogs | Self::StreamLogs | Self::StopStreamLogs => Duration::from_secs(60),
        }
    }
}

crate::simple_display! {
    CommandAction {
        Install => "install",
        Configure => "configure",
        Start => "start",
        Stop => "stop",
        Restart => "restart",
        Uninstall => "uninstall",
        GetLogs => "getLogs",
        StreamLogs => "streamLogs",
        StopStreamLogs => "stopStreamLogs",
        MountStorage => "mountStorage",
        UnmountStorage => "unmountStorage",
        CheckMount => "checkMount",
        ConfigureKeepalived => "configureKeepalived",
        CheckKeepalived => "checkKeepalived",
    }
}

/// Terminal outcome of a command as reported by the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Success,
    Error,
}

/// Lifecycle of a command-log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Success,
    Error,
    Timeout,
}

impl From<ResultKind> for CommandStatus {
    fn from(kind: ResultKind) -> Self {
        match kind {
            ResultKind::Success => CommandStatus::Success,
            ResultKind::Error => CommandStatus::Error,
        }
    }
}

crate::simple_display! {
    CommandStatus {
        Pending => "pending",
        Success => "success",
        Error => "error",
        Timeout => "timeout",
    }
}

/// One row of the persisted command log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandLogEntry {
    pub id: CommandId,
    pub server_id: ServerId,
    pub deployment_id: Option<DeploymentId>,
    pub action: CommandAction,
    /// The full command envelope as sent, for audit.
    pub payload: Value,
    pub status: CommandStatus,
    pub result_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
