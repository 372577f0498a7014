// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Events the orchestrator broadcasts to UI consumers.
//!
//! The serialized form is the contract with the web layer; variant tags and
//! field names are wire-stable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::{CommandId, ResultKind};
use crate::deployment::{AppReport, DeploymentId, DeploymentStatus};
use crate::server::ServerId;

crate::define_id! {
    /// Identifier of a live log stream, shared by all of its subscribers.
    pub struct StreamId("str-");
}

impl StreamId {
    /// Stream ids embed the deployment and the creation time so concurrent
    /// re-subscriptions after a teardown never collide.
    pub fn for_deployment(deployment_id: &DeploymentId, epoch_ms: u64) -> Self {
        Self::from_string(format!("{}-{}", deployment_id, epoch_ms))
    }
}

crate::define_id! {
    /// Identifier of a UI client attached to the log router.
    pub struct ClientId("cli-");
}

/// Orchestrator→UI notifications. Fan-out is best-effort; slow consumers
/// miss events rather than applying back-pressure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all_fields = "camelCase")]
pub enum UiEvent {
    #[serde(rename = "server:connected")]
    ServerConnected { server_id: ServerId },

    #[serde(rename = "server:disconnected")]
    ServerDisconnected { server_id: ServerId },

    /// Emitted after each reconciled status report.
    #[serde(rename = "server:status")]
    ServerStatus { server_id: ServerId, metrics: Value, apps: Vec<AppReport> },

    #[serde(rename = "deployment:status")]
    DeploymentStatus {
        deployment_id: DeploymentId,
        server_id: ServerId,
        previous_status: DeploymentStatus,
        status: DeploymentStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        route_active: Option<bool>,
    },

    #[serde(rename = "command:result")]
    CommandResult {
        server_id: ServerId,
        command_id: CommandId,
        status: ResultKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    #[serde(rename = "deployment:log")]
    DeploymentLog {
        deployment_id: DeploymentId,
        stream_id: StreamId,
        line: String,
        timestamp: u64,
    },

    #[serde(rename = "deployment:log:status")]
    DeploymentLogStatus {
        deployment_id: DeploymentId,
        #[serde(skip_serializing_if = "Option::is_none")]
        stream_id: Option<StreamId>,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
