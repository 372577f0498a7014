// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deployment records, status vocabulary, and app manifests.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::server::ServerId;

crate::define_id! {
    /// Identifier of a deployment (an app pinned to one server).
    pub struct DeploymentId("dep-");
}

/// Persisted deployment status.
///
/// `Installing`, `Configuring`, and `Uninstalling` are *transient*: they mark
/// an orchestrator-driven operation in flight. Only a matching command result
/// may move a deployment out of a transient state; agent status reports must
/// never overwrite one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Installing,
    Configuring,
    Running,
    Stopped,
    Error,
    Uninstalling,
}

impl DeploymentStatus {
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Installing | Self::Configuring | Self::Uninstalling)
    }
}

crate::simple_display! {
    DeploymentStatus {
        Installing => "installing",
        Configuring => "configuring",
        Running => "running",
        Stopped => "stopped",
        Error => "error",
        Uninstalling => "uninstalling",
    }
}

/// App state as reported by an agent. Anything the agent sends that we do
/// not recognize maps to `stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    Running,
    Stopped,
    Error,
    #[serde(other)]
    Unknown,
}

impl AppState {
    pub fn to_deployment_status(self) -> DeploymentStatus {
        match self {
            AppState::Running => DeploymentStatus::Running,
            AppState::Stopped | AppState::Unknown => DeploymentStatus::Stopped,
            AppState::Error => DeploymentStatus::Error,
        }
    }
}

/// One app entry inside an agent status report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppReport {
    pub name: String,
    pub status: AppState,
}

/// A deployment row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    pub id: DeploymentId,
    pub server_id: ServerId,
    pub app_name: String,
    pub status: DeploymentStatus,
    pub status_message: Option<String>,
    pub version: Option<String>,
    pub config: Option<Value>,
}

/// Reverse-proxy route attached to a deployment. The core only toggles
/// `active` on running/stopped transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRoute {
    pub deployment_id: DeploymentId,
    pub active: bool,
}

/// The slice of an app manifest the coordination core reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppManifest {
    pub app_name: String,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Service unit to stream logs from, when it differs from the app name.
    #[serde(default)]
    pub service_name: Option<String>,
}

#[cfg(any(test, feature = "test-support"))]
impl Deployment {
    /// A stopped deployment for tests.
    pub fn test(
        id: impl Into<DeploymentId>,
        server_id: impl Into<ServerId>,
        app_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            server_id: server_id.into(),
            app_name: app_name.into(),
            status: DeploymentStatus::Stopped,
            status_message: None,
            version: None,
            config: None,
        }
    }
}

#[cfg(test)]
#[path = "deployment_tests.rs"]
mod tests;
