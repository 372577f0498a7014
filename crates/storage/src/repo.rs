// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The typed persistence operations the coordination core relies on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use fleet_core::{
    AgentStatus, AppManifest, CommandId, CommandLogEntry, CommandStatus, Deployment,
    DeploymentId, DeploymentStatus, Mount, MountId, MountStatus, MountUsage, Server, ServerId,
    ServerMount, ServerMountId, TokenId,
};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("storage error: {0}")]
    Storage(String),
}

impl RepoError {
    pub fn not_found(kind: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound { kind, id: id.to_string() }
    }
}

/// The projection of a deployment the reconciler and dispatcher work from.
#[derive(Debug, Clone)]
pub struct DeploymentRef {
    pub id: DeploymentId,
    pub status: DeploymentStatus,
    /// `active` flag of the attached proxy route, when one exists.
    pub route_active: Option<bool>,
}

/// Token-table hit for an authenticating agent.
#[derive(Debug, Clone)]
pub struct TokenRef {
    pub id: TokenId,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A server mount joined with its mount definition, ready for the
/// auto-mount workflow.
#[derive(Debug, Clone)]
pub struct AutoMount {
    pub binding: ServerMount,
    pub mount: Mount,
}

/// Typed persistence operations. Implementations provide their own
/// transactional guarantees; callers keep each call to the smallest
/// practical update per logical change.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn server_get(&self, id: &ServerId) -> Result<Option<Server>, RepoError>;

    async fn server_update_status(
        &self,
        id: &ServerId,
        status: AgentStatus,
        last_seen: Option<DateTime<Utc>>,
    ) -> Result<(), RepoError>;

    /// Persist a status report's server-level fields in one row update.
    async fn server_update_metrics(
        &self,
        id: &ServerId,
        metrics: Value,
        network_info: Option<Value>,
        last_seen: DateTime<Utc>,
    ) -> Result<(), RepoError>;

    /// Find an unrevoked token row for `server_id` whose stored hash matches
    /// `hash`. The comparison is constant-time inside the implementation;
    /// expiry is the caller's check.
    async fn token_find_by_server_and_hash(
        &self,
        server_id: &ServerId,
        hash: &str,
    ) -> Result<Option<TokenRef>, RepoError>;

    async fn token_touch(&self, id: &TokenId, at: DateTime<Utc>) -> Result<(), RepoError>;

    async fn deployment_get(&self, id: &DeploymentId) -> Result<Option<Deployment>, RepoError>;

    async fn deployment_get_by_server_and_app(
        &self,
        server_id: &ServerId,
        app_name: &str,
    ) -> Result<Option<DeploymentRef>, RepoError>;

    /// Apply a status unless the row currently holds a transient state.
    /// Returns whether the update was applied.
    async fn deployment_set_status_if_not_transient(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
    ) -> Result<bool, RepoError>;

    /// Unconditional status write, used by command-originated transitions.
    async fn deployment_set_status(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
        message: Option<String>,
    ) -> Result<(), RepoError>;

    async fn route_set_active(
        &self,
        deployment_id: &DeploymentId,
        active: bool,
    ) -> Result<(), RepoError>;

    async fn command_insert(&self, entry: CommandLogEntry) -> Result<(), RepoError>;

    async fn command_update(
        &self,
        id: &CommandId,
        status: CommandStatus,
        message: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepoError>;

    async fn mounts_list_auto_for_server(
        &self,
        server_id: &ServerId,
    ) -> Result<Vec<AutoMount>, RepoError>;

    async fn server_mount_set_status(
        &self,
        id: &ServerMountId,
        status: MountStatus,
        message: Option<String>,
        usage: Option<MountUsage>,
        checked_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepoError>;

    /// Encrypted credential blob for a mount, when one is stored.
    async fn mount_credentials_get(&self, mount_id: &MountId)
        -> Result<Option<Vec<u8>>, RepoError>;

    async fn app_manifest_get(&self, app_name: &str) -> Result<Option<AppManifest>, RepoError>;
}
