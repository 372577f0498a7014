// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory repository.
//!
//! Backs the daemon binary and every test. The admin layer owns the write
//! side for servers, tokens, deployments, routes, mounts and manifests; the
//! seeding methods here stand in for it.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use fleet_core::server::hashes_match;
use fleet_core::{
    AgentStatus, AgentToken, AppManifest, CommandId, CommandLogEntry, CommandStatus, Deployment,
    DeploymentId, DeploymentStatus, Mount, MountId, MountStatus, MountUsage, ProxyRoute, Server,
    ServerId, ServerMount, ServerMountId, TokenId,
};

use crate::repo::{AutoMount, DeploymentRef, RepoError, Repository, TokenRef};

#[derive(Default)]
struct Tables {
    servers: HashMap<ServerId, Server>,
    tokens: HashMap<TokenId, AgentToken>,
    deployments: HashMap<DeploymentId, Deployment>,
    routes: HashMap<DeploymentId, ProxyRoute>,
    commands: HashMap<CommandId, CommandLogEntry>,
    mounts: HashMap<MountId, Mount>,
    server_mounts: HashMap<ServerMountId, ServerMount>,
    credentials: HashMap<MountId, Vec<u8>>,
    manifests: HashMap<String, AppManifest>,
}

/// Thread-safe in-memory store.
#[derive(Default)]
pub struct MemoryRepository {
    tables: Mutex<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Admin-side seeding ─────────────────────────────────────────────

    pub fn insert_server(&self, server: Server) {
        self.tables.lock().servers.insert(server.id.clone(), server);
    }

    pub fn insert_token(&self, token: AgentToken) {
        self.tables.lock().tokens.insert(token.id.clone(), token);
    }

    pub fn insert_deployment(&self, deployment: Deployment) {
        self.tables.lock().deployments.insert(deployment.id.clone(), deployment);
    }

    pub fn insert_route(&self, route: ProxyRoute) {
        self.tables.lock().routes.insert(route.deployment_id.clone(), route);
    }

    pub fn insert_mount(&self, mount: Mount) {
        self.tables.lock().mounts.insert(mount.id.clone(), mount);
    }

    pub fn insert_server_mount(&self, binding: ServerMount) {
        self.tables.lock().server_mounts.insert(binding.id.clone(), binding);
    }

    pub fn insert_credentials(&self, mount_id: MountId, encrypted: Vec<u8>) {
        self.tables.lock().credentials.insert(mount_id, encrypted);
    }

    pub fn insert_manifest(&self, manifest: AppManifest) {
        self.tables.lock().manifests.insert(manifest.app_name.clone(), manifest);
    }

    // ── Inspection (used by the admin API and by tests) ────────────────

    pub fn server(&self, id: &ServerId) -> Option<Server> {
        self.tables.lock().servers.get(id).cloned()
    }

    pub fn token(&self, id: &TokenId) -> Option<AgentToken> {
        self.tables.lock().tokens.get(id).cloned()
    }

    pub fn deployment(&self, id: &DeploymentId) -> Option<Deployment> {
        self.tables.lock().deployments.get(id).cloned()
    }

    pub fn route(&self, deployment_id: &DeploymentId) -> Option<ProxyRoute> {
        self.tables.lock().routes.get(deployment_id).cloned()
    }

    pub fn command(&self, id: &CommandId) -> Option<CommandLogEntry> {
        self.tables.lock().commands.get(id).cloned()
    }

    pub fn server_mount(&self, id: &ServerMountId) -> Option<ServerMount> {
        self.tables.lock().server_mounts.get(id).cloned()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn server_get(&self, id: &ServerId) -> Result<Option<Server>, RepoError> {
        Ok(self.tables.lock().servers.get(id).cloned())
    }

    async fn server_update_status(
        &self,
        id: &ServerId,
        status: AgentStatus,
        last_seen: Option<DateTime<Utc>>,
    ) -> Result<(), RepoError> {
        let mut tables = self.tables.lock();
        let server =
            tables.servers.get_mut(id).ok_or_else(|| RepoError::not_found("server", id))?;
        server.agent_status = status;
        if let Some(at) = last_seen {
            server.last_seen = Some(at);
        }
        Ok(())
    }

    async fn server_update_metrics(
        &self,
        id: &ServerId,
        metrics: Value,
        network_info: Option<Value>,
        last_seen: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        let mut tables = self.tables.lock();
        let server =
            tables.servers.get_mut(id).ok_or_else(|| RepoError::not_found("server", id))?;
        server.metrics = Some(metrics);
        if network_info.is_some() {
            server.network_info = network_info;
        }
        server.last_seen = Some(last_seen);
        Ok(())
    }

    async fn token_find_by_server_and_hash(
        &self,
        server_id: &ServerId,
        hash: &str,
    ) -> Result<Option<TokenRef>, RepoError> {
        let tables = self.tables.lock();
        Ok(tables
            .tokens
            .values()
            .filter(|t| &t.server_id == server_id)
            .find(|t| hashes_match(&t.token_hash, hash))
            .map(|t| TokenRef { id: t.id.clone(), expires_at: t.expires_at }))
    }

    async fn token_touch(&self, id: &TokenId, at: DateTime<Utc>) -> Result<(), RepoError> {
        let mut tables = self.tables.lock();
        let token = tables.tokens.get_mut(id).ok_or_else(|| RepoError::not_found("token", id))?;
        token.last_used_at = Some(at);
        Ok(())
    }

    async fn deployment_get(&self, id: &DeploymentId) -> Result<Option<Deployment>, RepoError> {
        Ok(self.tables.lock().deployments.get(id).cloned())
    }

    async fn deployment_get_by_server_and_app(
        &self,
        server_id: &ServerId,
        app_name: &str,
    ) -> Result<Option<DeploymentRef>, RepoError> {
        let tables = self.tables.lock();
        Ok(tables
            .deployments
            .values()
            .find(|d| &d.server_id == server_id && d.app_name == app_name)
            .map(|d| DeploymentRef {
                id: d.id.clone(),
                status: d.status,
                route_active: tables.routes.get(&d.id).map(|r| r.active),
            }))
    }

    async fn deployment_set_status_if_not_transient(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
    ) -> Result<bool, RepoError> {
        let mut tables = self.tables.lock();
        let deployment =
            tables.deployments.get_mut(id).ok_or_else(|| RepoError::not_found("deployment", id))?;
        if deployment.status.is_transient() {
            return Ok(false);
        }
        deployment.status = status;
        deployment.status_message = None;
        Ok(true)
    }

    async fn deployment_set_status(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
        message: Option<String>,
    ) -> Result<(), RepoError> {
        let mut tables = self.tables.lock();
        let deployment =
            tables.deployments.get_mut(id).ok_or_else(|| RepoError::not_found("deployment", id))?;
        deployment.status = status;
        deployment.status_message = message;
        Ok(())
    }

    async fn route_set_active(
        &self,
        deployment_id: &DeploymentId,
        active: bool,
    ) -> Result<(), RepoError> {
        let mut tables = self.tables.lock();
        let route = tables
            .routes
            .get_mut(deployment_id)
            .ok_or_else(|| RepoError::not_found("route", deployment_id))?;
        route.active = active;
        Ok(())
    }

    async fn command_insert(&self, entry: CommandLogEntry) -> Result<(), RepoError> {
        self.tables.lock().commands.insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn command_update(
        &self,
        id: &CommandId,
        status: CommandStatus,
        message: Option<String>,
        completed_at: DateTime<Utc>,
    ) -> Result<(), RepoError> {
        let mut tables = self.tables.lock();
        let entry =
            tables.commands.get_mut(id).ok_or_else(|| RepoError::not_found("command", id))?;
        entry.status = status;
        entry.result_message = message;
        entry.completed_at = Some(completed_at);
        Ok(())
    }

    async fn mounts_list_auto_for_server(
        &self,
        server_id: &ServerId,
    ) -> Result<Vec<AutoMount>, RepoError> {
        let tables = self.tables.lock();
        let mut out: Vec<AutoMount> = tables
            .server_mounts
            .values()
            .filter(|sm| &sm.server_id == server_id && sm.auto_mount)
            .filter_map(|sm| {
                tables
                    .mounts
                    .get(&sm.mount_id)
                    .map(|m| AutoMount { binding: sm.clone(), mount: m.clone() })
            })
            .collect();
        // Deterministic order for the sequential workflow
        out.sort_by(|a, b| a.binding.id.as_str().cmp(b.binding.id.as_str()));
        Ok(out)
    }

    async fn server_mount_set_status(
        &self,
        id: &ServerMountId,
        status: MountStatus,
        message: Option<String>,
        usage: Option<MountUsage>,
        checked_at: Option<DateTime<Utc>>,
    ) -> Result<(), RepoError> {
        let mut tables = self.tables.lock();
        let binding = tables
            .server_mounts
            .get_mut(id)
            .ok_or_else(|| RepoError::not_found("server mount", id))?;
        binding.status = status;
        binding.status_message = message;
        if let Some(usage) = usage {
            binding.usage_bytes = usage.usage_bytes;
            binding.total_bytes = usage.total_bytes;
        }
        if checked_at.is_some() {
            binding.last_checked = checked_at;
        }
        Ok(())
    }

    async fn mount_credentials_get(
        &self,
        mount_id: &MountId,
    ) -> Result<Option<Vec<u8>>, RepoError> {
        Ok(self.tables.lock().credentials.get(mount_id).cloned())
    }

    async fn app_manifest_get(&self, app_name: &str) -> Result<Option<AppManifest>, RepoError> {
        Ok(self.tables.lock().manifests.get(app_name).cloned())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
