// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auto-mount orchestration.
//!
//! Runs after every successful agent connect, off the connect path. Mounts
//! for one server are processed sequentially so the remote side never sees
//! interleaved mount commands; a failure on one mount never stops the rest.

use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, warn};

use fleet_core::{
    Clock, CommandAction, MountStatus, MountType, MountUsage, ResultKind, ServerId,
};
use fleet_storage::{AutoMount, RepoError, Repository};

use crate::dispatch::{CommandDispatcher, CommandError};
use crate::secrets::{SecretsBox, SecretsError};

#[derive(Debug, Error)]
enum MountError {
    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Secrets(#[from] SecretsError),
}

#[derive(Clone)]
pub struct MountOrchestrator {
    repo: Arc<dyn Repository>,
    dispatcher: CommandDispatcher,
    secrets: Arc<SecretsBox>,
    clock: Arc<dyn Clock>,
}

impl MountOrchestrator {
    pub fn new(
        repo: Arc<dyn Repository>,
        dispatcher: CommandDispatcher,
        secrets: Arc<SecretsBox>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { repo, dispatcher, secrets, clock }
    }

    /// Bring up every auto-mount for a freshly connected server.
    pub async fn run_for_server(&self, server_id: &ServerId) {
        let mounts = match self.repo.mounts_list_auto_for_server(server_id).await {
            Ok(mounts) => mounts,
            Err(e) => {
                warn!(server_id = %server_id, error = %e, "failed to list auto-mounts");
                return;
            }
        };
        if mounts.is_empty() {
            return;
        }

        info!(server_id = %server_id, count = mounts.len(), "running auto-mount workflow");
        for auto in mounts {
            let binding_id = auto.binding.id.clone();
            if let Err(e) = self.mount_one(server_id, &auto).await {
                warn!(
                    server_id = %server_id,
                    server_mount_id = %binding_id,
                    error = %e,
                    "auto-mount failed"
                );
                let persist = self
                    .repo
                    .server_mount_set_status(
                        &binding_id,
                        MountStatus::Error,
                        Some(e.to_string()),
                        None,
                        None,
                    )
                    .await;
                if let Err(e) = persist {
                    warn!(server_mount_id = %binding_id, error = %e, "failed to persist mount error");
                }
            }
        }
    }

    async fn mount_one(&self, server_id: &ServerId, auto: &AutoMount) -> Result<(), MountError> {
        let binding = &auto.binding;

        // Already mounted? Record usage and move on.
        let check = self
            .dispatcher
            .send_mount(
                server_id,
                CommandAction::CheckMount,
                json!({ "mountPoint": binding.mount_point }),
            )
            .await?;
        if check.status == ResultKind::Success && reports_mounted(&check.data) {
            self.repo
                .server_mount_set_status(
                    &binding.id,
                    MountStatus::Mounted,
                    None,
                    parse_usage(&check.data),
                    Some(self.clock.now()),
                )
                .await?;
            return Ok(());
        }

        self.repo
            .server_mount_set_status(&binding.id, MountStatus::Mounting, None, None, None)
            .await?;

        let mut payload = json!({
            "type": auto.mount.mount_type,
            "source": auto.mount.source,
            "mountPoint": binding.mount_point,
        });
        if let Some(options) =
            binding.options.as_deref().or(auto.mount.default_options.as_deref())
        {
            payload["options"] = options.into();
        }
        if auto.mount.mount_type == MountType::Cifs {
            if let Some(blob) = self.repo.mount_credentials_get(&auto.mount.id).await? {
                let credentials = self.secrets.decrypt(&blob)?;
                payload["credentials"] = serde_json::to_value(&credentials)
                    .map_err(SecretsError::Malformed)?;
            }
        }

        let outcome = self
            .dispatcher
            .send_mount(server_id, CommandAction::MountStorage, payload)
            .await?;
        match outcome.status {
            ResultKind::Success => {
                self.repo
                    .server_mount_set_status(
                        &binding.id,
                        MountStatus::Mounted,
                        None,
                        parse_usage(&outcome.data),
                        Some(self.clock.now()),
                    )
                    .await?;
            }
            ResultKind::Error => {
                self.repo
                    .server_mount_set_status(
                        &binding.id,
                        MountStatus::Error,
                        Some(outcome.message.unwrap_or_else(|| "mount failed".to_string())),
                        None,
                        None,
                    )
                    .await?;
            }
        }
        Ok(())
    }
}

fn reports_mounted(data: &Option<Value>) -> bool {
    data.as_ref().and_then(|d| d.get("mounted")).and_then(Value::as_bool) == Some(true)
}

fn parse_usage(data: &Option<Value>) -> Option<MountUsage> {
    let data = data.as_ref()?;
    let usage_bytes = data.get("usageBytes").and_then(Value::as_u64);
    let total_bytes = data.get("totalBytes").and_then(Value::as_u64);
    (usage_bytes.is_some() || total_bytes.is_some())
        .then_some(MountUsage { usage_bytes, total_bytes })
}

#[cfg(test)]
#[path = "mounts_tests.rs"]
mod tests;
