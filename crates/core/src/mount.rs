// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Network storage mounts: definitions, per-server bindings, credentials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::server::ServerId;

crate::define_id! {
    /// Identifier of a mount definition.
    pub struct MountId("mnt-");
}

crate::define_id! {
    /// Identifier of a mount bound to one server.
    pub struct ServerMountId("smt-");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountType {
    Nfs,
    Cifs,
}

crate::simple_display! {
    MountType {
        Nfs => "nfs",
        Cifs => "cifs",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountStatus {
    Unmounted,
    Mounting,
    Mounted,
    Error,
}

crate::simple_display! {
    MountStatus {
        Unmounted => "unmounted",
        Mounting => "mounting",
        Mounted => "mounted",
        Error => "error",
    }
}

/// A mount definition, shareable across servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mount {
    pub id: MountId,
    pub mount_type: MountType,
    /// Remote source, e.g. `nas:/export/media` or `//nas/share`.
    pub source: String,
    pub default_options: Option<String>,
}

/// A mount definition bound to one server at one mount point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerMount {
    pub id: ServerMountId,
    pub mount_id: MountId,
    pub server_id: ServerId,
    pub mount_point: String,
    /// Overrides the definition's `default_options` when set.
    pub options: Option<String>,
    pub auto_mount: bool,
    pub status: MountStatus,
    pub status_message: Option<String>,
    pub usage_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub last_checked: Option<DateTime<Utc>>,
}

/// Usage numbers an agent returns from `checkMount`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountUsage {
    pub usage_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
}

/// Decrypted CIFS credentials. Lives only for the duration of building a
/// `mountStorage` command; `Debug` redacts the password.
#[derive(Clone, Serialize, Deserialize)]
pub struct MountCredentials {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub domain: Option<String>,
}

impl std::fmt::Debug for MountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("domain", &self.domain)
            .finish()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl ServerMount {
    /// An auto-mount NFS binding for tests.
    pub fn test(
        id: impl Into<ServerMountId>,
        mount_id: impl Into<MountId>,
        server_id: impl Into<ServerId>,
    ) -> Self {
        Self {
            id: id.into(),
            mount_id: mount_id.into(),
            server_id: server_id.into(),
            mount_point: "/mnt/data".to_string(),
            options: None,
            auto_mount: true,
            status: MountStatus::Unmounted,
            status_message: None,
            usage_bytes: None,
            total_bytes: None,
            last_checked: None,
        }
    }
}
