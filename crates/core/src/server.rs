// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server records and agent-token verification primitives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

crate::define_id! {
    /// Identifier of a managed server. Assigned by the admin layer.
    pub struct ServerId("srv-");
}

crate::define_id! {
    /// Identifier of an agent token row.
    pub struct TokenId("tok-");
}

/// Connectivity of a server's agent, as persisted on the server row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Online,
    Offline,
}

crate::simple_display! {
    AgentStatus {
        Online => "online",
        Offline => "offline",
    }
}

/// A managed server. Created and deleted by the admin layer; the
/// coordination core only transitions `agent_status`, `last_seen`, and the
/// metrics columns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub id: ServerId,
    pub name: String,
    pub host: String,
    /// The locally-trusted server the orchestrator itself runs on.
    /// Its agent connects without a token.
    pub is_core: bool,
    pub agent_status: AgentStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub metrics: Option<Value>,
    pub network_info: Option<Value>,
    /// Pre-token-table per-server token hash. Checked only when no row in
    /// the token table matches.
    pub legacy_token_hash: Option<String>,
}

/// One row of the agent-token table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentToken {
    pub id: TokenId,
    pub server_id: ServerId,
    /// Hex-encoded SHA-256 of the bearer token.
    pub token_hash: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl AgentToken {
    /// A token with `expires_at` in the past is invalid.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Hex-encoded SHA-256 of a presented bearer token.
pub fn token_hash(token: &str) -> String {
    use std::fmt::Write as _;

    let digest = Sha256::digest(token.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

/// Constant-time equality for token hashes.
///
/// Unequal lengths are an immediate mismatch; equal-length buffers compare
/// through `subtle`, whose compiler barriers prevent LLVM from turning the
/// comparison into an early-exit loop.
pub fn hashes_match(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    bool::from(a.ct_eq(b))
}

#[cfg(any(test, feature = "test-support"))]
impl Server {
    /// A minimal online-capable server for tests.
    pub fn test(id: impl Into<ServerId>) -> Self {
        let id = id.into();
        Self {
            name: id.to_string(),
            host: format!("{}.internal", id),
            is_core: false,
            agent_status: AgentStatus::Offline,
            last_seen: None,
            metrics: None,
            network_info: None,
            legacy_token_hash: None,
            id,
        }
    }
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
