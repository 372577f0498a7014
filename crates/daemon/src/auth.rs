// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent authentication.
//!
//! Validates the `AgentAuth` frame that opens every connection. The core
//! server is locally trusted and connects without a token; every other
//! server must present a bearer token whose SHA-256 matches a row in the
//! token table (unexpired), or the server's legacy per-server hash.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use fleet_core::server::{hashes_match, token_hash};
use fleet_core::{Clock, Server, ServerId};
use fleet_storage::{RepoError, Repository};
use fleet_wire::AgentAuth;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("unknown server: {0}")]
    UnknownServer(ServerId),

    #[error("missing token for server {0}")]
    MissingToken(ServerId),

    #[error("invalid token for server {0}")]
    InvalidToken(ServerId),

    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct Authenticator {
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
}

impl Authenticator {
    pub fn new(repo: Arc<dyn Repository>, clock: Arc<dyn Clock>) -> Self {
        Self { repo, clock }
    }

    /// Validate a connect attempt. Returns the server row on success so the
    /// session does not need a second lookup.
    ///
    /// `peer` is the remote address, logged on rejection.
    pub async fn authenticate(&self, auth: &AgentAuth, peer: &str) -> Result<Server, AuthError> {
        let Some(server) = self.repo.server_get(&auth.server_id).await? else {
            warn!(server_id = %auth.server_id, %peer, "agent auth failed: unknown server");
            return Err(AuthError::UnknownServer(auth.server_id.clone()));
        };

        if server.is_core {
            debug!(server_id = %server.id, "core server connected without token");
            return Ok(server);
        }

        let Some(token) = auth.token.as_deref() else {
            warn!(server_id = %server.id, %peer, "agent auth failed: no token presented");
            return Err(AuthError::MissingToken(auth.server_id.clone()));
        };

        let now = self.clock.now();
        let hash = token_hash(token);

        if let Some(hit) = self.repo.token_find_by_server_and_hash(&server.id, &hash).await? {
            if matches!(hit.expires_at, Some(at) if at <= now) {
                warn!(server_id = %server.id, %peer, token_id = %hit.id, "agent auth failed: token expired");
                return Err(AuthError::InvalidToken(auth.server_id.clone()));
            }
            self.repo.token_touch(&hit.id, now).await?;
            return Ok(server);
        }

        // Legacy per-server token, kept until all agents are migrated
        if let Some(legacy) = server.legacy_token_hash.as_deref() {
            if hashes_match(legacy, &hash) {
                debug!(server_id = %server.id, "agent authenticated via legacy token");
                return Ok(server);
            }
        }

        warn!(server_id = %server.id, %peer, "agent auth failed: token mismatch");
        Err(AuthError::InvalidToken(auth.server_id.clone()))
    }
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
