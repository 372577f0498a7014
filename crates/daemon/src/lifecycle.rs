// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: wiring, the agent listener, graceful shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::OsRng;
use rand::Rng;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use fleet_core::{Clock, SystemClock};
use fleet_storage::Repository;
use fleet_wire::Outbound;

use crate::auth::Authenticator;
use crate::dispatch::CommandDispatcher;
use crate::event_bus::EventBus;
use crate::locks::MutexRegistry;
use crate::logs::LogStreamRouter;
use crate::mounts::MountOrchestrator;
use crate::proxy::ProxyController;
use crate::reconcile::StatusReconciler;
use crate::registry::{run_sweep, ConnectionRegistry};
use crate::secrets::{SecretsBox, SecretsError};
use crate::session::{run_session, SessionCtx, WsTransport};

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/fleet)
    pub state_dir: PathBuf,
    /// Listen address for agent WebSocket connections
    pub agent_addr: String,
    /// How long shutdown waits for in-flight commands
    pub drain_timeout: Duration,
    /// Hex key for the mount-credentials secrets box
    pub secrets_key: Option<String>,
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self, LifecycleError> {
        Ok(Self {
            state_dir: crate::env::state_dir()?,
            agent_addr: crate::env::agent_addr(),
            drain_timeout: crate::env::drain_timeout(),
            secrets_key: crate::env::secrets_key(),
        })
    }

    /// Config for in-process tests: ephemeral port, fast drain.
    #[cfg(any(test, feature = "test-support"))]
    pub fn test() -> Self {
        Self {
            state_dir: std::env::temp_dir(),
            agent_addr: "127.0.0.1:0".to_string(),
            drain_timeout: Duration::from_secs(30),
            secrets_key: None,
        }
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory")]
    NoStateDir,

    #[error("Failed to bind agent listener at {0}: {1}")]
    BindFailed(String, std::io::Error),

    #[error(transparent)]
    Secrets(#[from] SecretsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Counters for the readiness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DaemonStats {
    pub connected_agents: usize,
    pub pending_commands: usize,
    pub server_locks: usize,
    pub deployment_locks: usize,
    pub log_streams: usize,
    pub pending_log_fetches: usize,
}

/// The assembled coordination core.
pub struct Daemon {
    config: Config,
    ctx: Arc<SessionCtx>,
    shutdown: CancellationToken,
}

impl Daemon {
    pub fn new(
        config: Config,
        repo: Arc<dyn Repository>,
        proxy: Arc<dyn ProxyController>,
    ) -> Result<Self, LifecycleError> {
        Self::with_clock(config, repo, proxy, Arc::new(SystemClock))
    }

    /// Assemble the daemon with an explicit clock (tests inject a fake).
    pub fn with_clock(
        config: Config,
        repo: Arc<dyn Repository>,
        proxy: Arc<dyn ProxyController>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, LifecycleError> {
        let secrets = match config.secrets_key.as_deref() {
            Some(hex) => SecretsBox::from_hex(hex)?,
            None => {
                // Ephemeral key: previously stored credentials will not
                // decrypt until a key is configured
                warn!("FLEET_SECRETS_KEY not set, using an ephemeral secrets key");
                let mut key = [0u8; 32];
                OsRng.fill(&mut key);
                SecretsBox::new(&key)
            }
        };

        let bus = EventBus::new();
        let locks = MutexRegistry::new();
        let registry = ConnectionRegistry::new();
        let dispatcher = CommandDispatcher::new(
            Arc::clone(&repo),
            registry.clone(),
            locks.clone(),
            bus.clone(),
            Arc::clone(&clock),
        );
        let logs = LogStreamRouter::new(Arc::clone(&repo), registry.clone(), Arc::clone(&clock));
        let reconciler = StatusReconciler::new(
            Arc::clone(&repo),
            locks.clone(),
            bus.clone(),
            proxy,
            Arc::clone(&clock),
        );
        let mounts = MountOrchestrator::new(
            Arc::clone(&repo),
            dispatcher.clone(),
            Arc::new(secrets),
            Arc::clone(&clock),
        );
        let auth = Authenticator::new(Arc::clone(&repo), Arc::clone(&clock));

        let ctx = Arc::new(SessionCtx {
            repo,
            auth,
            registry: registry.clone(),
            locks,
            dispatcher,
            logs,
            reconciler,
            mounts,
            bus,
            clock: Arc::clone(&clock),
        });

        let shutdown = CancellationToken::new();
        tokio::spawn(run_sweep(registry, clock, shutdown.clone()));

        Ok(Self { config, ctx, shutdown })
    }

    /// Shared component context. Sessions spawned outside `serve` (tests,
    /// embedded transports) run against the same state.
    pub fn ctx(&self) -> Arc<SessionCtx> {
        Arc::clone(&self.ctx)
    }

    pub fn bus(&self) -> &EventBus {
        &self.ctx.bus
    }

    pub fn stats(&self) -> DaemonStats {
        DaemonStats {
            connected_agents: self.ctx.registry.len(),
            pending_commands: self.ctx.dispatcher.pending_count(),
            server_locks: self.ctx.locks.server_lock_count(),
            deployment_locks: self.ctx.locks.deployment_lock_count(),
            log_streams: self.ctx.logs.stream_count(),
            pending_log_fetches: self.ctx.logs.pending_fetch_count(),
        }
    }

    /// Accept agent connections until shutdown.
    pub async fn serve(&self) -> Result<(), LifecycleError> {
        let listener = TcpListener::bind(&self.config.agent_addr)
            .await
            .map_err(|e| LifecycleError::BindFailed(self.config.agent_addr.clone(), e))?;
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "listening for agents");
        }

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return Ok(()),
                result = listener.accept() => match result {
                    Ok((stream, peer)) => {
                        let ctx = Arc::clone(&self.ctx);
                        tokio::spawn(async move {
                            match tokio_tungstenite::accept_async(stream).await {
                                Ok(ws) => {
                                    run_session(ctx, WsTransport::new(ws), peer.to_string()).await;
                                }
                                Err(e) => {
                                    debug!(%peer, error = %e, "websocket handshake failed");
                                }
                            }
                        });
                    }
                    Err(e) => error!("accept error: {}", e),
                },
            }
        }
    }

    /// Graceful shutdown: advise agents, drain in-flight commands, then
    /// close everything down.
    pub async fn shutdown(&self) {
        info!("shutting down");
        self.shutdown.cancel();

        // 1. Advisory broadcast
        let timestamp = self.ctx.clock.epoch_ms();
        if let Ok(frame) = fleet_wire::encode(&Outbound::Shutdown { timestamp }) {
            for connection in self.ctx.registry.all() {
                let _ = connection.sender.send(frame.clone()).await;
            }
        }

        // 2. Drain, then reject whatever is left
        if !self.ctx.dispatcher.drain(self.config.drain_timeout).await {
            warn!(
                remaining = self.ctx.dispatcher.pending_count(),
                "drain deadline hit, rejecting remaining commands"
            );
            self.ctx.dispatcher.fail_all();
            // Give the watchdogs a beat to settle their command-log rows
            let _ = self.ctx.dispatcher.drain(Duration::from_secs(1)).await;
        }

        // 3. Close every connection; sessions run their teardown paths
        for connection in self.ctx.registry.all() {
            connection.shut_down();
        }
        self.await_registry_empty(Duration::from_secs(5)).await;

        // 4. Pending log work
        self.ctx.logs.reject_all();

        info!("shutdown complete");
    }

    /// Wait for session teardowns to finish after their transports closed.
    async fn await_registry_empty(&self, deadline: Duration) {
        let timeout = tokio::time::sleep(deadline);
        tokio::pin!(timeout);
        loop {
            if self.ctx.registry.is_empty() {
                return;
            }
            tokio::select! {
                _ = &mut timeout => {
                    warn!(remaining = self.ctx.registry.len(), "sessions still tearing down at deadline");
                    return;
                }
                _ = tokio::time::sleep(Duration::from_millis(10)) => {}
            }
        }
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
