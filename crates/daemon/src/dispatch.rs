// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command dispatch.
//!
//! Best-effort, at-most-once-sent, at-most-once-resolved command semantics.
//! Every in-flight command is a [`Pending`] record plus one watchdog task
//! that drives the ack→completion state machine; results are correlated
//! back to the connection generation that sent the command, so a reply
//! arriving after a reconnect can never resolve the wrong future.
//!
//! ```text
//!     created ──send──▶ pending(ack)
//!                         │
//!               ack ─────▶ pending(completion)
//!                         │
//!                result ─▶ terminal(success|error)
//!                ack-TO ─▶ terminal(timeout)
//!                compl-TO▶ terminal(timeout)
//!                gen≠cur ▶ dropped, future already dead
//!                disc. ─▶ terminal(error)
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Notify};
use tracing::{debug, info, warn};

use fleet_core::command::ACK_TIMEOUT;
use fleet_core::{
    Clock, CommandAction, CommandId, CommandLogEntry, CommandStatus, DeploymentId,
    DeploymentStatus, ResultKind, ServerId, UiEvent,
};
use fleet_storage::{RepoError, Repository};
use fleet_wire::{CommandEnvelope, CommandResultMsg, Outbound};

use crate::event_bus::EventBus;
use crate::locks::MutexRegistry;
use crate::registry::ConnectionRegistry;

pub const DISCONNECTED_MESSAGE: &str = "agent disconnected";
pub const SHUTDOWN_MESSAGE: &str = "shutting down";
pub const NO_ACK_MESSAGE: &str = "Agent did not acknowledge command";
pub const NO_COMPLETION_MESSAGE: &str = "Agent did not complete command in time";

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("no agent connected for server {0}")]
    NotConnected(ServerId),

    #[error("{NO_ACK_MESSAGE}")]
    AckTimeout,

    #[error("{NO_COMPLETION_MESSAGE}")]
    CompletionTimeout,

    #[error("{DISCONNECTED_MESSAGE}")]
    Disconnected,

    #[error("{SHUTDOWN_MESSAGE}")]
    ShuttingDown,

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Protocol(#[from] fleet_wire::ProtocolError),
}

/// What the agent reported for a completed command.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub status: ResultKind,
    pub message: Option<String>,
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AbortReason {
    Disconnected,
    ShuttingDown,
}

enum Signal {
    Ack,
    Result(CommandResultMsg),
    Abort(AbortReason),
}

enum Terminal {
    Result(CommandResultMsg),
    AckTimeout,
    CompletionTimeout,
    Aborted(AbortReason),
}

/// Dispatcher-owned record of one in-flight command.
struct Pending {
    server_id: ServerId,
    generation: u64,
    signals: mpsc::UnboundedSender<Signal>,
}

struct WatchCtx {
    command_id: CommandId,
    server_id: ServerId,
    action: CommandAction,
    deployment_id: Option<DeploymentId>,
}

struct DispatcherInner {
    repo: Arc<dyn Repository>,
    registry: ConnectionRegistry,
    locks: MutexRegistry,
    bus: EventBus,
    clock: Arc<dyn Clock>,
    pending: Mutex<HashMap<CommandId, Pending>>,
    drained: Notify,
}

#[derive(Clone)]
pub struct CommandDispatcher {
    inner: Arc<DispatcherInner>,
}

impl CommandDispatcher {
    pub fn new(
        repo: Arc<dyn Repository>,
        registry: ConnectionRegistry,
        locks: MutexRegistry,
        bus: EventBus,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                repo,
                registry,
                locks,
                bus,
                clock,
                pending: Mutex::new(HashMap::new()),
                drained: Notify::new(),
            }),
        }
    }

    /// Fire-and-forget send. Returns false when no agent is connected.
    pub async fn send(
        &self,
        server_id: &ServerId,
        action: CommandAction,
        app_name: Option<String>,
        payload: Option<Value>,
        deployment_id: Option<DeploymentId>,
    ) -> Result<bool, CommandError> {
        match self.dispatch(server_id, action, app_name, payload, deployment_id, None).await {
            Ok(_) => Ok(true),
            Err(CommandError::NotConnected(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Send and await the terminal outcome.
    pub async fn send_and_wait(
        &self,
        server_id: &ServerId,
        action: CommandAction,
        app_name: Option<String>,
        payload: Option<Value>,
        deployment_id: Option<DeploymentId>,
    ) -> Result<CommandOutcome, CommandError> {
        let (tx, rx) = oneshot::channel();
        self.dispatch(server_id, action, app_name, payload, deployment_id, Some(tx)).await?;
        match rx.await {
            Ok(outcome) => outcome,
            // Watchdog gone without answering; treated as a drop
            Err(_) => Err(CommandError::Disconnected),
        }
    }

    /// Mount-command variant: no app name, no deployment.
    pub async fn send_mount(
        &self,
        server_id: &ServerId,
        action: CommandAction,
        payload: Value,
    ) -> Result<CommandOutcome, CommandError> {
        self.send_and_wait(server_id, action, None, Some(payload), None).await
    }

    async fn dispatch(
        &self,
        server_id: &ServerId,
        action: CommandAction,
        app_name: Option<String>,
        payload: Option<Value>,
        deployment_id: Option<DeploymentId>,
        waiter: Option<oneshot::Sender<Result<CommandOutcome, CommandError>>>,
    ) -> Result<CommandId, CommandError> {
        let Some(connection) = self.inner.registry.get(server_id) else {
            return Err(CommandError::NotConnected(server_id.clone()));
        };

        let envelope = CommandEnvelope { id: CommandId::generate(), action, app_name, payload };
        let command_id = envelope.id.clone();
        let frame = fleet_wire::encode(&Outbound::Command(envelope.clone()))?;

        self.inner
            .repo
            .command_insert(CommandLogEntry {
                id: command_id.clone(),
                server_id: server_id.clone(),
                deployment_id: deployment_id.clone(),
                action,
                payload: serde_json::to_value(&envelope)
                    .map_err(|e| RepoError::Storage(e.to_string()))?,
                status: CommandStatus::Pending,
                result_message: None,
                created_at: self.inner.clock.now(),
                completed_at: None,
            })
            .await?;

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        self.inner.pending.lock().insert(
            command_id.clone(),
            Pending {
                server_id: server_id.clone(),
                generation: connection.generation,
                signals: signal_tx.clone(),
            },
        );

        let ctx = WatchCtx {
            command_id: command_id.clone(),
            server_id: server_id.clone(),
            action,
            deployment_id,
        };
        tokio::spawn(watch(Arc::clone(&self.inner), ctx, signal_rx, waiter));

        debug!(
            command_id = %command_id,
            server_id = %server_id,
            %action,
            generation = connection.generation,
            "command dispatched"
        );

        if connection.sender.send(frame).await.is_err() {
            // Transport died between lookup and send; the watchdog cleans up
            let _ = signal_tx.send(Signal::Abort(AbortReason::Disconnected));
        }

        Ok(command_id)
    }

    /// Agent acknowledged a command. Gated on the receiving connection's
    /// generation like results, so a stale ack cannot silence a live timer.
    pub fn handle_ack(&self, server_id: &ServerId, generation: u64, command_id: &CommandId) {
        let pending = self.inner.pending.lock();
        let Some(entry) = pending.get(command_id) else {
            debug!(%command_id, "ack for unknown command");
            return;
        };
        if &entry.server_id != server_id || entry.generation != generation {
            info!(%command_id, generation, "dropping stale ack");
            return;
        }
        let _ = entry.signals.send(Signal::Ack);
    }

    /// Agent delivered a terminal result. Resolves the pending future only
    /// when the receiving connection generation matches the one the command
    /// was sent on.
    pub fn handle_result(&self, server_id: &ServerId, generation: u64, msg: CommandResultMsg) {
        let pending = self.inner.pending.lock();
        let Some(entry) = pending.get(&msg.command_id) else {
            debug!(command_id = %msg.command_id, "result for unknown or already-settled command");
            return;
        };
        if &entry.server_id != server_id || entry.generation != generation {
            info!(
                command_id = %msg.command_id,
                sent_on = entry.generation,
                received_on = generation,
                "dropping stale command result from prior connection"
            );
            return;
        }
        let _ = entry.signals.send(Signal::Result(msg));
    }

    /// Fail every pending command sent on `server_id` at or before
    /// `generation`. Teardown path; newer-generation commands are left alone.
    pub fn fail_for_server(&self, server_id: &ServerId, generation: u64) {
        let pending = self.inner.pending.lock();
        for entry in pending.values() {
            if &entry.server_id == server_id && entry.generation <= generation {
                let _ = entry.signals.send(Signal::Abort(AbortReason::Disconnected));
            }
        }
    }

    /// Reject everything still pending. Shutdown path.
    pub fn fail_all(&self) {
        let pending = self.inner.pending.lock();
        for entry in pending.values() {
            let _ = entry.signals.send(Signal::Abort(AbortReason::ShuttingDown));
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Wait for the pending table to empty, up to `deadline`. Returns
    /// whether it fully drained.
    pub async fn drain(&self, deadline: Duration) -> bool {
        let timeout = tokio::time::sleep(deadline);
        tokio::pin!(timeout);
        loop {
            let notified = self.inner.drained.notified();
            if self.inner.pending.lock().is_empty() {
                return true;
            }
            tokio::select! {
                _ = &mut timeout => return self.inner.pending.lock().is_empty(),
                _ = notified => {}
            }
        }
    }
}

/// Drives one command through ack → completion → terminal.
async fn watch(
    inner: Arc<DispatcherInner>,
    ctx: WatchCtx,
    mut signals: mpsc::UnboundedReceiver<Signal>,
    waiter: Option<oneshot::Sender<Result<CommandOutcome, CommandError>>>,
) {
    let terminal = 'outcome: {
        // Phase 1: ack window
        let ack_deadline = tokio::time::sleep(ACK_TIMEOUT);
        tokio::pin!(ack_deadline);
        loop {
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(Signal::Ack) => break,
                    // Result without an ack still settles the command
                    Some(Signal::Result(msg)) => break 'outcome Terminal::Result(msg),
                    Some(Signal::Abort(reason)) => break 'outcome Terminal::Aborted(reason),
                    None => break 'outcome Terminal::Aborted(AbortReason::ShuttingDown),
                },
                _ = &mut ack_deadline => break 'outcome Terminal::AckTimeout,
            }
        }

        // Phase 2: completion window, sized per action
        let completion_deadline = tokio::time::sleep(ctx.action.completion_timeout());
        tokio::pin!(completion_deadline);
        loop {
            tokio::select! {
                signal = signals.recv() => match signal {
                    Some(Signal::Result(msg)) => break 'outcome Terminal::Result(msg),
                    Some(Signal::Ack) => {} // duplicate ack; deadline keeps running
                    Some(Signal::Abort(reason)) => break 'outcome Terminal::Aborted(reason),
                    None => break 'outcome Terminal::Aborted(AbortReason::ShuttingDown),
                },
                _ = &mut completion_deadline => break 'outcome Terminal::CompletionTimeout,
            }
        }
    };

    finalize(inner, ctx, terminal, waiter).await;
}

async fn finalize(
    inner: Arc<DispatcherInner>,
    ctx: WatchCtx,
    terminal: Terminal,
    waiter: Option<oneshot::Sender<Result<CommandOutcome, CommandError>>>,
) {
    inner.pending.lock().remove(&ctx.command_id);
    inner.drained.notify_waiters();

    let now = inner.clock.now();
    match terminal {
        Terminal::Result(msg) => {
            record(&inner, &ctx, msg.status.into(), msg.message.clone(), now).await;

            if let Some(deployment_id) = &ctx.deployment_id {
                if let Some(status) = map_result_status(ctx.action, msg.status) {
                    let _guard = inner.locks.lock_deployment(deployment_id).await;
                    if let Err(e) = inner
                        .repo
                        .deployment_set_status(deployment_id, status, msg.message.clone())
                        .await
                    {
                        warn!(%deployment_id, error = %e, "failed to apply command result status");
                    }
                }
            }

            inner.bus.publish(UiEvent::CommandResult {
                server_id: ctx.server_id.clone(),
                command_id: ctx.command_id.clone(),
                status: msg.status,
                message: msg.message.clone(),
            });

            if let Some(waiter) = waiter {
                let _ = waiter.send(Ok(CommandOutcome {
                    status: msg.status,
                    message: msg.message,
                    data: msg.data,
                }));
            }
        }

        Terminal::AckTimeout | Terminal::CompletionTimeout => {
            let (message, error) = match terminal {
                Terminal::AckTimeout => (NO_ACK_MESSAGE, CommandError::AckTimeout),
                _ => (NO_COMPLETION_MESSAGE, CommandError::CompletionTimeout),
            };
            warn!(
                command_id = %ctx.command_id,
                server_id = %ctx.server_id,
                action = %ctx.action,
                "{message}"
            );
            record(&inner, &ctx, CommandStatus::Timeout, Some(message.to_string()), now).await;

            if let Some(deployment_id) = &ctx.deployment_id {
                let _guard = inner.locks.lock_deployment(deployment_id).await;
                if let Err(e) = inner
                    .repo
                    .deployment_set_status(
                        deployment_id,
                        DeploymentStatus::Error,
                        Some(format!("Command {} timed out", ctx.action)),
                    )
                    .await
                {
                    warn!(%deployment_id, error = %e, "failed to mark deployment after timeout");
                }
            }

            if let Some(waiter) = waiter {
                let _ = waiter.send(Err(error));
            }
        }

        Terminal::Aborted(reason) => {
            let (message, error) = match reason {
                AbortReason::Disconnected => (DISCONNECTED_MESSAGE, CommandError::Disconnected),
                AbortReason::ShuttingDown => (SHUTDOWN_MESSAGE, CommandError::ShuttingDown),
            };
            record(&inner, &ctx, CommandStatus::Error, Some(message.to_string()), now).await;
            // Deployment untouched: the agent may still be executing
            if let Some(waiter) = waiter {
                let _ = waiter.send(Err(error));
            }
        }
    }
}

async fn record(
    inner: &DispatcherInner,
    ctx: &WatchCtx,
    status: CommandStatus,
    message: Option<String>,
    completed_at: chrono::DateTime<chrono::Utc>,
) {
    if let Err(e) = inner.repo.command_update(&ctx.command_id, status, message, completed_at).await
    {
        warn!(command_id = %ctx.command_id, error = %e, "failed to update command log");
    }
}

/// Deployment status a terminal result maps to. `None` means the command
/// does not own the deployment's status (uninstall success is finalized by
/// the external deletion path).
fn map_result_status(action: CommandAction, result: ResultKind) -> Option<DeploymentStatus> {
    match result {
        ResultKind::Error => Some(DeploymentStatus::Error),
        ResultKind::Success => match action {
            CommandAction::Install | CommandAction::Configure | CommandAction::Stop => {
                Some(DeploymentStatus::Stopped)
            }
            CommandAction::Start => Some(DeploymentStatus::Running),
            _ => None,
        },
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
