// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent sessions.
//!
//! One task per connected agent. A session authenticates the first frame,
//! runs the connect critical section under the server mutex, then pumps
//! inbound frames into the dispatcher, reconciler and log router until the
//! transport closes, at which point the teardown path settles everything
//! the connection owned.

mod transport;

pub use transport::{Transport, TransportClosed, TransportSender, WsTransport};

#[cfg(any(test, feature = "test-support"))]
pub use transport::{FakeAgent, FakeTransport};

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use fleet_core::{AgentStatus, Clock, ServerId, UiEvent};
use fleet_storage::Repository;
use fleet_wire::{Inbound, Outbound};

use crate::auth::Authenticator;
use crate::dispatch::CommandDispatcher;
use crate::event_bus::EventBus;
use crate::locks::MutexRegistry;
use crate::logs::LogStreamRouter;
use crate::mounts::MountOrchestrator;
use crate::reconcile::StatusReconciler;
use crate::registry::{Connection, ConnectionRegistry, HEARTBEAT_INTERVAL};

/// How long a fresh connection gets to present its auth frame.
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a session needs, shared across all sessions.
pub struct SessionCtx {
    pub repo: Arc<dyn Repository>,
    pub auth: Authenticator,
    pub registry: ConnectionRegistry,
    pub locks: MutexRegistry,
    pub dispatcher: CommandDispatcher,
    pub logs: LogStreamRouter,
    pub reconciler: StatusReconciler,
    pub mounts: MountOrchestrator,
    pub bus: EventBus,
    pub clock: Arc<dyn Clock>,
}

/// Run one agent connection to completion.
///
/// Returns when the transport closes, after teardown has settled the
/// connection's pending work. `peer` is the remote address, for auth logs.
pub async fn run_session<T: Transport>(ctx: Arc<SessionCtx>, mut transport: T, peer: String) {
    // The first frame must authenticate the agent.
    let first = match tokio::time::timeout(AUTH_TIMEOUT, transport.recv()).await {
        Ok(Some(frame)) => frame,
        Ok(None) => return,
        Err(_) => {
            warn!(%peer, "agent did not authenticate in time");
            transport.sender().close();
            return;
        }
    };
    let auth = match fleet_wire::decode_auth(&first) {
        Ok(auth) => auth,
        Err(e) => {
            warn!(%peer, error = %e, "rejecting connection: bad auth frame");
            transport.sender().close();
            return;
        }
    };
    let server = match ctx.auth.authenticate(&auth, &peer).await {
        Ok(server) => server,
        Err(_) => {
            // Already logged with the peer address by the authenticator
            transport.sender().close();
            return;
        }
    };

    let connection = bring_up(&ctx, &server.id, transport.sender()).await;
    info!(
        server_id = %server.id,
        generation = connection.generation,
        %peer,
        "agent connected"
    );

    while let Some(frame) = transport.recv().await {
        handle_frame(&ctx, &connection, &frame).await;
    }

    teardown(&ctx, connection).await;
}

/// Connect critical section. Atomic per server with respect to concurrent
/// disconnects and reconnects.
async fn bring_up(ctx: &Arc<SessionCtx>, server_id: &ServerId, sender: TransportSender) -> Connection {
    let _guard = ctx.locks.lock_server(server_id).await;

    // A reconnect displaces the previous connection; its session observes
    // the close and runs its own teardown, which the generation check keeps
    // from touching this entry.
    if let Some(previous) = ctx.registry.get(server_id) {
        info!(
            server_id = %server_id,
            displaced_generation = previous.generation,
            "displacing previous agent connection"
        );
        previous.shut_down();
    }

    let generation = ctx.registry.next_generation(server_id);
    let connection =
        Connection::new(server_id.clone(), generation, sender, ctx.clock.epoch_ms());
    ctx.registry.install(connection.clone());

    tokio::spawn(run_heartbeat(connection.clone()));

    if let Err(e) = ctx
        .repo
        .server_update_status(server_id, AgentStatus::Online, Some(ctx.clock.now()))
        .await
    {
        warn!(server_id = %server_id, error = %e, "failed to persist online status");
    }

    ctx.bus.publish(UiEvent::ServerConnected { server_id: server_id.clone() });

    // Ask for a snapshot right away rather than waiting a report interval
    send_to(&connection, &Outbound::RequestStatus).await;

    // Auto-mounts run in their own task; connect must not block on them
    let mounts = ctx.mounts.clone();
    let mount_server = server_id.clone();
    tokio::spawn(async move { mounts.run_for_server(&mount_server).await });

    connection
}

async fn handle_frame(ctx: &Arc<SessionCtx>, connection: &Connection, frame: &str) {
    // Any inbound traffic proves liveness
    connection.touch(ctx.clock.epoch_ms());

    let msg = match fleet_wire::decode_inbound(frame) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(
                server_id = %connection.server_id,
                error = %e,
                "dropping invalid agent frame"
            );
            return;
        }
    };

    match msg {
        Inbound::Pong => {}

        Inbound::Status(report) => {
            if let Err(e) = ctx.reconciler.apply(&connection.server_id, report).await {
                warn!(server_id = %connection.server_id, error = %e, "status reconciliation failed");
            }
        }

        Inbound::CommandAck { command_id, .. } => {
            ctx.dispatcher.handle_ack(&connection.server_id, connection.generation, &command_id);
        }

        Inbound::CommandResult(result) => {
            ctx.dispatcher.handle_result(&connection.server_id, connection.generation, result);
        }

        Inbound::LogsResult { command_id, status, logs } => {
            ctx.logs.handle_logs_result(&command_id, status, logs);
        }

        Inbound::LogStreamLine { stream_id, line, timestamp } => {
            ctx.logs.on_line(&stream_id, line, timestamp);
        }

        Inbound::LogStreamStatus { stream_id, status, message } => {
            ctx.logs.on_status(&stream_id, status, message);
        }
    }
}

/// Disconnect path. Settles everything the connection owned, whether the
/// close came from the peer, the sweep, a displacement, or shutdown.
async fn teardown(ctx: &Arc<SessionCtx>, connection: Connection) {
    let server_id = connection.server_id.clone();
    let _guard = ctx.locks.lock_server(&server_id).await;

    connection.heartbeat.cancel();
    connection.sender.close();

    // Only the current generation may evict the registry entry and persist
    // offline; a displaced session's successor is already live.
    let still_current = ctx.registry.remove_if_current(&server_id, connection.generation).is_some();

    ctx.dispatcher.fail_for_server(&server_id, connection.generation);

    if still_current {
        ctx.logs.fail_for_server(&server_id);

        if let Err(e) = ctx.repo.server_update_status(&server_id, AgentStatus::Offline, None).await
        {
            warn!(server_id = %server_id, error = %e, "failed to persist offline status");
        }
        ctx.bus.publish(UiEvent::ServerDisconnected { server_id: server_id.clone() });
        info!(server_id = %server_id, generation = connection.generation, "agent disconnected");
    } else {
        debug!(
            server_id = %server_id,
            generation = connection.generation,
            "displaced session torn down"
        );
    }
}

/// Pings the agent on a fixed cadence until the connection closes.
async fn run_heartbeat(connection: Connection) {
    let mut tick = tokio::time::interval(HEARTBEAT_INTERVAL);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tick.tick().await; // first tick is immediate; the connect path is fresh

    loop {
        tokio::select! {
            _ = connection.heartbeat.cancelled() => return,
            _ = tick.tick() => {}
        }
        match fleet_wire::encode(&Outbound::Ping) {
            Ok(frame) => {
                if connection.sender.send(frame).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to encode ping");
                return;
            }
        }
    }
}

async fn send_to(connection: &Connection, msg: &Outbound) {
    match fleet_wire::encode(msg) {
        Ok(frame) => {
            let _ = connection.sender.send(frame).await;
        }
        Err(e) => warn!(error = %e, "failed to encode frame"),
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
