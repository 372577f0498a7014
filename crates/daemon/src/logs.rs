// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Log streaming.
//!
//! One agent-side stream per deployment, shared by every UI client watching
//! it. The router owns the subscription table: it starts agent streaming
//! when the first client joins, fans lines out to all joined clients, and
//! stops agent streaming when the last client leaves. One-shot log fetches
//! (`getLogs`) are tracked separately with a single overall timeout.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use fleet_core::{
    ClientId, Clock, CommandAction, CommandId, DeploymentId, ResultKind, ServerId, StreamId,
    UiEvent,
};
use fleet_storage::Repository;
use fleet_wire::{CommandEnvelope, LogStreamState, Outbound};

use crate::registry::ConnectionRegistry;

/// Overall deadline for a one-shot log fetch.
pub const LOG_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum LogRequestError {
    #[error("no agent connected for server {0}")]
    NotConnected(ServerId),

    #[error("agent did not return logs in time")]
    Timeout,

    #[error("agent disconnected")]
    Disconnected,

    #[error("shutting down")]
    ShuttingDown,
}

/// Result of a one-shot `getLogs` fetch.
#[derive(Debug, Clone)]
pub struct LogFetch {
    pub status: ResultKind,
    pub logs: Vec<Value>,
}

/// A UI client attached to the router. Events that concern only this client
/// (and log fan-out, which is per-subscriber) go through its own channel
/// rather than the broadcast bus.
#[derive(Clone)]
pub struct ClientHandle {
    pub id: ClientId,
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl ClientHandle {
    pub fn new(id: ClientId) -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }

    fn notify(&self, event: UiEvent) {
        let _ = self.tx.send(event);
    }
}

struct Subscription {
    deployment_id: DeploymentId,
    server_id: ServerId,
    clients: HashMap<ClientId, ClientHandle>,
}

struct PendingFetch {
    server_id: ServerId,
    tx: oneshot::Sender<LogFetch>,
}

#[derive(Default)]
struct RouterInner {
    streams: HashMap<StreamId, Subscription>,
    by_deployment: HashMap<DeploymentId, StreamId>,
    by_client: HashMap<ClientId, HashSet<StreamId>>,
    fetches: HashMap<CommandId, PendingFetch>,
}

#[derive(Clone)]
pub struct LogStreamRouter {
    repo: Arc<dyn Repository>,
    registry: ConnectionRegistry,
    clock: Arc<dyn Clock>,
    inner: Arc<Mutex<RouterInner>>,
}

impl LogStreamRouter {
    pub fn new(
        repo: Arc<dyn Repository>,
        registry: ConnectionRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { repo, registry, clock, inner: Arc::new(Mutex::new(RouterInner::default())) }
    }

    /// Attach a client to a deployment's log stream, starting agent-side
    /// streaming if this is the first subscriber. Failures are reported to
    /// the requesting client only.
    pub async fn subscribe(&self, client: ClientHandle, deployment_id: &DeploymentId) {
        let deployment = match self.repo.deployment_get(deployment_id).await {
            Ok(Some(d)) => d,
            Ok(None) => {
                client.notify(log_status(deployment_id, None, "error", "deployment not found"));
                return;
            }
            Err(e) => {
                client.notify(log_status(deployment_id, None, "error", &e.to_string()));
                return;
            }
        };

        let Some(connection) = self.registry.get(&deployment.server_id) else {
            client.notify(log_status(deployment_id, None, "error", "agent is offline"));
            return;
        };

        // Join an existing stream when one is live for this deployment.
        let stream_id = {
            let mut inner = self.inner.lock();
            if let Some(stream_id) = inner.by_deployment.get(deployment_id).cloned() {
                if let Some(subscription) = inner.streams.get_mut(&stream_id) {
                    subscription.clients.insert(client.id.clone(), client.clone());
                }
                inner.by_client.entry(client.id.clone()).or_default().insert(stream_id.clone());
                Some(stream_id)
            } else {
                None
            }
        };
        if let Some(stream_id) = stream_id {
            client.notify(log_status(
                deployment_id,
                Some(&stream_id),
                "started",
                "joined existing stream",
            ));
            return;
        }

        let stream_id = StreamId::for_deployment(deployment_id, self.clock.epoch_ms());

        // The manifest may name a different service unit to stream from
        let service_name = match self.repo.app_manifest_get(&deployment.app_name).await {
            Ok(manifest) => manifest
                .and_then(|m| m.logging.and_then(|l| l.service_name))
                .unwrap_or_else(|| deployment.app_name.clone()),
            Err(_) => deployment.app_name.clone(),
        };

        {
            let mut inner = self.inner.lock();
            inner.streams.insert(
                stream_id.clone(),
                Subscription {
                    deployment_id: deployment_id.clone(),
                    server_id: deployment.server_id.clone(),
                    clients: HashMap::from([(client.id.clone(), client.clone())]),
                },
            );
            inner.by_deployment.insert(deployment_id.clone(), stream_id.clone());
            inner.by_client.entry(client.id.clone()).or_default().insert(stream_id.clone());
        }

        // The stream id doubles as the command id so agent-side state and
        // router state share one key.
        let envelope = CommandEnvelope {
            id: CommandId::from_string(stream_id.as_str()),
            action: CommandAction::StreamLogs,
            app_name: Some(deployment.app_name.clone()),
            payload: Some(serde_json::json!({ "serviceName": service_name })),
        };
        if !self.send_frame(&connection.sender, &Outbound::Command(envelope)).await {
            self.drop_stream(&stream_id);
            client.notify(log_status(deployment_id, None, "error", "agent is offline"));
        }
    }

    /// Detach a client from a deployment's stream. The last client out
    /// stops agent-side streaming.
    pub async fn unsubscribe(&self, client_id: &ClientId, deployment_id: &DeploymentId) {
        let stop = {
            let mut inner = self.inner.lock();
            let Some(stream_id) = inner.by_deployment.get(deployment_id).cloned() else {
                return;
            };
            remove_client_from_stream(&mut inner, client_id, &stream_id)
        };
        if let Some((stream_id, server_id)) = stop {
            self.stop_agent_stream(&stream_id, &server_id).await;
        }
    }

    /// Drop every subscription a disconnecting client holds.
    pub async fn client_disconnected(&self, client_id: &ClientId) {
        let stops = {
            let mut inner = self.inner.lock();
            let streams = inner.by_client.remove(client_id).unwrap_or_default();
            streams
                .into_iter()
                .filter_map(|stream_id| {
                    inner.streams.get_mut(&stream_id).and_then(|s| {
                        s.clients.remove(client_id);
                        s.clients.is_empty().then(|| {
                            let server_id = s.server_id.clone();
                            let deployment_id = s.deployment_id.clone();
                            (stream_id.clone(), server_id, deployment_id)
                        })
                    })
                })
                .collect::<Vec<_>>()
        };
        for (stream_id, server_id, deployment_id) in stops {
            {
                let mut inner = self.inner.lock();
                inner.streams.remove(&stream_id);
                inner.by_deployment.remove(&deployment_id);
            }
            self.stop_agent_stream(&stream_id, &server_id).await;
        }
    }

    /// Fan a stream line out to every subscriber.
    pub fn on_line(&self, stream_id: &StreamId, line: String, timestamp: u64) {
        let inner = self.inner.lock();
        let Some(subscription) = inner.streams.get(stream_id) else {
            debug!(%stream_id, "line for unknown stream, dropping");
            return;
        };
        for client in subscription.clients.values() {
            client.notify(UiEvent::DeploymentLog {
                deployment_id: subscription.deployment_id.clone(),
                stream_id: stream_id.clone(),
                line: line.clone(),
                timestamp,
            });
        }
    }

    /// Forward a stream lifecycle change; `stopped` and `error` tear the
    /// subscription down.
    pub fn on_status(&self, stream_id: &StreamId, status: LogStreamState, message: Option<String>) {
        let mut inner = self.inner.lock();
        let terminal = matches!(status, LogStreamState::Stopped | LogStreamState::Error);
        let subscription = if terminal {
            let Some(subscription) = inner.streams.remove(stream_id) else {
                return;
            };
            inner.by_deployment.remove(&subscription.deployment_id);
            for client_id in subscription.clients.keys() {
                if let Some(set) = inner.by_client.get_mut(client_id) {
                    set.remove(stream_id);
                }
            }
            subscription
        } else {
            match inner.streams.get(stream_id) {
                Some(s) => Subscription {
                    deployment_id: s.deployment_id.clone(),
                    server_id: s.server_id.clone(),
                    clients: s.clients.clone(),
                },
                None => return,
            }
        };

        for client in subscription.clients.values() {
            client.notify(UiEvent::DeploymentLogStatus {
                deployment_id: subscription.deployment_id.clone(),
                stream_id: Some(stream_id.clone()),
                status: status.to_string(),
                message: message.clone(),
            });
        }
    }

    /// One-shot log fetch with an overall deadline.
    pub async fn request_logs(
        &self,
        server_id: &ServerId,
        app_name: &str,
        options: Value,
        timeout: Duration,
    ) -> Result<LogFetch, LogRequestError> {
        let Some(connection) = self.registry.get(server_id) else {
            return Err(LogRequestError::NotConnected(server_id.clone()));
        };

        let command_id = CommandId::generate();
        let (tx, rx) = oneshot::channel();
        self.inner
            .lock()
            .fetches
            .insert(command_id.clone(), PendingFetch { server_id: server_id.clone(), tx });

        let envelope = CommandEnvelope {
            id: command_id.clone(),
            action: CommandAction::GetLogs,
            app_name: Some(app_name.to_string()),
            payload: Some(options),
        };
        if !self.send_frame(&connection.sender, &Outbound::Command(envelope)).await {
            self.inner.lock().fetches.remove(&command_id);
            return Err(LogRequestError::Disconnected);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            // Sender dropped: disconnect or shutdown cleared the fetch
            Ok(Err(_)) => Err(LogRequestError::Disconnected),
            Err(_) => {
                self.inner.lock().fetches.remove(&command_id);
                Err(LogRequestError::Timeout)
            }
        }
    }

    /// Resolve a pending fetch from a `logs:result` frame.
    pub fn handle_logs_result(&self, command_id: &CommandId, status: ResultKind, logs: Vec<Value>) {
        let Some(fetch) = self.inner.lock().fetches.remove(command_id) else {
            debug!(%command_id, "logs result for unknown request");
            return;
        };
        let _ = fetch.tx.send(LogFetch { status, logs });
    }

    /// Agent gone: reject its pending fetches and tear down its streams,
    /// telling their clients why.
    pub fn fail_for_server(&self, server_id: &ServerId) {
        let mut inner = self.inner.lock();
        inner.fetches.retain(|_, fetch| &fetch.server_id != server_id);

        let dead: Vec<StreamId> = inner
            .streams
            .iter()
            .filter(|(_, s)| &s.server_id == server_id)
            .map(|(id, _)| id.clone())
            .collect();
        for stream_id in dead {
            teardown_stream(&mut inner, &stream_id, "agent disconnected");
        }
    }

    /// Shutdown: reject every pending fetch and close every stream.
    pub fn reject_all(&self) {
        let mut inner = self.inner.lock();
        inner.fetches.clear();
        let all: Vec<StreamId> = inner.streams.keys().cloned().collect();
        for stream_id in all {
            teardown_stream(&mut inner, &stream_id, "shutting down");
        }
    }

    /// Live subscription count, for the stats probe.
    pub fn stream_count(&self) -> usize {
        self.inner.lock().streams.len()
    }

    pub fn pending_fetch_count(&self) -> usize {
        self.inner.lock().fetches.len()
    }

    async fn stop_agent_stream(&self, stream_id: &StreamId, server_id: &ServerId) {
        let Some(connection) = self.registry.get(server_id) else {
            return;
        };
        let envelope = CommandEnvelope {
            id: CommandId::from_string(stream_id.as_str()),
            action: CommandAction::StopStreamLogs,
            app_name: None,
            payload: Some(serde_json::json!({ "streamId": stream_id })),
        };
        self.send_frame(&connection.sender, &Outbound::Command(envelope)).await;
    }

    async fn send_frame(&self, sender: &crate::session::TransportSender, msg: &Outbound) -> bool {
        match fleet_wire::encode(msg) {
            Ok(frame) => sender.send(frame).await.is_ok(),
            Err(e) => {
                warn!(error = %e, "failed to encode log command");
                false
            }
        }
    }

    fn drop_stream(&self, stream_id: &StreamId) {
        let mut inner = self.inner.lock();
        if let Some(subscription) = inner.streams.remove(stream_id) {
            inner.by_deployment.remove(&subscription.deployment_id);
            for client_id in subscription.clients.keys() {
                if let Some(set) = inner.by_client.get_mut(client_id) {
                    set.remove(stream_id);
                }
            }
        }
    }
}

/// Remove a client from a stream; returns `(stream, server)` when the
/// stream emptied and agent-side streaming should stop.
fn remove_client_from_stream(
    inner: &mut RouterInner,
    client_id: &ClientId,
    stream_id: &StreamId,
) -> Option<(StreamId, ServerId)> {
    if let Some(set) = inner.by_client.get_mut(client_id) {
        set.remove(stream_id);
        if set.is_empty() {
            inner.by_client.remove(client_id);
        }
    }

    let subscription = inner.streams.get_mut(stream_id)?;
    subscription.clients.remove(client_id);
    if !subscription.clients.is_empty() {
        return None;
    }

    let server_id = subscription.server_id.clone();
    let deployment_id = subscription.deployment_id.clone();
    inner.streams.remove(stream_id);
    inner.by_deployment.remove(&deployment_id);
    Some((stream_id.clone(), server_id))
}

/// Tear a stream down and tell its clients why.
fn teardown_stream(inner: &mut RouterInner, stream_id: &StreamId, reason: &str) {
    let Some(subscription) = inner.streams.remove(stream_id) else {
        return;
    };
    inner.by_deployment.remove(&subscription.deployment_id);
    for (client_id, client) in &subscription.clients {
        if let Some(set) = inner.by_client.get_mut(client_id) {
            set.remove(stream_id);
        }
        client.notify(UiEvent::DeploymentLogStatus {
            deployment_id: subscription.deployment_id.clone(),
            stream_id: Some(stream_id.clone()),
            status: "error".to_string(),
            message: Some(reason.to_string()),
        });
    }
}

fn log_status(
    deployment_id: &DeploymentId,
    stream_id: Option<&StreamId>,
    status: &str,
    message: &str,
) -> UiEvent {
    UiEvent::DeploymentLogStatus {
        deployment_id: deployment_id.clone(),
        stream_id: stream_id.cloned(),
        status: status.to_string(),
        message: Some(message.to_string()),
    }
}

#[cfg(test)]
#[path = "logs_tests.rs"]
mod tests;
