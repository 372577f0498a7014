// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Connection registry.
//!
//! The set of currently-connected agents, one entry per server. Each entry
//! carries a per-process, per-server generation number that strictly
//! increases on every successful connect; stale messages from an older
//! connection are discarded by comparing generations. Mutation happens only
//! on the session bring-up/teardown paths, under the server mutex.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fleet_core::{Clock, ServerId};

use crate::session::TransportSender;

/// Heartbeat `ping` cadence.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Liveness sweep cadence.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// A connection whose `last_seen` is older than this is declared stale.
pub const STALE_AFTER: Duration = Duration::from_secs(90);

/// A live agent connection as seen by the rest of the daemon.
#[derive(Clone)]
pub struct Connection {
    pub server_id: ServerId,
    pub generation: u64,
    pub sender: TransportSender,
    /// Cancels the per-connection heartbeat task.
    pub heartbeat: CancellationToken,
    last_seen_ms: Arc<AtomicU64>,
}

impl Connection {
    pub fn new(server_id: ServerId, generation: u64, sender: TransportSender, now_ms: u64) -> Self {
        Self {
            server_id,
            generation,
            sender,
            heartbeat: CancellationToken::new(),
            last_seen_ms: Arc::new(AtomicU64::new(now_ms)),
        }
    }

    /// Record inbound traffic. Every message counts, including `pong`.
    pub fn touch(&self, now_ms: u64) {
        self.last_seen_ms.store(now_ms, Ordering::Relaxed);
    }

    pub fn last_seen_ms(&self) -> u64 {
        self.last_seen_ms.load(Ordering::Relaxed)
    }

    /// Stop the heartbeat and close the transport. The owning session's
    /// teardown path does the rest.
    pub fn shut_down(&self) {
        self.heartbeat.cancel();
        self.sender.close();
    }
}

#[derive(Default)]
struct RegistryInner {
    connections: HashMap<ServerId, Connection>,
    generations: HashMap<ServerId, u64>,
}

/// The set of currently-connected agents.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<RegistryInner>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next generation for a server. Monotonic per process.
    pub fn next_generation(&self, server_id: &ServerId) -> u64 {
        let mut inner = self.inner.lock();
        let counter = inner.generations.entry(server_id.clone()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Install a connection, returning the displaced predecessor if any.
    pub fn install(&self, connection: Connection) -> Option<Connection> {
        let mut inner = self.inner.lock();
        inner.connections.insert(connection.server_id.clone(), connection)
    }

    /// Remove a server's entry, but only if it still belongs to the given
    /// generation. A displaced session calling in late must not evict its
    /// successor.
    pub fn remove_if_current(&self, server_id: &ServerId, generation: u64) -> Option<Connection> {
        let mut inner = self.inner.lock();
        match inner.connections.get(server_id) {
            Some(current) if current.generation == generation => {
                inner.connections.remove(server_id)
            }
            _ => None,
        }
    }

    pub fn get(&self, server_id: &ServerId) -> Option<Connection> {
        self.inner.lock().connections.get(server_id).cloned()
    }

    /// Current generation of a server's live connection.
    pub fn generation(&self, server_id: &ServerId) -> Option<u64> {
        self.inner.lock().connections.get(server_id).map(|c| c.generation)
    }

    pub fn all(&self) -> Vec<Connection> {
        self.inner.lock().connections.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().connections.is_empty()
    }

    /// Record inbound traffic for a server.
    pub fn touch(&self, server_id: &ServerId, now_ms: u64) {
        if let Some(connection) = self.inner.lock().connections.get(server_id) {
            connection.touch(now_ms);
        }
    }

    fn stale(&self, now_ms: u64, max_age: Duration) -> Vec<Connection> {
        let cutoff = now_ms.saturating_sub(max_age.as_millis() as u64);
        self.inner
            .lock()
            .connections
            .values()
            .filter(|c| c.last_seen_ms() < cutoff)
            .cloned()
            .collect()
    }
}

/// Background liveness sweep.
///
/// Closes connections that have gone quiet; the owning session's read loop
/// observes the close and runs the normal teardown path (offline persist,
/// pending-command rejection, `server:disconnected`).
pub async fn run_sweep(registry: ConnectionRegistry, clock: Arc<dyn Clock>, cancel: CancellationToken) {
    let mut tick = tokio::time::interval(SWEEP_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("liveness sweep stopped");
                return;
            }
            _ = tick.tick() => {}
        }

        for connection in registry.stale(clock.epoch_ms(), STALE_AFTER) {
            warn!(
                server_id = %connection.server_id,
                generation = connection.generation,
                "agent connection stale, closing"
            );
            connection.shut_down();
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
