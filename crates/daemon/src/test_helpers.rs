// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared wiring for daemon tests: a fully assembled component context on
//! the in-memory repository, fake transports, and frame helpers.

use std::sync::Arc;

use serde_json::Value;

use fleet_core::{FakeClock, Server, ServerId};
use fleet_storage::MemoryRepository;
use fleet_wire::AgentAuth;

use crate::auth::Authenticator;
use crate::dispatch::CommandDispatcher;
use crate::event_bus::EventBus;
use crate::locks::MutexRegistry;
use crate::logs::LogStreamRouter;
use crate::mounts::MountOrchestrator;
use crate::proxy::RecordingProxyController;
use crate::reconcile::StatusReconciler;
use crate::registry::ConnectionRegistry;
use crate::secrets::SecretsBox;
use crate::session::{run_session, FakeAgent, FakeTransport, SessionCtx};

pub(crate) const TEST_SECRETS_KEY: [u8; 32] = [7u8; 32];

pub(crate) struct Harness {
    pub repo: Arc<MemoryRepository>,
    pub ctx: Arc<SessionCtx>,
    pub proxy: Arc<RecordingProxyController>,
    pub clock: Arc<FakeClock>,
}

impl Harness {
    pub fn new() -> Self {
        let repo = Arc::new(MemoryRepository::new());
        let clock = Arc::new(FakeClock::new());
        let proxy = Arc::new(RecordingProxyController::default());

        let bus = EventBus::new();
        let locks = MutexRegistry::new();
        let registry = ConnectionRegistry::new();
        let repo_dyn: Arc<dyn fleet_storage::Repository> = repo.clone();
        let clock_dyn: Arc<dyn fleet_core::Clock> = clock.clone();

        let dispatcher = CommandDispatcher::new(
            repo_dyn.clone(),
            registry.clone(),
            locks.clone(),
            bus.clone(),
            clock_dyn.clone(),
        );
        let logs = LogStreamRouter::new(repo_dyn.clone(), registry.clone(), clock_dyn.clone());
        let reconciler = StatusReconciler::new(
            repo_dyn.clone(),
            locks.clone(),
            bus.clone(),
            proxy.clone(),
            clock_dyn.clone(),
        );
        let mounts = MountOrchestrator::new(
            repo_dyn.clone(),
            dispatcher.clone(),
            Arc::new(SecretsBox::new(&TEST_SECRETS_KEY)),
            clock_dyn.clone(),
        );
        let auth = Authenticator::new(repo_dyn.clone(), clock_dyn.clone());

        let ctx = Arc::new(SessionCtx {
            repo: repo_dyn,
            auth,
            registry,
            locks,
            dispatcher,
            logs,
            reconciler,
            mounts,
            bus,
            clock: clock_dyn,
        });

        Self { repo, ctx, proxy, clock }
    }

    /// Seed a core (token-less) server unless one exists already.
    pub fn seed_core_server(&self, id: &str) {
        if self.repo.server(&ServerId::from_string(id)).is_none() {
            let mut server = Server::test(id);
            server.is_core = true;
            self.repo.insert_server(server);
        }
    }

    /// Connect an agent for `server_id` and wait for bring-up to finish.
    /// Consumes the initial `request_status` frame.
    pub async fn connect(&self, server_id: &str) -> FakeAgent {
        self.seed_core_server(server_id);
        let (transport, mut agent) = FakeTransport::pair();
        tokio::spawn(run_session(Arc::clone(&self.ctx), transport, "test-peer".to_string()));
        agent.send(&AgentAuth { server_id: ServerId::from_string(server_id), token: None });

        let frame = recv_skipping_pings(&mut agent).await.expect("connect handshake");
        assert_eq!(frame["type"], "request_status");
        // Let the connect-time auto-mount task observe the (still empty)
        // mount table before the test seeds its own fixtures
        tokio::task::yield_now().await;
        agent
    }
}

/// Next daemon frame that is not a heartbeat ping. Paused-clock tests can
/// auto-advance through many heartbeat intervals.
pub(crate) async fn recv_skipping_pings(agent: &mut FakeAgent) -> Option<Value> {
    loop {
        let frame = agent.recv_json().await?;
        if frame["type"] != "ping" {
            return Some(frame);
        }
    }
}

/// Wait until `predicate` holds, bounded by a generous deadline.
pub(crate) async fn wait_for(mut predicate: impl FnMut() -> bool) {
    for _ in 0..2000 {
        if predicate() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
