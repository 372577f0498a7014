// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleet orchestrator daemon: the agent coordination core.
//!
//! Owns agent identity and connections, command dispatch, status
//! reconciliation, log streaming, and auto-mount orchestration. Everything
//! else (HTTP API, UI, proxy config generation, the real store) talks to
//! this crate through the repository, event-bus, and proxy-controller seams.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod auth;
pub mod dispatch;
pub mod env;
pub mod event_bus;
pub mod lifecycle;
pub mod locks;
pub mod logs;
pub mod mounts;
pub mod proxy;
pub mod reconcile;
pub mod registry;
pub mod secrets;
pub mod session;

pub use auth::{AuthError, Authenticator};
pub use dispatch::{CommandDispatcher, CommandError, CommandOutcome};
pub use event_bus::EventBus;
pub use lifecycle::{Config, Daemon, DaemonStats, LifecycleError};
pub use locks::MutexRegistry;
pub use logs::{ClientHandle, LogStreamRouter};
pub use mounts::MountOrchestrator;
pub use proxy::{NoopProxyController, ProxyController};
pub use reconcile::StatusReconciler;
pub use registry::{Connection, ConnectionRegistry};
pub use secrets::{SecretsBox, SecretsError};
pub use session::{run_session, SessionCtx, Transport, TransportSender};

#[cfg(any(test, feature = "test-support"))]
pub use proxy::RecordingProxyController;
#[cfg(any(test, feature = "test-support"))]
pub use session::{FakeAgent, FakeTransport};

#[cfg(test)]
mod test_helpers;
