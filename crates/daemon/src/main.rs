// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! fleetd: the fleet orchestrator daemon.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fleet_daemon::{Config, Daemon, NoopProxyController};
use fleet_storage::MemoryRepository;

#[tokio::main]
async fn main() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fleetd: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = std::fs::create_dir_all(&config.state_dir) {
        eprintln!("fleetd: cannot create state dir {}: {e}", config.state_dir.display());
        std::process::exit(1);
    }

    // Log to daemon.log under the state dir; stderr stays quiet for service
    // managers. RUST_LOG overrides the default level.
    let appender = tracing_appender::rolling::never(&config.state_dir, "daemon.log");
    let (writer, _log_guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(writer)
        .with_ansi(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "fleetd starting");

    // The HTTP/admin layer owns the real store; standalone the daemon runs
    // on the in-memory repository.
    let repo = Arc::new(MemoryRepository::new());
    let daemon = match Daemon::new(config, repo, Arc::new(NoopProxyController)) {
        Ok(daemon) => daemon,
        Err(e) => {
            error!("startup failed: {e}");
            eprintln!("fleetd: startup failed: {e}");
            std::process::exit(1);
        }
    };

    tokio::select! {
        result = daemon.serve() => {
            if let Err(e) = result {
                error!("listener failed: {e}");
                eprintln!("fleetd: {e}");
                std::process::exit(1);
            }
        }
        _ = shutdown_signal() => {}
    }

    daemon.shutdown().await;
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                error!("cannot install SIGTERM handler: {e}");
                let _ = ctrl_c.await;
                return;
            }
        };
        tokio::select! {
            _ = ctrl_c => {}
            _ = term.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
