// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Resolve state directory: FLEET_STATE_DIR > XDG_STATE_HOME/fleet > ~/.local/state/fleet
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("FLEET_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("fleet"));
    }
    dirs::home_dir()
        .map(|home| home.join(".local/state/fleet"))
        .ok_or(LifecycleError::NoStateDir)
}

/// Address the agent WebSocket listener binds to.
pub fn agent_addr() -> String {
    std::env::var("FLEET_AGENT_ADDR").unwrap_or_else(|_| "0.0.0.0:9444".to_string())
}

/// Hex-encoded 32-byte key for the mount-credentials secrets box.
pub fn secrets_key() -> Option<String> {
    std::env::var("FLEET_SECRETS_KEY").ok().filter(|s| !s.is_empty())
}

/// Shutdown drain deadline (default 30s, configurable via `FLEET_DRAIN_TIMEOUT_MS`).
pub fn drain_timeout() -> Duration {
    std::env::var("FLEET_DRAIN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(30))
}
