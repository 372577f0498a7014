// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reverse-proxy controller seam.
//!
//! The reconciler toggles route rows through the repository and then asks
//! this controller to regenerate and reload the proxy config, at most once
//! per status batch.

use async_trait::async_trait;

#[async_trait]
pub trait ProxyController: Send + Sync {
    /// Regenerate the proxy config from current route rows and reload it.
    async fn update_and_reload(&self);
}

/// Used when no proxy is managed (e.g. single-server installs).
#[derive(Default)]
pub struct NoopProxyController;

#[async_trait]
impl ProxyController for NoopProxyController {
    async fn update_and_reload(&self) {}
}

/// Counts reloads, for tests asserting the once-per-batch rule.
#[cfg(any(test, feature = "test-support"))]
#[derive(Default)]
pub struct RecordingProxyController {
    reloads: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-support"))]
impl RecordingProxyController {
    pub fn reload_count(&self) -> usize {
        self.reloads.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl ProxyController for RecordingProxyController {
    async fn update_and_reload(&self) {
        self.reloads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }
}
