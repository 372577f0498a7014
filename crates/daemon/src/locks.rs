// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reference-counted named locks.
//!
//! One registry serializes all per-server and per-deployment critical
//! sections. Entries are created on first use and reclaimed when the last
//! holder (or waiter) drops its guard, so agent churn cannot leak lock
//! objects. The counters exist for readiness probes to catch leaks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use fleet_core::{DeploymentId, ServerId};

struct Slot {
    lock: Arc<AsyncMutex<()>>,
    refs: usize,
}

#[derive(Default)]
struct Inner {
    servers: Mutex<HashMap<ServerId, Slot>>,
    deployments: Mutex<HashMap<DeploymentId, Slot>>,
}

/// Named, reference-counted async locks keyed by server and deployment ids.
#[derive(Clone, Default)]
pub struct MutexRegistry {
    inner: Arc<Inner>,
}

/// Held critical section. Dropping releases the lock and reclaims the slot
/// when no one else holds or awaits it.
pub struct RegistryGuard {
    _held: OwnedMutexGuard<()>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl MutexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize on a server id. Fair: waiters acquire in FIFO order.
    pub async fn lock_server(&self, id: &ServerId) -> RegistryGuard {
        let lock = checkout(&self.inner.servers, id);
        let held = lock.lock_owned().await;
        let inner = Arc::clone(&self.inner);
        let id = id.clone();
        RegistryGuard {
            _held: held,
            release: Some(Box::new(move || checkin(&inner.servers, &id))),
        }
    }

    /// Serialize on a deployment id.
    pub async fn lock_deployment(&self, id: &DeploymentId) -> RegistryGuard {
        let lock = checkout(&self.inner.deployments, id);
        let held = lock.lock_owned().await;
        let inner = Arc::clone(&self.inner);
        let id = id.clone();
        RegistryGuard {
            _held: held,
            release: Some(Box::new(move || checkin(&inner.deployments, &id))),
        }
    }

    /// Live server-lock slots (readiness probe).
    pub fn server_lock_count(&self) -> usize {
        self.inner.servers.lock().len()
    }

    /// Live deployment-lock slots (readiness probe).
    pub fn deployment_lock_count(&self) -> usize {
        self.inner.deployments.lock().len()
    }
}

fn checkout<K>(map: &Mutex<HashMap<K, Slot>>, id: &K) -> Arc<AsyncMutex<()>>
where
    K: Clone + Eq + std::hash::Hash,
{
    let mut map = map.lock();
    let slot = map
        .entry(id.clone())
        .or_insert_with(|| Slot { lock: Arc::new(AsyncMutex::new(())), refs: 0 });
    slot.refs += 1;
    Arc::clone(&slot.lock)
}

fn checkin<K>(map: &Mutex<HashMap<K, Slot>>, id: &K)
where
    K: Clone + Eq + std::hash::Hash,
{
    let mut map = map.lock();
    if let Some(slot) = map.get_mut(id) {
        slot.refs -= 1;
        if slot.refs == 0 {
            map.remove(id);
        }
    }
}

#[cfg(test)]
#[path = "locks_tests.rs"]
mod tests;
