// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator→UI event bus.
//!
//! Thin wrapper around a broadcast channel. Publishing is fire-and-forget:
//! no subscribers is normal (headless operation), and slow subscribers drop
//! events rather than back-pressuring the coordination core.

use fleet_core::UiEvent;
use tokio::sync::broadcast;
use tracing::trace;

const BUS_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<UiEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    /// Publish to all current subscribers.
    pub fn publish(&self, event: UiEvent) {
        trace!(?event, "publishing event");
        // Err means no subscribers; nothing to do
        let _ = self.tx.send(event);
    }

    /// Subscribe to the live stream. Events published before the call are
    /// not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;
