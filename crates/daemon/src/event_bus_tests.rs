// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fleet_core::ServerId;

#[tokio::test]
async fn publish_reaches_all_subscribers() {
    let bus = EventBus::new();
    let mut a = bus.subscribe();
    let mut b = bus.subscribe();

    bus.publish(UiEvent::ServerConnected { server_id: ServerId::from_string("srv-1") });

    let event = a.recv().await.unwrap();
    assert!(matches!(event, UiEvent::ServerConnected { ref server_id } if server_id == "srv-1"));
    assert_eq!(b.recv().await.unwrap(), event);
}

#[test]
fn publish_without_subscribers_is_a_noop() {
    let bus = EventBus::new();
    bus.publish(UiEvent::ServerDisconnected { server_id: ServerId::from_string("srv-1") });
}

#[tokio::test]
async fn late_subscribers_miss_earlier_events() {
    let bus = EventBus::new();
    bus.publish(UiEvent::ServerConnected { server_id: ServerId::from_string("srv-1") });

    let mut rx = bus.subscribe();
    bus.publish(UiEvent::ServerDisconnected { server_id: ServerId::from_string("srv-1") });

    let event = rx.recv().await.unwrap();
    assert!(matches!(event, UiEvent::ServerDisconnected { .. }));
}
