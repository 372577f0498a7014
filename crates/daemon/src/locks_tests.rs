// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

#[tokio::test]
async fn lock_serializes_critical_sections() {
    let registry = MutexRegistry::new();
    let id = ServerId::from_string("srv-1");
    let counter = Arc::new(parking_lot::Mutex::new(0usize));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        let id = id.clone();
        let counter = Arc::clone(&counter);
        handles.push(tokio::spawn(async move {
            let _guard = registry.lock_server(&id).await;
            // Increment is split across an await so unserialized sections interleave
            let snapshot = *counter.lock();
            tokio::task::yield_now().await;
            *counter.lock() = snapshot + 1;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(*counter.lock(), 8);
}

#[tokio::test]
async fn slots_reclaimed_when_last_holder_drops() {
    let registry = MutexRegistry::new();
    let id = ServerId::from_string("srv-1");

    let guard = registry.lock_server(&id).await;
    assert_eq!(registry.server_lock_count(), 1);

    drop(guard);
    assert_eq!(registry.server_lock_count(), 0);
}

#[tokio::test]
async fn slot_survives_while_a_waiter_queues() {
    let registry = MutexRegistry::new();
    let id = ServerId::from_string("srv-1");

    let guard = registry.lock_server(&id).await;

    let waiter = {
        let registry = registry.clone();
        let id = id.clone();
        tokio::spawn(async move {
            let _guard = registry.lock_server(&id).await;
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(registry.server_lock_count(), 1);

    drop(guard);
    waiter.await.unwrap();
    assert_eq!(registry.server_lock_count(), 0);
}

#[tokio::test]
async fn server_and_deployment_namespaces_are_independent() {
    let registry = MutexRegistry::new();

    let _server = registry.lock_server(&ServerId::from_string("x")).await;
    // Same key text in the other namespace must not contend
    let _deployment = registry.lock_deployment(&DeploymentId::from_string("x")).await;

    assert_eq!(registry.server_lock_count(), 1);
    assert_eq!(registry.deployment_lock_count(), 1);
}

#[tokio::test]
async fn distinct_ids_do_not_contend() {
    let registry = MutexRegistry::new();
    let _a = registry.lock_server(&ServerId::from_string("srv-a")).await;
    // Completes immediately; a shared slot would deadlock here
    let _b = registry.lock_server(&ServerId::from_string("srv-b")).await;
    assert_eq!(registry.server_lock_count(), 2);
}
