// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::Harness;

use fleet_core::{AppState, Deployment, DeploymentId, ProxyRoute};
use serde_json::json;

fn report(apps: Vec<AppReport>) -> StatusReport {
    StatusReport {
        timestamp: 1_700_000_000_000,
        metrics: json!({"cpu": 0.5}),
        network_info: Some(json!({"ip": "10.0.0.7"})),
        apps,
    }
}

fn app(name: &str, status: AppState) -> AppReport {
    AppReport { name: name.to_string(), status }
}

fn seed(harness: &Harness, deployment_id: &str, app_name: &str, status: DeploymentStatus) {
    harness.seed_core_server("srv-1");
    let mut deployment = Deployment::test(deployment_id, "srv-1", app_name);
    deployment.status = status;
    harness.repo.insert_deployment(deployment);
}

#[tokio::test]
async fn persists_server_fields_and_publishes_server_status() {
    let harness = Harness::new();
    harness.seed_core_server("srv-1");
    let mut events = harness.ctx.bus.subscribe();

    let server = ServerId::from_string("srv-1");
    harness.ctx.reconciler.apply(&server, report(vec![])).await.unwrap();

    let row = harness.repo.server(&server).unwrap();
    assert_eq!(row.metrics, Some(json!({"cpu": 0.5})));
    assert_eq!(row.network_info, Some(json!({"ip": "10.0.0.7"})));
    assert_eq!(row.last_seen, Some(harness.clock.now()));

    let event = events.recv().await.unwrap();
    assert!(matches!(event, UiEvent::ServerStatus { ref server_id, .. } if server_id == "srv-1"));
}

#[tokio::test]
async fn reported_state_moves_deployment_and_emits_event() {
    let harness = Harness::new();
    seed(&harness, "dep-1", "redis", DeploymentStatus::Stopped);
    let mut events = harness.ctx.bus.subscribe();

    let server = ServerId::from_string("srv-1");
    harness.ctx.reconciler.apply(&server, report(vec![app("redis", AppState::Running)])).await.unwrap();

    let deployment = harness.repo.deployment(&DeploymentId::from_string("dep-1")).unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Running);

    let event = events.recv().await.unwrap();
    match event {
        UiEvent::DeploymentStatus { previous_status, status, route_active, .. } => {
            assert_eq!(previous_status, DeploymentStatus::Stopped);
            assert_eq!(status, DeploymentStatus::Running);
            assert!(route_active.is_none());
        }
        other => panic!("expected deployment:status, got {other:?}"),
    }
}

#[tokio::test]
async fn transient_deployment_is_left_alone() {
    let harness = Harness::new();
    seed(&harness, "dep-1", "redis", DeploymentStatus::Installing);
    let mut events = harness.ctx.bus.subscribe();

    let server = ServerId::from_string("srv-1");
    harness.ctx.reconciler.apply(&server, report(vec![app("redis", AppState::Stopped)])).await.unwrap();

    assert_eq!(
        harness.repo.deployment(&DeploymentId::from_string("dep-1")).unwrap().status,
        DeploymentStatus::Installing
    );

    // Only the batch-level server:status lands; no deployment event
    let event = events.recv().await.unwrap();
    assert!(matches!(event, UiEvent::ServerStatus { .. }));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn unknown_app_is_skipped() {
    let harness = Harness::new();
    harness.seed_core_server("srv-1");

    let server = ServerId::from_string("srv-1");
    harness
        .ctx
        .reconciler
        .apply(&server, report(vec![app("not-installed", AppState::Running)]))
        .await
        .unwrap();
    assert_eq!(harness.proxy.reload_count(), 0);
}

#[tokio::test]
async fn unknown_report_state_maps_to_stopped() {
    let harness = Harness::new();
    seed(&harness, "dep-1", "redis", DeploymentStatus::Running);

    let server = ServerId::from_string("srv-1");
    harness.ctx.reconciler.apply(&server, report(vec![app("redis", AppState::Unknown)])).await.unwrap();

    assert_eq!(
        harness.repo.deployment(&DeploymentId::from_string("dep-1")).unwrap().status,
        DeploymentStatus::Stopped
    );
}

#[tokio::test]
async fn route_follows_running_state() {
    let harness = Harness::new();
    seed(&harness, "dep-1", "redis", DeploymentStatus::Stopped);
    harness.repo.insert_route(ProxyRoute {
        deployment_id: DeploymentId::from_string("dep-1"),
        active: false,
    });
    let mut events = harness.ctx.bus.subscribe();

    let server = ServerId::from_string("srv-1");
    harness.ctx.reconciler.apply(&server, report(vec![app("redis", AppState::Running)])).await.unwrap();

    assert!(harness.repo.route(&DeploymentId::from_string("dep-1")).unwrap().active);
    assert_eq!(harness.proxy.reload_count(), 1);

    let event = events.recv().await.unwrap();
    assert!(
        matches!(event, UiEvent::DeploymentStatus { route_active: Some(true), .. }),
        "expected route_active=true, got {event:?}"
    );
}

#[tokio::test]
async fn batch_with_many_route_changes_reloads_once() {
    let harness = Harness::new();
    seed(&harness, "dep-1", "redis", DeploymentStatus::Stopped);
    seed(&harness, "dep-2", "gitea", DeploymentStatus::Stopped);
    seed(&harness, "dep-3", "vault", DeploymentStatus::Stopped);
    for id in ["dep-1", "dep-2"] {
        harness.repo.insert_route(ProxyRoute {
            deployment_id: DeploymentId::from_string(id),
            active: false,
        });
    }

    let server = ServerId::from_string("srv-1");
    harness
        .ctx
        .reconciler
        .apply(
            &server,
            report(vec![
                app("redis", AppState::Running),
                app("gitea", AppState::Running),
                app("vault", AppState::Running),
            ]),
        )
        .await
        .unwrap();

    assert_eq!(harness.proxy.reload_count(), 1);
}

#[tokio::test]
async fn batch_without_route_changes_does_not_reload() {
    let harness = Harness::new();
    seed(&harness, "dep-1", "redis", DeploymentStatus::Stopped);
    harness.repo.insert_route(ProxyRoute {
        deployment_id: DeploymentId::from_string("dep-1"),
        active: false,
    });

    let server = ServerId::from_string("srv-1");
    harness.ctx.reconciler.apply(&server, report(vec![app("redis", AppState::Stopped)])).await.unwrap();

    assert_eq!(harness.proxy.reload_count(), 0);
}

#[tokio::test]
async fn drifted_route_resyncs_even_without_a_status_change() {
    let harness = Harness::new();
    seed(&harness, "dep-1", "redis", DeploymentStatus::Running);
    harness.repo.insert_route(ProxyRoute {
        deployment_id: DeploymentId::from_string("dep-1"),
        active: false,
    });
    let mut events = harness.ctx.bus.subscribe();

    let server = ServerId::from_string("srv-1");
    harness.ctx.reconciler.apply(&server, report(vec![app("redis", AppState::Running)])).await.unwrap();

    assert!(harness.repo.route(&DeploymentId::from_string("dep-1")).unwrap().active);
    assert_eq!(harness.proxy.reload_count(), 1);

    // Status unchanged: no deployment event, just the server snapshot
    let event = events.recv().await.unwrap();
    assert!(matches!(event, UiEvent::ServerStatus { .. }));
}

#[tokio::test]
async fn missing_server_row_surfaces_repo_error() {
    let harness = Harness::new();
    let server = ServerId::from_string("srv-ghost");
    let err = harness.ctx.reconciler.apply(&server, report(vec![])).await.unwrap_err();
    assert!(matches!(err, fleet_storage::RepoError::NotFound { .. }));
}
