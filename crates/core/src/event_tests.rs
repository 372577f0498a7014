// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::deployment::AppState;

#[test]
fn event_tags_are_wire_stable() {
    let event = UiEvent::ServerConnected { server_id: ServerId::from_string("srv-1") };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["event"], "server:connected");
    assert_eq!(json["serverId"], "srv-1");
}

#[test]
fn deployment_status_event_shape() {
    let event = UiEvent::DeploymentStatus {
        deployment_id: DeploymentId::from_string("dep-1"),
        server_id: ServerId::from_string("srv-1"),
        previous_status: DeploymentStatus::Stopped,
        status: DeploymentStatus::Running,
        route_active: Some(true),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["event"], "deployment:status");
    assert_eq!(json["previousStatus"], "stopped");
    assert_eq!(json["status"], "running");
    assert_eq!(json["routeActive"], true);
}

#[test]
fn route_active_omitted_when_absent() {
    let event = UiEvent::DeploymentStatus {
        deployment_id: DeploymentId::from_string("dep-1"),
        server_id: ServerId::from_string("srv-1"),
        previous_status: DeploymentStatus::Running,
        status: DeploymentStatus::Stopped,
        route_active: None,
    };
    let json = serde_json::to_value(&event).unwrap();
    assert!(json.get("routeActive").is_none());
}

#[test]
fn server_status_event_carries_apps() {
    let event = UiEvent::ServerStatus {
        server_id: ServerId::from_string("srv-1"),
        metrics: serde_json::json!({"cpu": 0.25}),
        apps: vec![AppReport { name: "redis".to_string(), status: AppState::Running }],
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["event"], "server:status");
    assert_eq!(json["apps"][0]["name"], "redis");
    assert_eq!(json["apps"][0]["status"], "running");
}

#[test]
fn stream_id_embeds_deployment_and_time() {
    let id = StreamId::for_deployment(&DeploymentId::from_string("dep-9"), 1_700_000_000_000);
    assert_eq!(id.as_str(), "dep-9-1700000000000");
}
