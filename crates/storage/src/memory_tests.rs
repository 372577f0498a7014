// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use fleet_core::server::token_hash;
use fleet_core::{Mount, MountType};

fn repo_with_server(id: &str) -> MemoryRepository {
    let repo = MemoryRepository::new();
    repo.insert_server(Server::test(id));
    repo
}

#[tokio::test]
async fn update_status_touches_last_seen() {
    let repo = repo_with_server("srv-1");
    let now = Utc::now();
    repo.server_update_status(&ServerId::from_string("srv-1"), AgentStatus::Online, Some(now))
        .await
        .unwrap();

    let server = repo.server(&ServerId::from_string("srv-1")).unwrap();
    assert_eq!(server.agent_status, AgentStatus::Online);
    assert_eq!(server.last_seen, Some(now));
}

#[tokio::test]
async fn update_status_unknown_server_errors() {
    let repo = MemoryRepository::new();
    let err = repo
        .server_update_status(&ServerId::from_string("srv-x"), AgentStatus::Offline, None)
        .await
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound { kind: "server", .. }));
}

#[tokio::test]
async fn token_lookup_matches_hash_only_for_its_server() {
    let repo = repo_with_server("srv-1");
    let hash = token_hash("secret-token");
    repo.insert_token(AgentToken {
        id: TokenId::from_string("tok-1"),
        server_id: ServerId::from_string("srv-1"),
        token_hash: hash.clone(),
        expires_at: None,
        last_used_at: None,
    });

    let hit = repo
        .token_find_by_server_and_hash(&ServerId::from_string("srv-1"), &hash)
        .await
        .unwrap();
    assert_eq!(hit.unwrap().id, "tok-1");

    let miss = repo
        .token_find_by_server_and_hash(&ServerId::from_string("srv-2"), &hash)
        .await
        .unwrap();
    assert!(miss.is_none());

    let miss = repo
        .token_find_by_server_and_hash(&ServerId::from_string("srv-1"), &token_hash("other"))
        .await
        .unwrap();
    assert!(miss.is_none());
}

#[tokio::test]
async fn transient_status_blocks_report_updates() {
    let repo = MemoryRepository::new();
    let mut deployment = Deployment::test("dep-1", "srv-1", "redis");
    deployment.status = DeploymentStatus::Installing;
    repo.insert_deployment(deployment);

    let id = DeploymentId::from_string("dep-1");
    let applied =
        repo.deployment_set_status_if_not_transient(&id, DeploymentStatus::Stopped).await.unwrap();
    assert!(!applied);
    assert_eq!(repo.deployment(&id).unwrap().status, DeploymentStatus::Installing);

    // Unconditional write still lands (command-originated transition)
    repo.deployment_set_status(&id, DeploymentStatus::Stopped, None).await.unwrap();
    assert_eq!(repo.deployment(&id).unwrap().status, DeploymentStatus::Stopped);

    let applied =
        repo.deployment_set_status_if_not_transient(&id, DeploymentStatus::Running).await.unwrap();
    assert!(applied);
}

#[tokio::test]
async fn deployment_ref_includes_route_flag() {
    let repo = MemoryRepository::new();
    repo.insert_deployment(Deployment::test("dep-1", "srv-1", "gitea"));

    let server_id = ServerId::from_string("srv-1");
    let found =
        repo.deployment_get_by_server_and_app(&server_id, "gitea").await.unwrap().unwrap();
    assert!(found.route_active.is_none());

    repo.insert_route(ProxyRoute { deployment_id: DeploymentId::from_string("dep-1"), active: false });
    let found =
        repo.deployment_get_by_server_and_app(&server_id, "gitea").await.unwrap().unwrap();
    assert_eq!(found.route_active, Some(false));

    assert!(repo.deployment_get_by_server_and_app(&server_id, "nope").await.unwrap().is_none());
}

#[tokio::test]
async fn command_log_lifecycle() {
    let repo = MemoryRepository::new();
    let id = CommandId::from_string("cmd-1");
    repo.command_insert(CommandLogEntry {
        id: id.clone(),
        server_id: ServerId::from_string("srv-1"),
        deployment_id: None,
        action: fleet_core::CommandAction::Start,
        payload: serde_json::json!({}),
        status: CommandStatus::Pending,
        result_message: None,
        created_at: Utc::now(),
        completed_at: None,
    })
    .await
    .unwrap();

    let done_at = Utc::now();
    repo.command_update(&id, CommandStatus::Timeout, Some("no ack".to_string()), done_at)
        .await
        .unwrap();

    let entry = repo.command(&id).unwrap();
    assert_eq!(entry.status, CommandStatus::Timeout);
    assert_eq!(entry.result_message.as_deref(), Some("no ack"));
    assert_eq!(entry.completed_at, Some(done_at));
}

#[tokio::test]
async fn auto_mount_listing_joins_and_filters() {
    let repo = MemoryRepository::new();
    repo.insert_mount(Mount {
        id: MountId::from_string("mnt-1"),
        mount_type: MountType::Nfs,
        source: "nas:/export".to_string(),
        default_options: None,
    });
    repo.insert_server_mount(ServerMount::test("smt-1", "mnt-1", "srv-1"));

    let mut manual = ServerMount::test("smt-2", "mnt-1", "srv-1");
    manual.auto_mount = false;
    repo.insert_server_mount(manual);

    // Binding referencing a different server
    repo.insert_server_mount(ServerMount::test("smt-3", "mnt-1", "srv-2"));

    let listed =
        repo.mounts_list_auto_for_server(&ServerId::from_string("srv-1")).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].binding.id, "smt-1");
    assert_eq!(listed[0].mount.source, "nas:/export");
}

#[tokio::test]
async fn server_mount_status_preserves_usage_unless_given() {
    let repo = MemoryRepository::new();
    repo.insert_server_mount(ServerMount::test("smt-1", "mnt-1", "srv-1"));
    let id = ServerMountId::from_string("smt-1");

    let checked = Utc::now();
    repo.server_mount_set_status(
        &id,
        MountStatus::Mounted,
        None,
        Some(MountUsage { usage_bytes: Some(10), total_bytes: Some(100) }),
        Some(checked),
    )
    .await
    .unwrap();

    repo.server_mount_set_status(&id, MountStatus::Error, Some("stale handle".to_string()), None, None)
        .await
        .unwrap();

    let binding = repo.server_mount(&id).unwrap();
    assert_eq!(binding.status, MountStatus::Error);
    assert_eq!(binding.usage_bytes, Some(10));
    assert_eq!(binding.last_checked, Some(checked));
}
