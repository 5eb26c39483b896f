//! Mount reconciler behavior against a mock Vault: idempotence, migration
//! and rollback of half-finished mount changes.

mod common;

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use vault_provider::vault::mount::{create_mount, migrate_mount, update_mount};
use vault_provider::vault::{
    Migration, MountChange, MountKind, MountOutcome, MountSpec, RemountOptions, SecondaryConfig,
    VaultClient, VaultError,
};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, ResponseTemplate};

/// Writes `<mount>/config` with a fixed body.
struct WriteConfig;

#[async_trait]
impl SecondaryConfig for WriteConfig {
    async fn write(&self, client: &VaultClient, mount_path: &str) -> Result<(), VaultError> {
        client
            .write(&format!("{}/config", mount_path), json!({"region": "eu-west-1"}))
            .await?;
        Ok(())
    }
}

fn kv_spec(path: &str) -> MountSpec {
    let mut spec = MountSpec::new(MountKind::Secret, path, "kv");
    spec.options.insert("version".into(), "2".into());
    spec
}

fn fast_remount() -> RemountOptions {
    RemountOptions {
        poll_interval: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
    }
}

#[tokio::test]
async fn test_ensure_mount_twice_issues_no_writes() {
    let (server, ctx) = common::mock_vault().await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/mounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::mount_table(&[(
            "kv",
            common::mount_entry("kv", "kv_1234", json!({"version": "2"})),
        )])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let spec = kv_spec("kv");
    for _ in 0..2 {
        let outcome = create_mount(&ctx.client, &spec, None).await.unwrap();
        assert_eq!(outcome, MountOutcome::Unchanged);
    }
}

#[tokio::test]
async fn test_existing_mount_of_other_type_is_rejected() {
    let (server, ctx) = common::mock_vault().await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/mounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::mount_table(&[(
            "kv",
            common::mount_entry("pki", "pki_1", json!({})),
        )])))
        .mount(&server)
        .await;

    let err = create_mount(&ctx.client, &kv_spec("kv"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, VaultError::MountTypeMismatch { .. }), "{}", err);
}

#[tokio::test]
async fn test_failed_config_write_removes_new_mount() {
    let (server, ctx) = common::mock_vault().await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/mounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/mounts/aws"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/aws/config"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"errors": ["invalid region"]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/sys/mounts/aws"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let spec = MountSpec::new(MountKind::Secret, "aws", "aws");
    let err = create_mount(&ctx.client, &spec, Some(&WriteConfig))
        .await
        .unwrap_err();
    assert_eq!(err.status(), Some(400));
    assert!(err.to_string().contains("invalid region"));
}

#[tokio::test]
async fn test_failed_rollback_is_inconsistent() {
    let (server, ctx) = common::mock_vault().await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/mounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/mounts/aws"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/aws/config"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"errors": ["invalid region"]})),
        )
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/sys/mounts/aws"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({"errors": ["storage unavailable"]})),
        )
        .mount(&server)
        .await;

    let spec = MountSpec::new(MountKind::Secret, "aws", "aws");
    let err = create_mount(&ctx.client, &spec, Some(&WriteConfig))
        .await
        .unwrap_err();
    match &err {
        VaultError::Inconsistent {
            cause,
            compensation,
            ..
        } => {
            assert_eq!(cause.status(), Some(400));
            assert_eq!(compensation.status(), Some(500));
        }
        other => panic!("expected Inconsistent, got {:?}", other),
    }
    assert!(err.to_string().contains("rollback also failed"));
}

#[tokio::test]
async fn test_path_change_remounts_and_polls() {
    let (server, ctx) = common::mock_vault().await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/remount"))
        .and(body_json(json!({"from": "kv", "to": "kv-moved"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"migration_id": "m-1"}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/remount/status/m-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"data": {"migration_id": "m-1", "migration_info": {"status": "success"}}}),
        ))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/mounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::mount_table(&[(
            "kv-moved",
            common::mount_entry("kv", "kv_1234", json!({"version": "2"})),
        )])))
        .mount(&server)
        .await;

    let change = update_mount(
        &ctx.client,
        &kv_spec("kv"),
        &kv_spec("kv-moved"),
        Migration::Remount,
        None,
        fast_remount(),
    )
    .await
    .unwrap();
    assert_eq!(change, MountChange::Migrate);
}

#[tokio::test]
async fn test_failed_remount_migration_is_reported() {
    let (server, ctx) = common::mock_vault().await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/remount"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"migration_id": "m-2"}})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/remount/status/m-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(
            json!({"data": {"migration_info": {"status": "failure"}}}),
        ))
        .mount(&server)
        .await;

    let err = update_mount(
        &ctx.client,
        &kv_spec("kv"),
        &kv_spec("kv-moved"),
        Migration::Remount,
        None,
        fast_remount(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, VaultError::RemountFailed { .. }), "{}", err);
}

#[tokio::test]
async fn test_recreate_migration_unmounts_old_path_last() {
    let (server, ctx) = common::mock_vault().await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/mounts/consul-new"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/consul-new/config"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/sys/mounts/consul"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/remount"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let prior = MountSpec::new(MountKind::Secret, "consul", "consul");
    let desired = MountSpec::new(MountKind::Secret, "consul-new", "consul");
    let change = update_mount(
        &ctx.client,
        &prior,
        &desired,
        Migration::Recreate,
        Some(&WriteConfig),
        fast_remount(),
    )
    .await
    .unwrap();
    assert_eq!(change, MountChange::Migrate);
}

#[tokio::test]
async fn test_type_change_is_a_replace() {
    let (server, ctx) = common::mock_vault().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/sys/mounts/engine"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/mounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {}})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/mounts/engine"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let prior = MountSpec::new(MountKind::Secret, "engine", "kv");
    let desired = MountSpec::new(MountKind::Secret, "engine", "transit");
    let change = update_mount(
        &ctx.client,
        &prior,
        &desired,
        Migration::Remount,
        None,
        fast_remount(),
    )
    .await
    .unwrap();
    assert_eq!(change, MountChange::Replace(vec!["type"]));
}

fn remount_mock(from: &str, to: &str, status: u16) -> Mock {
    let template = if status < 300 {
        ResponseTemplate::new(status)
    } else {
        ResponseTemplate::new(status).set_body_json(json!({"errors": ["remount refused"]}))
    };
    Mock::given(method("POST"))
        .and(path("/v1/sys/remount"))
        .and(body_json(json!({"from": from, "to": to})))
        .respond_with(template)
}

fn tune_body(description: &str, default_ttl: &str, max_ttl: &str) -> serde_json::Value {
    json!({
        "description": description,
        "default_lease_ttl": default_ttl,
        "max_lease_ttl": max_ttl,
        "options": {"version": "2"},
    })
}

#[tokio::test]
async fn test_tune_change_posts_ttl_strings() {
    let (server, ctx) = common::mock_vault().await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/mounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::mount_table(&[(
            "kv",
            common::mount_entry("kv", "kv_1234", json!({"version": "2"})),
        )])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/mounts/kv/tune"))
        .and(body_json(tune_body("tuned", "60s", "3600s")))
        .respond_with(ResponseTemplate::new(204))
        .expect(2)
        .mount(&server)
        .await;

    let mut desired = kv_spec("kv");
    desired.description = "tuned".into();
    desired.default_lease_ttl = 60;
    desired.max_lease_ttl = 3600;

    let outcome = create_mount(&ctx.client, &desired, None).await.unwrap();
    assert_eq!(outcome, MountOutcome::Tuned);

    let change = update_mount(
        &ctx.client,
        &kv_spec("kv"),
        &desired,
        Migration::Remount,
        None,
        fast_remount(),
    )
    .await
    .unwrap();
    assert_eq!(change, MountChange::Tune);
}

#[tokio::test]
async fn test_failed_tune_after_remount_moves_mount_back() {
    let (server, ctx) = common::mock_vault().await;
    remount_mock("kv", "kv-moved", 204).expect(1).mount(&server).await;
    remount_mock("kv-moved", "kv", 204).expect(1).mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/mounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::mount_table(&[(
            "kv-moved",
            common::mount_entry("kv", "kv_1234", json!({"version": "2"})),
        )])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/mounts/kv-moved/tune"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"errors": ["boom"]})))
        .expect(1)
        .mount(&server)
        .await;

    let mut desired = kv_spec("kv-moved");
    desired.description = "moved".into();
    let err = update_mount(
        &ctx.client,
        &kv_spec("kv"),
        &desired,
        Migration::Remount,
        None,
        fast_remount(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), Some(500));
    assert!(err.to_string().contains("boom"));
}

#[tokio::test]
async fn test_failed_move_back_after_tune_failure_is_inconsistent() {
    let (server, ctx) = common::mock_vault().await;
    remount_mock("kv", "kv-moved", 204).expect(1).mount(&server).await;
    remount_mock("kv-moved", "kv", 500).expect(1).mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/mounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::mount_table(&[(
            "kv-moved",
            common::mount_entry("kv", "kv_1234", json!({"version": "2"})),
        )])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/mounts/kv-moved/tune"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"errors": ["boom"]})))
        .mount(&server)
        .await;

    let mut desired = kv_spec("kv-moved");
    desired.description = "moved".into();
    let err = migrate_mount(
        &ctx.client,
        &kv_spec("kv"),
        &desired,
        Migration::Remount,
        None,
        fast_remount(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, VaultError::Inconsistent { .. }), "{}", err);
}

#[tokio::test]
async fn test_failed_config_after_remount_restores_tune_and_path() {
    let (server, ctx) = common::mock_vault().await;
    remount_mock("kv", "kv-moved", 204).expect(1).mount(&server).await;
    remount_mock("kv-moved", "kv", 204).expect(1).mount(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/sys/mounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::mount_table(&[(
            "kv-moved",
            common::mount_entry("kv", "kv_1234", json!({"version": "2"})),
        )])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/mounts/kv-moved/tune"))
        .and(body_json(tune_body("moved", "0s", "0s")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/mounts/kv-moved/tune"))
        .and(body_json(tune_body("", "0s", "0s")))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/kv-moved/config"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"errors": ["invalid region"]})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut desired = kv_spec("kv-moved");
    desired.description = "moved".into();
    let err = migrate_mount(
        &ctx.client,
        &kv_spec("kv"),
        &desired,
        Migration::Remount,
        Some(&WriteConfig),
        fast_remount(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), Some(400));
}

#[tokio::test]
async fn test_failed_config_on_recreate_keeps_old_mount() {
    let (server, ctx) = common::mock_vault().await;
    Mock::given(method("POST"))
        .and(path("/v1/sys/mounts/consul-new"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/consul-new/config"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"errors": ["bad address"]})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/sys/mounts/consul-new"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v1/sys/mounts/consul"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&server)
        .await;

    let prior = MountSpec::new(MountKind::Secret, "consul", "consul");
    let desired = MountSpec::new(MountKind::Secret, "consul-new", "consul");
    let err = migrate_mount(
        &ctx.client,
        &prior,
        &desired,
        Migration::Recreate,
        Some(&WriteConfig),
        fast_remount(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), Some(400));
}
