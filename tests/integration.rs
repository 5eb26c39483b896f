//! Integration tests against a dev-mode Vault started with Testcontainers.
//!
//! The tests run only if the environment variable
//! `VAULT_PROVIDER_RUN_INTEGRATION_TESTS` is set; otherwise they are skipped.

mod common;

use serde_json::json;
use vault_provider::{PlanAction, ProviderConfig, VaultProvider};

async fn provider(vault: &common::VaultFixture) -> VaultProvider {
    let config = ProviderConfig {
        address: Some(vault.addr.clone()),
        token: Some("root".into()),
        ..Default::default()
    };
    VaultProvider::configure(&config, &vault_provider::Environment::empty())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_kv_mount_and_secret_lifecycle() -> Result<(), Box<dyn std::error::Error>> {
    if !common::integration_enabled() {
        return Ok(());
    }
    common::init_logging();
    let vault = common::VaultFixture::start().await;
    let provider = provider(&vault).await;

    let mount_config = json!({"path": "apps", "version": 2, "description": "app secrets"});
    let mount = provider
        .create("vault_kv_secret_backend", &mount_config)
        .await?;
    assert!(mount.attributes["accessor"].is_string());

    // A second apply of the same config is a no-op.
    let refreshed = provider
        .read("vault_kv_secret_backend", &mount)
        .await?
        .expect("mount exists");
    let plan = provider.plan("vault_kv_secret_backend", Some(&refreshed), &mount_config)?;
    assert_eq!(plan.action, PlanAction::NoOp);

    let secret = provider
        .create(
            "vault_kv_secret_v2",
            &json!({"mount": "apps", "name": "db", "data_json": "{\"password\": \"s3cret\"}"}),
        )
        .await?;
    assert_eq!(secret.attributes["data"]["password"], json!("s3cret"));

    let lookup = provider
        .read_data_source("vault_kv_secret_v2", &json!({"mount": "apps", "name": "db"}))
        .await?;
    assert_eq!(lookup["version"], json!(1));

    // Moving the mount keeps the secret.
    let moved_config = json!({"path": "apps-moved", "version": 2, "description": "app secrets"});
    let moved = provider
        .update("vault_kv_secret_backend", &refreshed, &moved_config)
        .await?;
    assert_eq!(moved.id, "apps-moved");
    let lookup = provider
        .read_data_source("vault_kv_secret_v2", &json!({"mount": "apps-moved", "name": "db"}))
        .await?;
    assert_eq!(lookup["data"]["password"], json!("s3cret"));

    provider.delete("vault_kv_secret_backend", &moved).await?;
    assert!(provider
        .read("vault_kv_secret_backend", &moved)
        .await?
        .is_none());
    Ok(())
}

#[tokio::test]
async fn test_transit_round_trip_and_policy() -> Result<(), Box<dyn std::error::Error>> {
    if !common::integration_enabled() {
        return Ok(());
    }
    common::init_logging();
    let vault = common::VaultFixture::start().await;
    let provider = provider(&vault).await;

    provider
        .create("vault_transit_secret_backend", &json!({"path": "transit"}))
        .await?;
    vault
        .client()
        .write("transit/keys/app", json!({"type": "aes256-gcm96"}))
        .await?;

    let encrypted = provider
        .read_data_source(
            "vault_transit_encrypt",
            &json!({"key": "app", "plaintext": "hello vault"}),
        )
        .await?;
    let ciphertext = encrypted["ciphertext"].as_str().unwrap_or_default().to_string();
    assert!(ciphertext.starts_with("vault:v1:"));

    let decrypted = provider
        .read_data_source(
            "vault_transit_decrypt",
            &json!({"key": "app", "ciphertext": ciphertext}),
        )
        .await?;
    assert_eq!(decrypted["plaintext"], json!("hello vault"));

    let document = provider
        .read_data_source(
            "vault_policy_document",
            &json!({"rules": [{"path": "transit/encrypt/app", "capabilities": ["update"]}]}),
        )
        .await?;
    let policy = provider
        .create(
            "vault_policy",
            &json!({"name": "encrypt-app", "policy": document["hcl"]}),
        )
        .await?;
    assert_eq!(policy.id, "encrypt-app");
    provider.delete("vault_policy", &policy).await?;
    Ok(())
}
