//! Token source precedence: provider config, then `VAULT_TOKEN`, then the
//! CLI token helper, then `~/.vault-token`.

use serial_test::serial;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use vault_provider::provider::{resolve, resolve_token, ProviderConfig, TokenSource};
use vault_provider::{Environment, ProviderError};

/// Writes an executable shell script and returns its path.
fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A home directory with a CLI config pointing at `helper`, if given, and a
/// token file, if given.
fn home(helper: Option<&Path>, token_file: Option<&str>) -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    if let Some(helper) = helper {
        fs::write(
            dir.path().join(".vault"),
            format!("token_helper = \"{}\"\n", helper.display()),
        )
        .unwrap();
    }
    if let Some(token) = token_file {
        fs::write(dir.path().join(".vault-token"), format!("{}\n", token)).unwrap();
    }
    dir
}

#[tokio::test]
async fn test_config_token_beats_everything() {
    let scripts = tempfile::tempdir().unwrap();
    let helper = write_script(scripts.path(), "helper", "echo helper-token");
    let home = home(Some(&helper), Some("file-token"));
    let env = Environment::empty()
        .with_var("VAULT_TOKEN", "env-token")
        .with_home(home.path());

    let resolved = resolve_token(Some("config-token"), &env).await.unwrap();
    assert_eq!(resolved.token.as_deref(), Some("config-token"));
    assert_eq!(resolved.source, TokenSource::Config);
}

#[tokio::test]
async fn test_env_token_beats_helper_and_file() {
    let scripts = tempfile::tempdir().unwrap();
    let helper = write_script(scripts.path(), "helper", "echo helper-token");
    let home = home(Some(&helper), Some("file-token"));
    let env = Environment::empty()
        .with_var("VAULT_TOKEN", "env-token")
        .with_home(home.path());

    let resolved = resolve_token(None, &env).await.unwrap();
    assert_eq!(resolved.token.as_deref(), Some("env-token"));
    assert_eq!(resolved.source, TokenSource::Environment);
}

#[tokio::test]
async fn test_blank_config_and_env_tokens_are_skipped() {
    let home = home(None, Some("file-token"));
    let env = Environment::empty()
        .with_var("VAULT_TOKEN", "   ")
        .with_home(home.path());

    let resolved = resolve_token(Some(""), &env).await.unwrap();
    assert_eq!(resolved.token.as_deref(), Some("file-token"));
}

#[tokio::test]
async fn test_helper_beats_token_file() {
    let scripts = tempfile::tempdir().unwrap();
    let helper = write_script(
        scripts.path(),
        "helper",
        "[ \"$1\" = get ] || exit 2\necho helper-token",
    );
    let home = home(Some(&helper), Some("file-token"));
    let env = Environment::empty().with_home(home.path());

    let resolved = resolve_token(None, &env).await.unwrap();
    assert_eq!(resolved.token.as_deref(), Some("helper-token"));
    assert_eq!(resolved.source, TokenSource::Helper(helper));
}

#[tokio::test]
async fn test_precedence_over_every_source_combination() {
    let scripts = tempfile::tempdir().unwrap();
    let helper = write_script(scripts.path(), "helper", "echo helper-token");

    for mask in 0u8..16 {
        let config_set = mask & 0b1000 != 0;
        let env_set = mask & 0b0100 != 0;
        let helper_set = mask & 0b0010 != 0;
        let file_set = mask & 0b0001 != 0;

        let home = home(
            helper_set.then_some(helper.as_path()),
            file_set.then_some("file-token"),
        );
        let mut env = Environment::empty().with_home(home.path());
        if env_set {
            env = env.with_var("VAULT_TOKEN", "env-token");
        }
        let expected = [
            (config_set, "config-token"),
            (env_set, "env-token"),
            (helper_set, "helper-token"),
            (file_set, "file-token"),
        ]
        .iter()
        .find(|(set, _)| *set)
        .map(|(_, token)| *token);

        let resolved = resolve_token(config_set.then_some("config-token"), &env)
            .await
            .unwrap();
        assert_eq!(resolved.token.as_deref(), expected, "sources {:04b}", mask);
    }
}

#[tokio::test]
async fn test_vault_config_path_overrides_home_config() {
    let scripts = tempfile::tempdir().unwrap();
    let helper = write_script(scripts.path(), "helper", "echo from-config-path");
    let config = scripts.path().join("cli.hcl");
    fs::write(&config, format!("token_helper = \"{}\"\n", helper.display())).unwrap();
    let home = home(None, None);
    let env = Environment::empty()
        .with_var("VAULT_CONFIG_PATH", config.to_str().unwrap())
        .with_home(home.path());

    let resolved = resolve_token(None, &env).await.unwrap();
    assert_eq!(resolved.token.as_deref(), Some("from-config-path"));
}

#[tokio::test]
async fn test_empty_helper_output_falls_through_to_file() {
    let scripts = tempfile::tempdir().unwrap();
    let helper = write_script(scripts.path(), "helper", "exit 0");
    let home = home(Some(&helper), Some("file-token"));
    let env = Environment::empty().with_home(home.path());

    let resolved = resolve_token(None, &env).await.unwrap();
    assert_eq!(resolved.token.as_deref(), Some("file-token"));
    assert_eq!(resolved.source, TokenSource::File(home.path().join(".vault-token")));
}

#[tokio::test]
async fn test_failing_helper_is_an_error() {
    let scripts = tempfile::tempdir().unwrap();
    let helper = write_script(scripts.path(), "helper", "echo locked >&2\nexit 1");
    let home = home(Some(&helper), Some("file-token"));
    let env = Environment::empty().with_home(home.path());

    let err = resolve_token(None, &env).await.unwrap_err();
    match err {
        ProviderError::TokenHelper { message, .. } => assert!(message.contains("locked")),
        other => panic!("expected TokenHelper error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_no_source_yields_no_token() {
    let home = home(None, None);
    let env = Environment::empty().with_home(home.path());

    let resolved = resolve_token(None, &env).await.unwrap();
    assert!(resolved.token.is_none());
    assert_eq!(resolved.source, TokenSource::None);
}

#[tokio::test]
#[serial]
async fn test_add_address_to_env_is_restored_after_resolve() {
    let previous = std::env::var("VAULT_ADDR").ok();
    std::env::set_var("VAULT_ADDR", "http://previous:8200");

    let scripts = tempfile::tempdir().unwrap();
    let seen = scripts.path().join("seen");
    let helper = write_script(
        scripts.path(),
        "helper",
        &format!("echo \"$VAULT_ADDR\" > {}\necho helper-token", seen.display()),
    );
    let home = home(Some(&helper), None);
    let env = Environment::empty().with_home(home.path());
    let config = ProviderConfig {
        address: Some("http://vault.internal:8200".into()),
        add_address_to_env: true,
        skip_child_token: true,
        ..Default::default()
    };

    let client = resolve(&config, &env).await.unwrap();
    assert_eq!(client.token(), Some("helper-token"));
    assert_eq!(
        fs::read_to_string(&seen).unwrap().trim(),
        "http://vault.internal:8200"
    );
    assert_eq!(
        std::env::var("VAULT_ADDR").ok().as_deref(),
        Some("http://previous:8200")
    );

    match previous {
        Some(value) => std::env::set_var("VAULT_ADDR", value),
        None => std::env::remove_var("VAULT_ADDR"),
    }
}

#[tokio::test]
#[serial]
async fn test_helper_does_not_see_address_unless_exported() {
    let previous = std::env::var("VAULT_ADDR").ok();
    std::env::set_var("VAULT_ADDR", "http://previous:8200");

    let scripts = tempfile::tempdir().unwrap();
    let seen = scripts.path().join("seen");
    let helper = write_script(
        scripts.path(),
        "helper",
        &format!("echo \"$VAULT_ADDR\" > {}\necho helper-token", seen.display()),
    );
    let home = home(Some(&helper), None);
    let env = Environment::empty().with_home(home.path());
    let config = ProviderConfig {
        address: Some("http://vault.internal:8200".into()),
        skip_child_token: true,
        ..Default::default()
    };

    let client = resolve(&config, &env).await.unwrap();
    assert_eq!(client.token(), Some("helper-token"));
    assert_eq!(
        fs::read_to_string(&seen).unwrap().trim(),
        "http://previous:8200"
    );

    match previous {
        Some(value) => std::env::set_var("VAULT_ADDR", value),
        None => std::env::remove_var("VAULT_ADDR"),
    }
}
