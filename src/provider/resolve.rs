//! Turns a [`ProviderConfig`] and the environment into an authenticated
//! [`VaultClient`].

use crate::provider::config::{ProviderConfig, DEFAULT_TOKEN_NAME};
use crate::provider::env::{set_scoped, Environment};
use crate::provider::token::resolve_token;
use crate::provider::ProviderError;
use crate::vault::auth;
use crate::vault::{TlsSettings, VaultClient};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Resolves the provider configuration into a client ready for resource
/// operations.
pub async fn resolve(
    config: &ProviderConfig,
    env: &Environment,
) -> Result<VaultClient, ProviderError> {
    let diags = config.validate();
    if diags.has_errors() {
        return Err(ProviderError::Validation(diags));
    }

    let address = config
        .address
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .or_else(|| env.var("VAULT_ADDR"))
        .map(str::to_string)
        .ok_or_else(|| {
            ProviderError::Config("no Vault address: set address or VAULT_ADDR".to_string())
        })?;
    info!("Resolving Vault provider for {}", address);

    // Restored when resolution returns, successfully or not.
    let _addr_guard = config
        .add_address_to_env
        .then(|| set_scoped("VAULT_ADDR", &address));

    let tls = tls_settings(config, env)?;
    let resolved = resolve_token(config.token.as_deref(), env).await?;
    info!("Using Vault token from {}", resolved.source);

    let mut client = VaultClient::with_tls(&address, resolved.token.as_deref(), &tls)
        .map_err(|e| ProviderError::Tls(e.to_string()))?;

    let namespace = config
        .namespace
        .as_deref()
        .or_else(|| env.var("VAULT_NAMESPACE"));
    client.set_namespace(namespace);

    for header in &config.headers {
        client.add_header(&header.name, &header.value)?;
    }

    if let Some(login) = &config.auth_login {
        let mut login_client = client.clone();
        if login.namespace.is_some() {
            login_client.set_namespace(login.namespace.as_deref());
        }
        let issued = auth::login(&login_client, &login.path, login.parameters.clone())
            .await
            .map_err(ProviderError::Login)?;
        client = client.clone_with_token(Some(&issued.client_token));
    }

    if config.skip_child_token {
        debug!("Skipping child token creation");
        return Ok(client);
    }

    if client.token().is_none() {
        return Err(ProviderError::Config(
            "no Vault token found to create a child token from".to_string(),
        ));
    }
    let token_name = config
        .token_name
        .as_deref()
        .or_else(|| env.var("VAULT_TOKEN_NAME"))
        .unwrap_or(DEFAULT_TOKEN_NAME);
    let child = auth::create_child_token(&client, token_name, config.max_lease_ttl_seconds).await?;
    Ok(client.clone_with_token(Some(&child.client_token)))
}

fn tls_settings(config: &ProviderConfig, env: &Environment) -> Result<TlsSettings, ProviderError> {
    let mut tls = TlsSettings {
        skip_verify: config
            .skip_tls_verify
            .or_else(|| env.flag("VAULT_SKIP_VERIFY"))
            .unwrap_or(false),
        ..Default::default()
    };

    let ca_file = config
        .ca_cert_file
        .clone()
        .or_else(|| env.var("VAULT_CACERT").map(PathBuf::from));
    if let Some(path) = ca_file {
        tls.ca_certs.push(read_pem(&path)?);
    }

    let ca_dir = config
        .ca_cert_dir
        .clone()
        .or_else(|| env.var("VAULT_CAPATH").map(PathBuf::from));
    if let Some(dir) = ca_dir {
        tls.ca_certs.extend(read_pem_dir(&dir)?);
    }

    let client_auth = match &config.client_auth {
        Some(auth) => Some((auth.cert_file.clone(), auth.key_file.clone())),
        None => match (env.var("VAULT_CLIENT_CERT"), env.var("VAULT_CLIENT_KEY")) {
            (Some(cert), Some(key)) => Some((PathBuf::from(cert), PathBuf::from(key))),
            (None, None) => None,
            _ => {
                return Err(ProviderError::Config(
                    "VAULT_CLIENT_CERT and VAULT_CLIENT_KEY must be set together".to_string(),
                ))
            }
        },
    };
    if let Some((cert, key)) = client_auth {
        tls.client_identity = Some((read_pem(&cert)?, read_pem(&key)?));
    }

    Ok(tls)
}

fn read_pem(path: &Path) -> Result<Vec<u8>, ProviderError> {
    std::fs::read(path).map_err(|e| ProviderError::Tls(format!("{}: {}", path.display(), e)))
}

/// Reads every `.pem` and `.crt` file in `dir`, in name order.
fn read_pem_dir(dir: &Path) -> Result<Vec<Vec<u8>>, ProviderError> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| ProviderError::Tls(format!("{}: {}", dir.display(), e)))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("pem") | Some("crt")
                )
        })
        .collect();
    paths.sort();
    paths.iter().map(|p| read_pem(p)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(json: serde_json::Value) -> ProviderConfig {
        serde_json::from_value(json).unwrap()
    }

    fn isolated_env() -> (tempfile::TempDir, Environment) {
        let home = tempfile::tempdir().unwrap();
        let env = Environment::empty().with_home(home.path());
        (home, env)
    }

    #[tokio::test]
    async fn test_missing_address_is_config_error() {
        let (_home, env) = isolated_env();
        let err = resolve(&config(json!({"token": "t"})), &env).await.unwrap_err();
        assert!(matches!(err, ProviderError::Config(_)));
    }

    #[tokio::test]
    async fn test_address_falls_back_to_env() {
        let (_home, env) = isolated_env();
        let env = env
            .with_var("VAULT_ADDR", "http://vault.example:8200")
            .with_var("VAULT_NAMESPACE", "ns1");
        let client = resolve(&config(json!({"skip_child_token": true})), &env)
            .await
            .unwrap();
        assert_eq!(client.addr, "http://vault.example:8200");
        assert_eq!(client.namespace(), Some("ns1"));
        assert_eq!(client.token(), None);
    }

    #[tokio::test]
    async fn test_child_token_without_token_is_error() {
        let (_home, env) = isolated_env();
        let err = resolve(&config(json!({"address": "http://127.0.0.1:1"})), &env)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("child token"));
    }

    #[tokio::test]
    async fn test_child_token_replaces_parent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/token/create"))
            .and(header("X-Vault-Token", "s.parent"))
            .and(body_partial_json(json!({"display_name": "ci", "ttl": "600s"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "auth": {"client_token": "s.child", "accessor": "a", "lease_duration": 600}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (_home, env) = isolated_env();
        let env = env.with_var("VAULT_TOKEN_NAME", "ci");
        let cfg = config(json!({
            "address": server.uri(),
            "token": "s.parent",
            "max_lease_ttl_seconds": 600
        }));
        let client = resolve(&cfg, &env).await.unwrap();
        assert_eq!(client.token(), Some("s.child"));
    }

    #[tokio::test]
    async fn test_auth_login_uses_login_namespace() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/approle/login"))
            .and(header("X-Vault-Namespace", "admin"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "auth": {"client_token": "s.login"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (_home, env) = isolated_env();
        let cfg = config(json!({
            "address": server.uri(),
            "namespace": "team",
            "skip_child_token": true,
            "auth_login": {"path": "auth/approle", "namespace": "admin", "parameters": {"role_id": "r"}}
        }));
        let client = resolve(&cfg, &env).await.unwrap();
        assert_eq!(client.token(), Some("s.login"));
        assert_eq!(client.namespace(), Some("team"));
    }

    #[tokio::test]
    async fn test_login_without_client_token_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/userpass/login/bob"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"auth": null})))
            .mount(&server)
            .await;

        let (_home, env) = isolated_env();
        let cfg = config(json!({
            "address": server.uri(),
            "skip_child_token": true,
            "auth_login": {"path": "auth/userpass/login/bob", "parameters": {"password": "p"}}
        }));
        let err = resolve(&cfg, &env).await.unwrap_err();
        assert!(matches!(err, ProviderError::Login(_)));
    }

    #[test]
    fn test_partial_client_cert_env_rejected() {
        let env = Environment::empty().with_var("VAULT_CLIENT_CERT", "/tmp/cert.pem");
        let err = tls_settings(&ProviderConfig::default(), &env).unwrap_err();
        assert!(matches!(err, ProviderError::Config(_)));
    }

    #[test]
    fn test_ca_dir_reads_only_certificates() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.pem"), "B").unwrap();
        std::fs::write(dir.path().join("a.crt"), "A").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip").unwrap();
        let certs = read_pem_dir(dir.path()).unwrap();
        assert_eq!(certs, vec![b"A".to_vec(), b"B".to_vec()]);
    }

    #[test]
    fn test_skip_verify_from_env() {
        let env = Environment::empty().with_var("VAULT_SKIP_VERIFY", "true");
        assert!(tls_settings(&ProviderConfig::default(), &env).unwrap().skip_verify);

        let cfg = config(json!({"skip_tls_verify": false}));
        assert!(!tls_settings(&cfg, &env).unwrap().skip_verify);
    }
}
