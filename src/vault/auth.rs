//! Token acquisition: auth method login and child token creation.

use crate::vault::common::str_field;
use crate::vault::{VaultClient, VaultError};
use serde_json::{json, Map, Value};
use tracing::info;

/// A token issued by Vault.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedToken {
    pub client_token: String,
    pub accessor: Option<String>,
    pub lease_duration: u64,
    pub policies: Vec<String>,
}

fn issued_token(path: &str, resp: Option<Value>) -> Result<IssuedToken, VaultError> {
    let auth = resp
        .as_ref()
        .and_then(|r| r.get("auth"))
        .and_then(Value::as_object)
        .ok_or_else(|| VaultError::Parse {
            path: path.to_string(),
            message: "response has no auth block".to_string(),
        })?;

    let client_token = str_field(auth, "client_token")
        .filter(|t| !t.is_empty())
        .ok_or_else(|| VaultError::Parse {
            path: path.to_string(),
            message: "response has no client_token".to_string(),
        })?;

    Ok(IssuedToken {
        client_token,
        accessor: str_field(auth, "accessor"),
        lease_duration: auth
            .get("lease_duration")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        policies: auth
            .get("policies")
            .and_then(Value::as_array)
            .map(|p| {
                p.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default(),
    })
}

/// Normalizes a login path. A bare mount (`approle`) gets `/login`
/// appended; paths that already name a login endpoint are kept. Either way
/// the result is rooted at `auth/`.
pub fn login_path(path: &str) -> String {
    let path = path.trim_matches('/');
    let path = path.strip_prefix("auth/").unwrap_or(path);
    if path.ends_with("/login") || path.contains("/login/") {
        format!("auth/{}", path)
    } else {
        format!("auth/{}/login", path)
    }
}

/// Logs in through an auth method with the given parameters.
pub async fn login(
    client: &VaultClient,
    path: &str,
    parameters: Map<String, Value>,
) -> Result<IssuedToken, VaultError> {
    let path = login_path(path);
    info!("Logging in to Vault via {}", path);
    let resp = client.write(&path, Value::Object(parameters)).await?;
    issued_token(&path, resp)
}

/// Creates a child token of the client's token that expires after
/// `ttl_seconds`.
pub async fn create_child_token(
    client: &VaultClient,
    display_name: &str,
    ttl_seconds: u64,
) -> Result<IssuedToken, VaultError> {
    let path = "auth/token/create";
    let resp = client
        .write(
            path,
            json!({
                "display_name": display_name,
                "ttl": format!("{}s", ttl_seconds),
                "explicit_max_ttl": format!("{}s", ttl_seconds),
                "no_parent": false,
                "renewable": false,
            }),
        )
        .await?;
    let token = issued_token(path, resp)?;
    info!(
        "Created child token {} with ttl {}s",
        token.accessor.as_deref().unwrap_or("<no accessor>"),
        token.lease_duration
    );
    Ok(token)
}
