//! Provider configuration as written by the user.

use crate::diagnostics::Diagnostics;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

pub const DEFAULT_MAX_LEASE_TTL_SECONDS: u64 = 1200;
pub const DEFAULT_TOKEN_NAME: &str = "terraform";

fn default_max_lease_ttl() -> u64 {
    DEFAULT_MAX_LEASE_TTL_SECONDS
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    /// Display name of the child token.
    #[serde(default)]
    pub token_name: Option<String>,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub auth_login: Option<AuthLogin>,
    /// Export the resolved address as `VAULT_ADDR` while resolving.
    #[serde(default)]
    pub add_address_to_env: bool,
    #[serde(default)]
    pub skip_tls_verify: Option<bool>,
    #[serde(default)]
    pub ca_cert_file: Option<PathBuf>,
    #[serde(default)]
    pub ca_cert_dir: Option<PathBuf>,
    #[serde(default)]
    pub client_auth: Option<ClientAuth>,
    #[serde(default)]
    pub skip_child_token: bool,
    #[serde(default = "default_max_lease_ttl")]
    pub max_lease_ttl_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Header {
    pub name: String,
    pub value: String,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthLogin {
    pub path: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Informational; the login path decides which method is used.
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientAuth {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            address: None,
            namespace: None,
            token: None,
            token_name: None,
            headers: Vec::new(),
            auth_login: None,
            add_address_to_env: false,
            skip_tls_verify: None,
            ca_cert_file: None,
            ca_cert_dir: None,
            client_auth: None,
            skip_child_token: false,
            max_lease_ttl_seconds: DEFAULT_MAX_LEASE_TTL_SECONDS,
        }
    }
}

impl ProviderConfig {
    /// Parses a JSON provider configuration. Unknown fields are rejected.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Plan-time checks that need no network access.
    pub fn validate(&self) -> Diagnostics {
        let mut diags = Diagnostics::new();

        if let Some(address) = &self.address {
            if !(address.starts_with("http://") || address.starts_with("https://")) {
                diags.error("address", "address must start with http:// or https://");
            }
        }
        for (i, header) in self.headers.iter().enumerate() {
            if header.name.trim().is_empty() {
                diags.error(&format!("headers[{}].name", i), "header name must not be empty");
            }
        }
        if let Some(login) = &self.auth_login {
            if login.path.trim_matches('/').is_empty() {
                diags.error("auth_login.path", "login path must not be empty");
            }
        }
        if !self.skip_child_token && self.max_lease_ttl_seconds == 0 {
            diags.error(
                "max_lease_ttl_seconds",
                "must be greater than zero when a child token is created",
            );
        }
        diags
    }
}

fn redacted<T>(value: &Option<T>) -> &'static str {
    if value.is_some() {
        "<redacted>"
    } else {
        "<unset>"
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("address", &self.address)
            .field("namespace", &self.namespace)
            .field("token", &redacted(&self.token))
            .field("token_name", &self.token_name)
            .field("headers", &self.headers.len())
            .field("auth_login", &self.auth_login)
            .field("add_address_to_env", &self.add_address_to_env)
            .field("skip_tls_verify", &self.skip_tls_verify)
            .field("ca_cert_file", &self.ca_cert_file)
            .field("ca_cert_dir", &self.ca_cert_dir)
            .field("client_auth", &self.client_auth)
            .field("skip_child_token", &self.skip_child_token)
            .field("max_lease_ttl_seconds", &self.max_lease_ttl_seconds)
            .finish()
    }
}

impl std::fmt::Debug for AuthLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&String> = self.parameters.keys().collect();
        f.debug_struct("AuthLogin")
            .field("path", &self.path)
            .field("namespace", &self.namespace)
            .field("parameters", &keys)
            .field("method", &self.method)
            .finish()
    }
}
