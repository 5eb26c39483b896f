//! `vault_pki_secret_backend_role`: a certificate issuing role.

use crate::diagnostics::Diagnostics;
use crate::interface::{ProviderContext, Resource};
use crate::provider::ProviderError;
use crate::resources::read_data;
use crate::vault::common::{bool_field, str_field, string_list, u64_field};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

fn default_true() -> bool {
    true
}

fn default_key_type() -> String {
    "rsa".to_string()
}

fn default_key_bits() -> u64 {
    2048
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PkiRole {
    pub backend: String,
    pub name: String,
    #[serde(default)]
    pub ttl: u64,
    #[serde(default)]
    pub max_ttl: u64,
    #[serde(default)]
    pub allowed_domains: Vec<String>,
    #[serde(default)]
    pub allow_bare_domains: bool,
    #[serde(default)]
    pub allow_subdomains: bool,
    #[serde(default)]
    pub allow_glob_domains: bool,
    #[serde(default)]
    pub allow_any_name: bool,
    #[serde(default = "default_true")]
    pub allow_localhost: bool,
    #[serde(default = "default_true")]
    pub allow_ip_sans: bool,
    #[serde(default = "default_true")]
    pub enforce_hostnames: bool,
    #[serde(default = "default_true")]
    pub server_flag: bool,
    #[serde(default = "default_true")]
    pub client_flag: bool,
    #[serde(default = "default_key_type")]
    pub key_type: String,
    #[serde(default = "default_key_bits")]
    pub key_bits: u64,
    #[serde(default)]
    pub no_store: bool,
    #[serde(default)]
    pub generate_lease: bool,
}

impl PkiRole {
    pub fn path(&self) -> String {
        role_path(&self.backend, &self.name)
    }

    fn body(&self) -> Value {
        json!({
            "ttl": self.ttl,
            "max_ttl": self.max_ttl,
            "allowed_domains": self.allowed_domains,
            "allow_bare_domains": self.allow_bare_domains,
            "allow_subdomains": self.allow_subdomains,
            "allow_glob_domains": self.allow_glob_domains,
            "allow_any_name": self.allow_any_name,
            "allow_localhost": self.allow_localhost,
            "allow_ip_sans": self.allow_ip_sans,
            "enforce_hostnames": self.enforce_hostnames,
            "server_flag": self.server_flag,
            "client_flag": self.client_flag,
            "key_type": self.key_type,
            "key_bits": self.key_bits,
            "no_store": self.no_store,
            "generate_lease": self.generate_lease,
        })
    }

    fn from_data(backend: &str, name: &str, data: &Map<String, Value>) -> Self {
        Self {
            backend: backend.to_string(),
            name: name.to_string(),
            ttl: u64_field(data, "ttl"),
            max_ttl: u64_field(data, "max_ttl"),
            allowed_domains: string_list(data, "allowed_domains"),
            allow_bare_domains: bool_field(data, "allow_bare_domains"),
            allow_subdomains: bool_field(data, "allow_subdomains"),
            allow_glob_domains: bool_field(data, "allow_glob_domains"),
            allow_any_name: bool_field(data, "allow_any_name"),
            allow_localhost: bool_field(data, "allow_localhost"),
            allow_ip_sans: bool_field(data, "allow_ip_sans"),
            enforce_hostnames: bool_field(data, "enforce_hostnames"),
            server_flag: bool_field(data, "server_flag"),
            client_flag: bool_field(data, "client_flag"),
            key_type: str_field(data, "key_type").unwrap_or_else(default_key_type),
            key_bits: u64_field(data, "key_bits"),
            no_store: bool_field(data, "no_store"),
            generate_lease: bool_field(data, "generate_lease"),
        }
    }
}

pub fn role_path(backend: &str, name: &str) -> String {
    format!("{}/roles/{}", backend.trim_matches('/'), name)
}

/// Splits `<backend>/roles/<name>`. Backends may contain slashes.
pub fn parse_role_id(id: &str) -> Option<(String, String)> {
    let (backend, name) = id.trim_matches('/').rsplit_once("/roles/")?;
    (!backend.is_empty() && !name.is_empty()).then(|| (backend.to_string(), name.to_string()))
}

fn valid_key_bits(key_type: &str, bits: u64) -> bool {
    match key_type {
        "rsa" => matches!(bits, 0 | 2048 | 3072 | 4096 | 8192),
        "ec" => matches!(bits, 0 | 224 | 256 | 384 | 521),
        "ed25519" | "any" => true,
        _ => false,
    }
}

#[derive(Debug, Default)]
pub struct PkiSecretBackendRole;

#[async_trait]
impl Resource for PkiSecretBackendRole {
    const TYPE_NAME: &'static str = "vault_pki_secret_backend_role";

    type Config = PkiRole;
    type State = PkiRole;

    fn validate(&self, config: &PkiRole, diags: &mut Diagnostics) {
        if config.backend.trim_matches('/').is_empty() {
            diags.error("backend", "backend must not be empty");
        }
        if config.name.trim().is_empty() {
            diags.error("name", "name must not be empty");
        }
        if !matches!(config.key_type.as_str(), "rsa" | "ec" | "ed25519" | "any") {
            diags.error("key_type", "key_type must be rsa, ec, ed25519 or any");
        } else if !valid_key_bits(&config.key_type, config.key_bits) {
            diags.error(
                "key_bits",
                format!("{} bits is not valid for {} keys", config.key_bits, config.key_type),
            );
        }
        if config.max_ttl > 0 && config.ttl > config.max_ttl {
            diags.error("ttl", "ttl must not exceed max_ttl");
        }
    }

    fn id(&self, state: &PkiRole) -> String {
        state.path()
    }

    fn requires_replace(&self, prior: &PkiRole, config: &PkiRole) -> Vec<String> {
        let mut attrs = Vec::new();
        if prior.backend.trim_matches('/') != config.backend.trim_matches('/') {
            attrs.push("backend".to_string());
        }
        if prior.name != config.name {
            attrs.push("name".to_string());
        }
        attrs
    }

    async fn create(&self, ctx: &ProviderContext, config: &PkiRole) -> Result<PkiRole, ProviderError> {
        ctx.client.write(&config.path(), config.body()).await?;
        Ok(config.clone())
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        prior: Option<&PkiRole>,
    ) -> Result<Option<PkiRole>, ProviderError> {
        let (backend, name) = match prior {
            Some(p) => (p.backend.clone(), p.name.clone()),
            None => parse_role_id(id).ok_or_else(|| {
                ProviderError::Config(format!("invalid id {:?}, expected <backend>/roles/<name>", id))
            })?,
        };
        let Some(data) = read_data(&ctx.client, &role_path(&backend, &name)).await? else {
            return Ok(None);
        };
        Ok(Some(PkiRole::from_data(&backend, &name, &data)))
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        _prior: &PkiRole,
        config: &PkiRole,
    ) -> Result<PkiRole, ProviderError> {
        self.create(ctx, config).await
    }

    async fn delete(&self, ctx: &ProviderContext, state: &PkiRole) -> Result<(), ProviderError> {
        ctx.client.delete(&state.path()).await?;
        Ok(())
    }
}
