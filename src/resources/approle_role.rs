//! `vault_approle_auth_backend_role`: a role of an AppRole auth mount.

use crate::diagnostics::Diagnostics;
use crate::interface::{ProviderContext, Resource};
use crate::provider::ProviderError;
use crate::resources::read_data;
use crate::vault::common::{bool_field, str_field, string_list, u64_field};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

const TOKEN_TYPES: &[&str] = &["default", "service", "batch", "default-service", "default-batch"];

fn default_backend() -> String {
    "approle".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppRoleRole {
    #[serde(default = "default_backend")]
    pub backend: String,
    pub role_name: String,
    /// Custom role ID. Vault generates one when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_id: Option<String>,
    #[serde(default = "default_true")]
    pub bind_secret_id: bool,
    #[serde(default)]
    pub secret_id_bound_cidrs: Vec<String>,
    #[serde(default)]
    pub secret_id_num_uses: u64,
    #[serde(default)]
    pub secret_id_ttl: u64,
    #[serde(default)]
    pub token_policies: Vec<String>,
    #[serde(default)]
    pub token_ttl: u64,
    #[serde(default)]
    pub token_max_ttl: u64,
    #[serde(default)]
    pub token_num_uses: u64,
    #[serde(default)]
    pub token_bound_cidrs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl AppRoleRole {
    pub fn path(&self) -> String {
        role_path(&self.backend, &self.role_name)
    }

    fn body(&self) -> Value {
        let mut body = json!({
            "bind_secret_id": self.bind_secret_id,
            "secret_id_bound_cidrs": self.secret_id_bound_cidrs,
            "secret_id_num_uses": self.secret_id_num_uses,
            "secret_id_ttl": self.secret_id_ttl,
            "token_policies": self.token_policies,
            "token_ttl": self.token_ttl,
            "token_max_ttl": self.token_max_ttl,
            "token_num_uses": self.token_num_uses,
            "token_bound_cidrs": self.token_bound_cidrs,
        });
        if let Some(token_type) = &self.token_type {
            body["token_type"] = json!(token_type);
        }
        body
    }

    fn from_data(backend: &str, role_name: &str, data: &Map<String, Value>, role_id: Option<String>) -> Self {
        Self {
            backend: backend.to_string(),
            role_name: role_name.to_string(),
            role_id,
            bind_secret_id: bool_field(data, "bind_secret_id"),
            secret_id_bound_cidrs: string_list(data, "secret_id_bound_cidrs"),
            secret_id_num_uses: u64_field(data, "secret_id_num_uses"),
            secret_id_ttl: u64_field(data, "secret_id_ttl"),
            token_policies: string_list(data, "token_policies"),
            token_ttl: u64_field(data, "token_ttl"),
            token_max_ttl: u64_field(data, "token_max_ttl"),
            token_num_uses: u64_field(data, "token_num_uses"),
            token_bound_cidrs: string_list(data, "token_bound_cidrs"),
            token_type: str_field(data, "token_type"),
        }
    }
}

pub fn role_path(backend: &str, role_name: &str) -> String {
    format!("auth/{}/role/{}", backend.trim_matches('/'), role_name)
}

/// Splits `auth/<backend>/role/<name>` into backend and role name.
pub fn parse_id(id: &str) -> Option<(String, String)> {
    let rest = id.trim_matches('/').strip_prefix("auth/")?;
    let (backend, name) = rest.split_once("/role/")?;
    (!backend.is_empty() && !name.is_empty()).then(|| (backend.to_string(), name.to_string()))
}

#[derive(Debug, Default)]
pub struct AppRoleAuthBackendRole;

impl AppRoleAuthBackendRole {
    async fn write(&self, ctx: &ProviderContext, config: &AppRoleRole) -> Result<AppRoleRole, ProviderError> {
        let path = config.path();
        ctx.client.write(&path, config.body()).await?;
        if let Some(role_id) = &config.role_id {
            ctx.client
                .write(&format!("{}/role-id", path), json!({ "role_id": role_id }))
                .await?;
        }
        self.fetch(ctx, &config.backend, &config.role_name)
            .await?
            .ok_or_else(|| ProviderError::NotFound(format!("{} right after writing it", path)))
    }

    async fn fetch(
        &self,
        ctx: &ProviderContext,
        backend: &str,
        role_name: &str,
    ) -> Result<Option<AppRoleRole>, ProviderError> {
        let path = role_path(backend, role_name);
        let Some(data) = read_data(&ctx.client, &path).await? else {
            return Ok(None);
        };
        let role_id = read_data(&ctx.client, &format!("{}/role-id", path))
            .await?
            .and_then(|d| str_field(&d, "role_id"));
        Ok(Some(AppRoleRole::from_data(backend, role_name, &data, role_id)))
    }
}

#[async_trait]
impl Resource for AppRoleAuthBackendRole {
    const TYPE_NAME: &'static str = "vault_approle_auth_backend_role";

    type Config = AppRoleRole;
    type State = AppRoleRole;

    fn validate(&self, config: &AppRoleRole, diags: &mut Diagnostics) {
        if config.role_name.trim().is_empty() {
            diags.error("role_name", "role_name must not be empty");
        }
        if config.backend.trim_matches('/').is_empty() {
            diags.error("backend", "backend must not be empty");
        }
        if let Some(token_type) = config.token_type.as_deref() {
            if !TOKEN_TYPES.contains(&token_type) {
                diags.error(
                    "token_type",
                    format!("token_type must be one of {}", TOKEN_TYPES.join(", ")),
                );
            }
        }
        if config.token_max_ttl > 0 && config.token_ttl > config.token_max_ttl {
            diags.error("token_ttl", "token_ttl must not exceed token_max_ttl");
        }
        if !config.bind_secret_id
            && config.secret_id_bound_cidrs.is_empty()
            && config.token_bound_cidrs.is_empty()
        {
            diags.warning(
                "bind_secret_id",
                "role can be used with only its role ID and no CIDR restriction",
            );
        }
    }

    fn id(&self, state: &AppRoleRole) -> String {
        state.path()
    }

    fn requires_replace(&self, prior: &AppRoleRole, config: &AppRoleRole) -> Vec<String> {
        let mut attrs = Vec::new();
        if prior.backend.trim_matches('/') != config.backend.trim_matches('/') {
            attrs.push("backend".to_string());
        }
        if prior.role_name != config.role_name {
            attrs.push("role_name".to_string());
        }
        attrs
    }

    async fn create(&self, ctx: &ProviderContext, config: &AppRoleRole) -> Result<AppRoleRole, ProviderError> {
        self.write(ctx, config).await
    }

    async fn read(
        &self,
        ctx: &ProviderContext,
        id: &str,
        prior: Option<&AppRoleRole>,
    ) -> Result<Option<AppRoleRole>, ProviderError> {
        let (backend, role_name) = match prior {
            Some(p) => (p.backend.clone(), p.role_name.clone()),
            None => parse_id(id).ok_or_else(|| {
                ProviderError::Config(format!(
                    "invalid id {:?}, expected auth/<backend>/role/<role_name>",
                    id
                ))
            })?,
        };
        self.fetch(ctx, &backend, &role_name).await
    }

    async fn update(
        &self,
        ctx: &ProviderContext,
        _prior: &AppRoleRole,
        config: &AppRoleRole,
    ) -> Result<AppRoleRole, ProviderError> {
        self.write(ctx, config).await
    }

    async fn delete(&self, ctx: &ProviderContext, state: &AppRoleRole) -> Result<(), ProviderError> {
        ctx.client.delete(&state.path()).await?;
        Ok(())
    }
}
